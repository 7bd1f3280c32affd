use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Encoded still image (JPEG, PNG, ...) together with its sniffed media type.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Media type, e.g. "image/jpeg". Always derived from the bytes.
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// An enrolled roster member with one reference photo.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    /// Opaque unique id (UUID v4 text). Never changes once assigned.
    pub id: String,
    /// Human-readable name. Not guaranteed unique within a roster.
    pub display_name: String,
    /// Normalized reference photo (longer edge <= 512 px, JPEG).
    pub reference_image: EncodedImage,
    pub enrolled_at: DateTime<Utc>,
}

impl Identity {
    /// Create a new identity with a freshly generated id.
    pub fn enroll(display_name: impl Into<String>, reference_image: EncodedImage) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            display_name: display_name.into(),
            reference_image,
            enrolled_at: Utc::now(),
        }
    }
}

/// A persisted, immutable outcome of one determination.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRecord {
    pub id: String,
    pub captured_at: DateTime<Utc>,
    /// Ids of identities judged present. Always a subset of the roster
    /// that was passed into the determination.
    pub present_identity_ids: BTreeSet<String>,
    /// Roster size at capture time; not recomputed when the roster changes.
    pub roster_size_at_capture: usize,
    pub scene_image: EncodedImage,
    /// Free-text explanation from the recognition service, verbatim.
    pub note: Option<String>,
}

impl AttendanceRecord {
    pub fn present_count(&self) -> usize {
        self.present_identity_ids.len()
    }

    pub fn absent_count(&self) -> usize {
        self.roster_size_at_capture
            .saturating_sub(self.present_identity_ids.len())
    }
}

/// Structured judgment returned by the recognition service.
///
/// Untrusted: produced by an external model and only ever consumed by the
/// attendance determiner, which intersects it with the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionOutcome {
    pub present_names: Vec<String>,
    pub absent_names: Vec<String>,
    /// "High", "Medium" or "Low" by convention; not validated.
    #[serde(default)]
    pub confidence: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// Result of a successful determination: the persisted record plus the raw
/// service outcome it was derived from.
#[derive(Debug, Clone)]
pub struct Determination {
    pub record: AttendanceRecord,
    pub outcome: RecognitionOutcome,
    /// Present names that matched more than one roster identity.
    pub ambiguous_names: Vec<String>,
}
