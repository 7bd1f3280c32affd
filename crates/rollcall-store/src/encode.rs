//! Encoding and decoding helpers between domain types and SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, the present-id set as a
//! compact JSON array, and images as a BLOB plus a mime type column.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rollcall_core::{AttendanceRecord, EncodedImage, Identity};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Present ids ─────────────────────────────────────────────────────────────

pub fn encode_ids(ids: &BTreeSet<String>) -> Result<String> {
    Ok(serde_json::to_string(ids)?)
}

pub fn decode_ids(s: &str) -> Result<BTreeSet<String>> {
    Ok(serde_json::from_str(s)?)
}

// ─── Raw rows ────────────────────────────────────────────────────────────────

/// An `identities` row as read from SQLite, before decoding.
pub struct RawIdentity {
    pub id: String,
    pub display_name: String,
    pub reference_mime: String,
    pub reference_image: Vec<u8>,
    pub enrolled_at: String,
}

impl RawIdentity {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            display_name: row.get(1)?,
            reference_mime: row.get(2)?,
            reference_image: row.get(3)?,
            enrolled_at: row.get(4)?,
        })
    }

    pub fn decode(self) -> Result<Identity> {
        Ok(Identity {
            enrolled_at: decode_dt(&self.enrolled_at)?,
            id: self.id,
            display_name: self.display_name,
            reference_image: EncodedImage::new(self.reference_mime, self.reference_image),
        })
    }
}

/// An `attendance_records` row as read from SQLite, before decoding.
pub struct RawRecord {
    pub id: String,
    pub captured_at: String,
    pub present_ids: String,
    pub roster_size: i64,
    pub scene_mime: String,
    pub scene_image: Vec<u8>,
    pub note: Option<String>,
}

impl RawRecord {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            captured_at: row.get(1)?,
            present_ids: row.get(2)?,
            roster_size: row.get(3)?,
            scene_mime: row.get(4)?,
            scene_image: row.get(5)?,
            note: row.get(6)?,
        })
    }

    pub fn decode(self) -> Result<AttendanceRecord> {
        let roster_size_at_capture =
            usize::try_from(self.roster_size).map_err(|_| Error::InvalidRosterSize {
                id: self.id.clone(),
                value: self.roster_size,
            })?;

        Ok(AttendanceRecord {
            captured_at: decode_dt(&self.captured_at)?,
            present_identity_ids: decode_ids(&self.present_ids)?,
            roster_size_at_capture,
            scene_image: EncodedImage::new(self.scene_mime, self.scene_image),
            note: self.note,
            id: self.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_dt_roundtrip_keeps_subsecond_precision() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        assert_eq!(decode_dt(&encode_dt(dt)).unwrap(), dt);
    }

    #[test]
    fn test_decode_dt_rejects_garbage() {
        assert!(matches!(decode_dt("yesterday"), Err(Error::DateParse(_))));
    }

    #[test]
    fn test_ids_encode_sorted() {
        let ids: BTreeSet<String> = ["b", "a"].iter().map(|s| s.to_string()).collect();
        assert_eq!(encode_ids(&ids).unwrap(), r#"["a","b"]"#);
    }

    #[test]
    fn test_negative_roster_size_rejected() {
        let raw = RawRecord {
            id: "r".into(),
            captured_at: encode_dt(Utc::now()),
            present_ids: "[]".into(),
            roster_size: -1,
            scene_mime: "image/jpeg".into(),
            scene_image: vec![],
            note: None,
        };
        assert!(matches!(raw.decode(), Err(Error::InvalidRosterSize { value: -1, .. })));
    }
}
