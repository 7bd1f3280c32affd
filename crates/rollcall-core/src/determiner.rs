//! Attendance determination: recognition outcome → persisted record.
//!
//! The determiner is the only writer of attendance records. Presence is
//! derived solely from `present_names` intersected with the roster snapshot
//! passed in, so every record it builds satisfies
//! `present_identity_ids ⊆ roster ids` by construction.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::recognizer::{RecognitionError, Recognizer};
use crate::store::{roster_or_empty, RecordStore, RosterStore};
use crate::types::{AttendanceRecord, Determination, EncodedImage, Identity, RecognitionOutcome};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no identities enrolled; nothing to determine")]
    EmptyRoster,
    #[error("recognition failed: {0}")]
    Recognition(#[from] RecognitionError),
    #[error("failed to persist attendance record: {0}")]
    Persistence(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Build an attendance record from a recognition outcome.
///
/// Each present name marks every identity whose display name matches it
/// exactly (case-sensitive). Unknown names are ignored and `absent_names`
/// is never consulted.
pub fn resolve(
    roster: &[Identity],
    outcome: &RecognitionOutcome,
    scene_image: EncodedImage,
    captured_at: DateTime<Utc>,
) -> AttendanceRecord {
    let present_identity_ids: BTreeSet<String> = roster
        .iter()
        .filter(|identity| outcome.present_names.contains(&identity.display_name))
        .map(|identity| identity.id.clone())
        .collect();

    AttendanceRecord {
        id: uuid::Uuid::new_v4().to_string(),
        captured_at,
        present_identity_ids,
        roster_size_at_capture: roster.len(),
        scene_image,
        note: outcome.reasoning.clone(),
    }
}

/// Present names that resolve to more than one identity.
///
/// Name-based matching cannot tell such identities apart; all of them are
/// marked present together. Callers surface these so the limitation is
/// visible rather than silent.
pub fn ambiguous_names(roster: &[Identity], outcome: &RecognitionOutcome) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for identity in roster {
        *counts.entry(identity.display_name.as_str()).or_default() += 1;
    }

    let mut ambiguous: Vec<String> = outcome
        .present_names
        .iter()
        .filter(|name| counts.get(name.as_str()).copied().unwrap_or(0) > 1)
        .cloned()
        .collect();
    ambiguous.sort();
    ambiguous.dedup();
    ambiguous
}

/// End-to-end determination over a recognizer and a store.
pub struct AttendanceDeterminer<R, S> {
    recognizer: R,
    store: S,
}

impl<R, S> AttendanceDeterminer<R, S>
where
    R: Recognizer,
    S: RosterStore + RecordStore,
{
    pub fn new(recognizer: R, store: S) -> Self {
        Self { recognizer, store }
    }

    pub fn recognizer(&self) -> &R {
        &self.recognizer
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one determination against the current roster.
    ///
    /// Writes exactly one record on success and nothing on any failure.
    /// The recognizer is never called for an empty roster.
    pub async fn determine(&self, scene: EncodedImage) -> Result<Determination, PipelineError> {
        let roster = roster_or_empty(&self.store).await;
        self.determine_with(&roster, scene).await
    }

    /// Run one determination against an explicit roster snapshot.
    pub async fn determine_with(
        &self,
        roster: &[Identity],
        scene: EncodedImage,
    ) -> Result<Determination, PipelineError> {
        if roster.is_empty() {
            return Err(PipelineError::EmptyRoster);
        }

        let captured_at = Utc::now();
        let outcome = match self.recognizer.determine_presence(roster, &scene).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    roster = roster.len(),
                    "recognition failed; no record written"
                );
                return Err(e.into());
            }
        };

        let ambiguous_names = ambiguous_names(roster, &outcome);
        if !ambiguous_names.is_empty() {
            tracing::warn!(
                names = ?ambiguous_names,
                "present names match several identities; all of them marked present"
            );
        }

        let record = resolve(roster, &outcome, scene, captured_at);
        let ignored = outcome.present_names.len().saturating_sub(
            outcome
                .present_names
                .iter()
                .filter(|n| roster.iter().any(|i| &i.display_name == *n))
                .count(),
        );
        tracing::info!(
            record = %record.id,
            present = record.present_count(),
            roster = record.roster_size_at_capture,
            unknown_names = ignored,
            "attendance resolved"
        );

        self.store
            .put_record(record.clone())
            .await
            .map_err(|e| PipelineError::Persistence(Box::new(e)))?;

        Ok(Determination {
            record,
            outcome,
            ambiguous_names,
        })
    }
}
