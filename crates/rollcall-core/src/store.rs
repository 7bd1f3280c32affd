//! Storage traits for the roster and the attendance history.
//!
//! Implemented by storage backends (`rollcall-store`). The pipeline and the
//! daemon depend on these abstractions, not on a concrete backend.

use std::future::Future;

use crate::history::sort_most_recent_first;
use crate::types::{AttendanceRecord, Identity};

/// Enrolled identities, keyed by [`Identity::id`].
pub trait RosterStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Insert an identity, replacing any existing entry with the same id.
    fn put_identity(
        &self,
        identity: Identity,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

    /// Full scan of the roster, in no particular order.
    fn list_identities(
        &self,
    ) -> impl Future<Output = Result<Vec<Identity>, Self::Error>> + Send + '_;

    /// Remove an identity. Returns `false` if no such id was enrolled.
    fn delete_identity(
        &self,
        id: String,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}

/// Attendance history, keyed by [`AttendanceRecord::id`]. Append/read only.
pub trait RecordStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Persist a record. Writing the same id twice is a no-op, so a retried
    /// or abandoned write can never produce a duplicate or alter a record.
    fn put_record(
        &self,
        record: AttendanceRecord,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

    /// Full scan of the history, in storage order.
    fn list_records(
        &self,
    ) -> impl Future<Output = Result<Vec<AttendanceRecord>, Self::Error>> + Send + '_;
}

/// Roster listing for read paths: a storage failure degrades to an empty
/// roster so listing and aggregation stay usable.
pub async fn roster_or_empty<S: RosterStore>(store: &S) -> Vec<Identity> {
    match store.list_identities().await {
        Ok(roster) => roster,
        Err(e) => {
            tracing::warn!(error = %e, "roster read failed; substituting empty roster");
            Vec::new()
        }
    }
}

/// Attendance history, most recent first. A storage failure degrades to an
/// empty history.
pub async fn attendance_history<S: RecordStore>(store: &S) -> Vec<AttendanceRecord> {
    match store.list_records().await {
        Ok(mut records) => {
            sort_most_recent_first(&mut records);
            records
        }
        Err(e) => {
            tracing::warn!(error = %e, "history read failed; substituting empty history");
            Vec::new()
        }
    }
}
