//! rollcall-core: attendance determination engine.
//!
//! Normalizes roster and scene photos, asks an external vision-language
//! service which enrolled identities appear in a scene, turns the answer
//! into an immutable attendance record and aggregates the history.

pub mod determiner;
pub mod history;
pub mod normalize;
pub mod recognizer;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use determiner::{AttendanceDeterminer, PipelineError};
pub use history::{HistorySummary, TrendPoint};
pub use normalize::NormalizeError;
pub use recognizer::{GeminiClient, GeminiConfig, RecognitionError, Recognizer};
pub use store::{RecordStore, RosterStore};
pub use types::{AttendanceRecord, Determination, EncodedImage, Identity, RecognitionOutcome};
