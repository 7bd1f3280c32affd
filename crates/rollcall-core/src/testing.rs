//! In-memory fakes shared by the unit tests.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{TimeZone, Utc};

use crate::recognizer::{RecognitionError, Recognizer};
use crate::store::{RecordStore, RosterStore};
use crate::types::{AttendanceRecord, EncodedImage, Identity, RecognitionOutcome};

#[derive(Debug, thiserror::Error)]
#[error("memory store unavailable")]
pub struct Unavailable;

#[derive(Default)]
pub struct MemoryStore {
    identities: Mutex<Vec<Identity>>,
    records: Mutex<Vec<AttendanceRecord>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

impl RosterStore for MemoryStore {
    type Error = Unavailable;

    fn put_identity(
        &self,
        identity: Identity,
    ) -> impl Future<Output = Result<(), Unavailable>> + Send + '_ {
        async move {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(Unavailable);
            }
            let mut identities = self.identities.lock().unwrap();
            identities.retain(|i| i.id != identity.id);
            identities.push(identity);
            Ok(())
        }
    }

    fn list_identities(
        &self,
    ) -> impl Future<Output = Result<Vec<Identity>, Unavailable>> + Send + '_ {
        async move {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(Unavailable);
            }
            Ok(self.identities.lock().unwrap().clone())
        }
    }

    fn delete_identity(
        &self,
        id: String,
    ) -> impl Future<Output = Result<bool, Unavailable>> + Send + '_ {
        async move {
            let mut identities = self.identities.lock().unwrap();
            let before = identities.len();
            identities.retain(|i| i.id != id);
            Ok(identities.len() != before)
        }
    }
}

impl RecordStore for MemoryStore {
    type Error = Unavailable;

    fn put_record(
        &self,
        record: AttendanceRecord,
    ) -> impl Future<Output = Result<(), Unavailable>> + Send + '_ {
        async move {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(Unavailable);
            }
            let mut records = self.records.lock().unwrap();
            if !records.iter().any(|r| r.id == record.id) {
                records.push(record);
            }
            Ok(())
        }
    }

    fn list_records(
        &self,
    ) -> impl Future<Output = Result<Vec<AttendanceRecord>, Unavailable>> + Send + '_ {
        async move {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(Unavailable);
            }
            Ok(self.records.lock().unwrap().clone())
        }
    }
}

/// What a [`ScriptedRecognizer`] answers with.
pub enum Script {
    Outcome(RecognitionOutcome),
    MissingPresentNames,
    ServiceDown,
}

pub struct ScriptedRecognizer {
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedRecognizer {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Recognizer for ScriptedRecognizer {
    fn determine_presence<'a>(
        &'a self,
        _roster: &'a [Identity],
        _scene: &'a EncodedImage,
    ) -> impl Future<Output = Result<RecognitionOutcome, RecognitionError>> + Send + 'a {
        async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                Script::Outcome(outcome) => Ok(outcome.clone()),
                Script::MissingPresentNames => {
                    crate::recognizer::parse_outcome(r#"{"absentNames":["Bob"]}"#)
                }
                Script::ServiceDown => Err(RecognitionError::Status {
                    status: 503,
                    body: "unavailable".into(),
                }),
            }
        }
    }
}

pub fn identity(id: &str, name: &str) -> Identity {
    Identity {
        id: id.into(),
        display_name: name.into(),
        reference_image: EncodedImage::new("image/jpeg", vec![0xff, 0xd8]),
        enrolled_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
    }
}

pub fn outcome(present: &[&str], absent: &[&str], reasoning: Option<&str>) -> RecognitionOutcome {
    RecognitionOutcome {
        present_names: present.iter().map(|s| s.to_string()).collect(),
        absent_names: absent.iter().map(|s| s.to_string()).collect(),
        confidence: Some("High".into()),
        reasoning: reasoning.map(str::to_string),
    }
}

/// A record captured on 2024-03-05 at 10:`minute`.
pub fn record_at(id: &str, minute: u32, present: &[&str], roster_size: usize) -> AttendanceRecord {
    AttendanceRecord {
        id: id.into(),
        captured_at: Utc.with_ymd_and_hms(2024, 3, 5, 10, minute, 0).unwrap(),
        present_identity_ids: present.iter().map(|s| s.to_string()).collect(),
        roster_size_at_capture: roster_size,
        scene_image: EncodedImage::new("image/jpeg", vec![]),
        note: None,
    }
}

pub fn scene() -> EncodedImage {
    EncodedImage::new("image/jpeg", vec![0xff, 0xd8, 0xff])
}
