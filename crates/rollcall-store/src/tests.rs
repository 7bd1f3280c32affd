//! Integration tests for `SqliteStore` against an in-memory database.

use std::collections::BTreeSet;
use std::future::Future;

use chrono::{TimeZone, Utc};
use rollcall_core::store::{attendance_history, roster_or_empty};
use rollcall_core::{
    AttendanceDeterminer, AttendanceRecord, EncodedImage, Identity, PipelineError,
    RecognitionError, RecognitionOutcome, Recognizer, RecordStore, RosterStore,
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
    SqliteStore::open_in_memory()
        .await
        .expect("in-memory store")
}

fn identity(id: &str, name: &str) -> Identity {
    Identity {
        id: id.into(),
        display_name: name.into(),
        reference_image: EncodedImage::new("image/jpeg", vec![0xff, 0xd8, 0xff, 0xe0]),
        enrolled_at: Utc.with_ymd_and_hms(2024, 9, 1, 8, 30, 0).unwrap(),
    }
}

fn record(id: &str, hour: u32, present: &[&str], roster_size: usize) -> AttendanceRecord {
    AttendanceRecord {
        id: id.into(),
        captured_at: Utc.with_ymd_and_hms(2024, 9, 2, hour, 0, 0).unwrap(),
        present_identity_ids: present.iter().map(|s| s.to_string()).collect(),
        roster_size_at_capture: roster_size,
        scene_image: EncodedImage::new("image/png", vec![0x89, b'P', b'N', b'G']),
        note: Some(format!("session {id}")),
    }
}

/// Recognizer that answers with a fixed outcome, or fails when `None`.
struct FixedRecognizer(Option<RecognitionOutcome>);

impl Recognizer for FixedRecognizer {
    fn determine_presence<'a>(
        &'a self,
        _roster: &'a [Identity],
        _scene: &'a EncodedImage,
    ) -> impl Future<Output = Result<RecognitionOutcome, RecognitionError>> + Send + 'a {
        async move { self.0.clone().ok_or(RecognitionError::EmptyResponse) }
    }
}

// ─── Roster ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn put_and_list_identity() {
    let s = store().await;
    let alice = identity("a", "Alice");
    s.put_identity(alice.clone()).await.unwrap();

    let roster = s.list_identities().await.unwrap();
    assert_eq!(roster, vec![alice]);
}

#[tokio::test]
async fn put_identity_same_id_replaces() {
    let s = store().await;
    s.put_identity(identity("a", "Alice")).await.unwrap();
    s.put_identity(identity("a", "Alice B.")).await.unwrap();

    let roster = s.list_identities().await.unwrap();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].display_name, "Alice B.");
}

#[tokio::test]
async fn duplicate_names_are_separate_identities() {
    let s = store().await;
    s.put_identity(identity("a1", "Sam")).await.unwrap();
    s.put_identity(identity("a2", "Sam")).await.unwrap();
    assert_eq!(s.list_identities().await.unwrap().len(), 2);
}

#[tokio::test]
async fn delete_identity() {
    let s = store().await;
    s.put_identity(identity("a", "Alice")).await.unwrap();
    s.put_identity(identity("b", "Bob")).await.unwrap();

    assert!(s.delete_identity("a".into()).await.unwrap());
    assert!(!s.delete_identity("a".into()).await.unwrap());

    let ids: Vec<String> = s.list_identities().await.unwrap().into_iter().map(|i| i.id).collect();
    assert_eq!(ids, vec!["b".to_string()]);
}

#[tokio::test]
async fn counts_and_name_lookup_skip_blobs() {
    let s = store().await;
    assert_eq!(s.count_identities().await.unwrap(), 0);
    assert!(!s.is_name_enrolled("Sam").await.unwrap());

    s.put_identity(identity("a1", "Sam")).await.unwrap();
    s.put_identity(identity("a2", "Sam")).await.unwrap();
    s.put_identity(identity("b", "Bob")).await.unwrap();
    s.put_record(record("r1", 9, &["a1"], 3)).await.unwrap();

    assert_eq!(s.count_identities().await.unwrap(), 3);
    assert_eq!(s.count_records().await.unwrap(), 1);
    assert!(s.is_name_enrolled("Sam").await.unwrap());
    assert!(!s.is_name_enrolled("sam").await.unwrap());

    s.delete_identity("b".into()).await.unwrap();
    assert_eq!(s.count_identities().await.unwrap(), 2);
    assert!(!s.is_name_enrolled("Bob").await.unwrap());
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn put_and_list_record() {
    let s = store().await;
    let r = record("r1", 9, &["a", "b"], 3);
    s.put_record(r.clone()).await.unwrap();

    let all = s.list_records().await.unwrap();
    assert_eq!(all, vec![r]);
}

#[tokio::test]
async fn record_without_note() {
    let s = store().await;
    let mut r = record("r1", 9, &[], 0);
    r.note = None;
    s.put_record(r.clone()).await.unwrap();
    assert_eq!(s.list_records().await.unwrap()[0].note, None);
}

#[tokio::test]
async fn put_record_is_idempotent() {
    let s = store().await;
    let r = record("r1", 9, &["a"], 2);
    s.put_record(r.clone()).await.unwrap();

    // A second write with the same id never alters the stored record.
    let mut altered = r.clone();
    altered.present_identity_ids = BTreeSet::new();
    s.put_record(altered).await.unwrap();

    let all = s.list_records().await.unwrap();
    assert_eq!(all, vec![r]);
}

#[tokio::test]
async fn history_is_most_recent_first() {
    let s = store().await;
    for (id, hour) in [("mid", 12), ("early", 8), ("late", 17), ("noon", 11)] {
        s.put_record(record(id, hour, &[], 1)).await.unwrap();
    }

    let ids: Vec<String> = attendance_history(&s).await.into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["late", "mid", "noon", "early"]);
}

#[tokio::test]
async fn reads_after_close_degrade_to_empty() {
    let s = store().await;
    s.put_identity(identity("a", "Alice")).await.unwrap();
    s.put_record(record("r1", 9, &["a"], 1)).await.unwrap();

    let other = s.clone();
    s.close().await.unwrap();

    assert!(other.list_records().await.is_err());
    assert!(roster_or_empty(&other).await.is_empty());
    assert!(attendance_history(&other).await.is_empty());
}

#[tokio::test]
async fn writes_after_close_fail() {
    let s = store().await;
    let other = s.clone();
    s.close().await.unwrap();
    assert!(other.put_identity(identity("a", "Alice")).await.is_err());
}

#[tokio::test]
async fn file_backed_store_persists_across_reopen() {
    let dir = std::env::temp_dir().join(format!("rollcall-store-{}", std::process::id()));
    let path = dir.join("nested").join("attendance.db");
    let _ = std::fs::remove_dir_all(&dir);

    let s = SqliteStore::open(&path).await.unwrap();
    s.put_identity(identity("a", "Alice")).await.unwrap();
    s.close().await.unwrap();

    let reopened = SqliteStore::open(&path).await.unwrap();
    assert_eq!(reopened.list_identities().await.unwrap().len(), 1);
    reopened.close().await.unwrap();
    let _ = std::fs::remove_dir_all(&dir);
}

// ─── Pipeline against SQLite ─────────────────────────────────────────────────

#[tokio::test]
async fn determination_persists_exactly_one_record() {
    let s = store().await;
    s.put_identity(identity("a", "Alice")).await.unwrap();
    s.put_identity(identity("b", "Bob")).await.unwrap();

    let outcome = RecognitionOutcome {
        present_names: vec!["Alice".into()],
        absent_names: vec!["Bob".into()],
        confidence: Some("High".into()),
        reasoning: Some("Alice in the front row".into()),
    };
    let determiner = AttendanceDeterminer::new(FixedRecognizer(Some(outcome)), s.clone());
    let scene = EncodedImage::new("image/jpeg", vec![1, 2, 3]);

    let det = determiner.determine(scene).await.unwrap();

    let stored = s.list_records().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0], det.record);
    assert_eq!(stored[0].present_identity_ids, BTreeSet::from(["a".to_string()]));
    assert_eq!(stored[0].roster_size_at_capture, 2);
    assert_eq!(stored[0].note.as_deref(), Some("Alice in the front row"));
}

#[tokio::test]
async fn failed_recognition_leaves_store_unchanged() {
    let s = store().await;
    s.put_identity(identity("a", "Alice")).await.unwrap();
    s.put_record(record("before", 7, &["a"], 1)).await.unwrap();

    let determiner = AttendanceDeterminer::new(FixedRecognizer(None), s.clone());
    let err = determiner
        .determine(EncodedImage::new("image/jpeg", vec![1]))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Recognition(_)));
    let ids: Vec<String> = s.list_records().await.unwrap().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["before".to_string()]);
}

#[tokio::test]
async fn roster_size_is_frozen_at_capture() {
    let s = store().await;
    s.put_identity(identity("a", "Alice")).await.unwrap();
    s.put_identity(identity("b", "Bob")).await.unwrap();

    let outcome = RecognitionOutcome {
        present_names: vec!["Bob".into()],
        absent_names: vec![],
        confidence: None,
        reasoning: None,
    };
    let determiner = AttendanceDeterminer::new(FixedRecognizer(Some(outcome)), s.clone());
    determiner
        .determine(EncodedImage::new("image/jpeg", vec![1]))
        .await
        .unwrap();

    s.put_identity(identity("c", "Cara")).await.unwrap();
    s.delete_identity("a".into()).await.unwrap();

    let history = attendance_history(&s).await;
    assert_eq!(history[0].roster_size_at_capture, 2);
    assert_eq!(history[0].absent_count(), 1);
}
