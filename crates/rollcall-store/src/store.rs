//! [`SqliteStore`]: the SQLite implementation of the roster and record stores.

use std::path::Path;

use rollcall_core::{AttendanceRecord, Identity, RecordStore, RosterStore};

use crate::{
    encode::{encode_dt, encode_ids, RawIdentity, RawRecord},
    schema::SCHEMA,
    Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// Roster and attendance history backed by a single SQLite file.
///
/// Cloning is cheap; all clones share one connection thread.
#[derive(Clone)]
pub struct SqliteStore {
    conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
    /// Open (or create) a store at `path` and run schema initialisation.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(
                    dir = %parent.display(),
                    error = %e,
                    "could not create database directory"
                );
            }
        }
        let conn = tokio_rusqlite::Connection::open(path).await?;
        let store = Self { conn };
        store.init_schema().await?;
        tracing::info!(path = %path.display(), "store opened");
        Ok(store)
    }

    /// Open an in-memory store, used by tests.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    /// Close the underlying connection. Other clones fail with a database
    /// error afterwards.
    pub async fn close(self) -> Result<()> {
        self.conn.close().await?;
        tracing::info!("store closed");
        Ok(())
    }

    /// Number of enrolled identities, without loading reference photos.
    pub async fn count_identities(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM identities").await
    }

    /// Number of stored attendance records, without loading scene images.
    pub async fn count_records(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM attendance_records").await
    }

    /// Whether any enrolled identity already uses `name` as its display name.
    pub async fn is_name_enrolled(&self, name: &str) -> Result<bool> {
        let name = name.to_string();
        let found = self
            .conn
            .call(move |conn| {
                let found: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM identities WHERE display_name = ?1)",
                    rusqlite::params![name],
                    |row| row.get(0),
                )?;
                Ok(found)
            })
            .await?;
        Ok(found)
    }

    async fn count(&self, sql: &'static str) -> Result<usize> {
        let n: i64 = self
            .conn
            .call(move |conn| Ok(conn.query_row(sql, [], |row| row.get(0))?))
            .await?;
        Ok(n as usize)
    }

    async fn init_schema(&self) -> Result<()> {
        let journal_mode = self
            .conn
            .call(|conn| {
                let mode: String =
                    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
                conn.execute_batch(SCHEMA)?;
                Ok(mode)
            })
            .await?;
        tracing::debug!(journal_mode = %journal_mode, "schema initialised");
        Ok(())
    }
}

// ─── RosterStore impl ────────────────────────────────────────────────────────

impl RosterStore for SqliteStore {
    type Error = crate::Error;

    async fn put_identity(&self, identity: Identity) -> Result<()> {
        let enrolled_at = encode_dt(identity.enrolled_at);
        let Identity {
            id,
            display_name,
            reference_image,
            ..
        } = identity;

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO identities
                         (id, display_name, reference_mime, reference_image, enrolled_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(id) DO UPDATE SET
                         display_name    = excluded.display_name,
                         reference_mime  = excluded.reference_mime,
                         reference_image = excluded.reference_image,
                         enrolled_at     = excluded.enrolled_at",
                    rusqlite::params![
                        id,
                        display_name,
                        reference_image.mime_type,
                        reference_image.bytes,
                        enrolled_at,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn list_identities(&self) -> Result<Vec<Identity>> {
        let raw: Vec<RawIdentity> = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, display_name, reference_mime, reference_image, enrolled_at
                     FROM identities ORDER BY rowid",
                )?;
                let rows = stmt
                    .query_map([], RawIdentity::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        raw.into_iter().map(RawIdentity::decode).collect()
    }

    async fn delete_identity(&self, id: String) -> Result<bool> {
        let deleted = self
            .conn
            .call(move |conn| {
                let n =
                    conn.execute("DELETE FROM identities WHERE id = ?1", rusqlite::params![id])?;
                Ok(n > 0)
            })
            .await?;
        Ok(deleted)
    }
}

// ─── RecordStore impl ────────────────────────────────────────────────────────

impl RecordStore for SqliteStore {
    type Error = crate::Error;

    async fn put_record(&self, record: AttendanceRecord) -> Result<()> {
        let captured_at = encode_dt(record.captured_at);
        let present_ids = encode_ids(&record.present_identity_ids)?;
        let roster_size = record.roster_size_at_capture as i64;
        let AttendanceRecord {
            id,
            scene_image,
            note,
            ..
        } = record;

        let inserted = self
            .conn
            .call(move |conn| {
                // Records are immutable: a repeated write of the same id is a no-op.
                let n = conn.execute(
                    "INSERT INTO attendance_records
                         (id, captured_at, present_ids, roster_size, scene_mime, scene_image, note)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(id) DO NOTHING",
                    rusqlite::params![
                        id,
                        captured_at,
                        present_ids,
                        roster_size,
                        scene_image.mime_type,
                        scene_image.bytes,
                        note,
                    ],
                )?;
                Ok(n > 0)
            })
            .await?;

        if !inserted {
            tracing::debug!("attendance record already stored; write skipped");
        }
        Ok(())
    }

    async fn list_records(&self) -> Result<Vec<AttendanceRecord>> {
        let raw: Vec<RawRecord> = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, captured_at, present_ids, roster_size, scene_mime, scene_image, note
                     FROM attendance_records ORDER BY rowid",
                )?;
                let rows = stmt
                    .query_map([], RawRecord::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        raw.into_iter().map(RawRecord::decode).collect()
    }
}
