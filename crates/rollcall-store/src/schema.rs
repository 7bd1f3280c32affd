//! SQL schema for the Rollcall SQLite store.
//!
//! Two independently keyed collections and no secondary indices: every
//! read is a full scan, ordered by the caller. The journal mode is set
//! separately because that pragma returns a row.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS identities (
    id              TEXT PRIMARY KEY,
    display_name    TEXT NOT NULL,
    reference_mime  TEXT NOT NULL,
    reference_image BLOB NOT NULL,
    enrolled_at     TEXT NOT NULL    -- RFC 3339 UTC
);

-- Records are append-only. No UPDATE is ever issued against this table.
CREATE TABLE IF NOT EXISTS attendance_records (
    id           TEXT PRIMARY KEY,
    captured_at  TEXT NOT NULL,      -- RFC 3339 UTC
    present_ids  TEXT NOT NULL,      -- JSON array of identity ids
    roster_size  INTEGER NOT NULL,
    scene_mime   TEXT NOT NULL,
    scene_image  BLOB NOT NULL,
    note         TEXT
);

PRAGMA user_version = 1;
";
