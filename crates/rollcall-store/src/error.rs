//! Error type for `rollcall-store`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("date/time parse error: {0}")]
    DateParse(String),

    #[error("invalid roster size stored for record {id}: {value}")]
    InvalidRosterSize { id: String, value: i64 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
