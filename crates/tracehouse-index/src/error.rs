//! Index Error Types
//!
//! This module defines all error types that can occur while building or
//! querying a trace index.
//!
//! ## Error Categories
//!
//! ### Fatal during indexing
//! - `Read`: the log reader failed or returned truncated data
//! - `Persistence`: the durable checkpoint store failed
//!
//! Either stops the indexing worker and moves the index to the `Error`
//! state. Nothing is retried automatically; the caller may close and reopen
//! the index to start over.
//!
//! ### Fatal per query
//! - `CorruptIndex`: a checkpoint blob failed its checksum or decode, or a
//!   counter would go negative during replay. The query is aborted rather
//!   than answered with wrong data.
//!
//! ### Never errors
//! "Not found" is not an error anywhere in this crate: lookups for ids or
//! times outside the valid range return the unavailable sentinel value.
//!
//! ## Usage
//!
//! All operations return `Result<T>` which is aliased to
//! `Result<T, Error>`, so call sites propagate with `?`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Log read failed: {0}")]
    Read(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    #[error("Indexing failed: {0}")]
    IndexingFailed(String),

    #[error("Index is already open")]
    AlreadyOpen,

    #[error("Index is not open")]
    NotOpen,
}

// Core codec failures surface while decoding checkpoints or replaying
// transfers onto them, so they all indicate a corrupted index.
impl From<tracehouse_core::Error> for Error {
    fn from(e: tracehouse_core::Error) -> Self {
        Error::CorruptIndex(e.to_string())
    }
}
