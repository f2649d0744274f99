//! Error Types for TraceHouse Core
//!
//! This module defines the error types shared by the core codecs.
//!
//! ## Error Categories
//!
//! ### Codec Errors
//! - `TruncatedBuffer`: a counter was cut off by the end of the buffer
//! - `UnexpectedFlag`: a flag byte appeared where a counter was expected
//! - `TrailingBytes`: a checkpoint blob carried bytes past its last field
//! - `ChecksumMismatch`: a checkpoint blob failed CRC32 validation
//!
//! ### Counter Errors
//! - `CounterOverflow`: a stratum counter left the 56-bit encodable range
//! - `CounterUnderflow`: reverse replay tried to push a counter below zero.
//!   The index layer reports this as a corrupt index, since it can only
//!   happen when the data being replayed disagrees with the checkpoint it
//!   started from.
//!
//! ## Usage
//! All fallible functions in this crate return `Result<T>` which is aliased
//! to `Result<T, Error>`, so call sites propagate with `?`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("Buffer truncated while decoding a counter")]
    TruncatedBuffer,

    #[error("Flag byte found where a counter was expected")]
    UnexpectedFlag,

    #[error("Trailing bytes after the last decoded field")]
    TrailingBytes,

    #[error("Checksum mismatch")]
    ChecksumMismatch,

    #[error("Counter overflow in stratum {stratum}: {value}")]
    CounterOverflow { stratum: usize, value: u64 },

    #[error("Counter underflow in stratum {stratum}: {value} - {delta}")]
    CounterUnderflow {
        stratum: usize,
        value: u64,
        delta: u64,
    },

    #[error("Value out of varint range: {0}")]
    ValueOutOfRange(u64),

    #[error("Cannot serialize a negative timestamp: {0}")]
    NegativeTime(i64),
}
