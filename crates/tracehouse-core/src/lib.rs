//! TraceHouse Core Types
//!
//! This crate defines the data model shared by everything in TraceHouse - the
//! records, counters, and codecs that the index engine builds on. It performs
//! no I/O of its own.
//!
//! ## What lives here?
//!
//! - **MemTransfer**: one logged memory operation (read, write, or an error
//!   marker) with its address, length, duration, and payload bytes
//! - **Varint codec**: the 1-8 byte variable-width integer encoding used to
//!   serialize checkpoint counters compactly, in both scan directions
//! - **StrataVector**: an array of 56-bit counters, one per coarse bucket
//!   ("stratum") of the traced address space
//! - **Instant**: a snapshot of cumulative per-stratum traffic totals at a
//!   single point in the log
//! - **TransferSummary**: the cacheable metadata-only view of one transfer
//!
//! ## Layering
//!
//! ```text
//! ┌───────────────────┐
//! │ tracehouse-index  │  engine, store, caches (separate crate)
//! └─────────┬─────────┘
//!           │ builds on
//!           ▼
//! ┌───────────────────┐
//! │ tracehouse-core   │ ◄── You are here
//! │ - MemTransfer     │
//! │ - StrataVector    │
//! │ - Instant         │
//! │ - varint codec    │
//! └───────────────────┘
//! ```
//!
//! The checkpoint blob layout produced by [`Instant::pack`] is the one
//! externally-significant byte format in TraceHouse: any implementation that
//! wants to read an existing index must decode it identically.

pub mod error;
pub mod instant;
pub mod strata;
pub mod transfer;
pub mod varint;

pub use error::{Error, Result};
pub use instant::Instant;
pub use strata::StrataVector;
pub use transfer::{AlignedChunk, AlignedChunks, MemTransfer, TransferKind, TransferSummary};
