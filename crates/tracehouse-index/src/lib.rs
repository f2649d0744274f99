//! TraceHouse Index Engine
//!
//! This crate turns an append-structured log of memory-transfer events into
//! a durable index that answers temporal queries without rescanning the log:
//!
//! - "What was the cumulative state of memory traffic at time T?"
//!   ([`LogIndex::get_instant`])
//! - "What transfer has id N?" ([`LogIndex::get_transfer_summary`])
//! - "Which transfer is nearest time T?" ([`LogIndex::get_closest_transfer`])
//! - "What did this chunk of memory contain at time T?"
//!   ([`LogIndex::get_block`])
//!
//! ## How it works
//!
//! ```text
//! ┌───────────┐ scan once ┌──────────────┐ checkpoint   ┌────────────────┐
//! │ trace log ├──────────→│ index worker ├─────────────→│ SQLite store   │
//! └───────────┘           │ (background) │  every 96KiB │ instants+blocks│
//!                         └──────┬───────┘              └───────┬────────┘
//!                                │ progress                     │
//!                                ▼                              ▼
//!                         ┌──────────────┐  binary search + bounded replay
//!                         │   queries    │◄─────────────────────┘
//!                         │ (fuzzy LRU   │
//!                         │  caches)     │
//!                         └──────────────┘
//! ```
//!
//! One background worker scans the log exactly once, maintaining a running
//! [`tracehouse_core::Instant`] and persisting it at byte-distance
//! intervals. Queries find the nearest checkpoint and replay the handful of
//! records between it and the requested time - so both query latency and
//! index size stay bounded regardless of log length. A fuzzy cache layer
//! lets interactive consumers trade exactness for latency.
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use tracehouse_index::{IndexConfig, LogIndex, MemoryLogBuilder, SqliteIndexStore};
//!
//! let store = Arc::new(SqliteIndexStore::new("trace-index.db").await?);
//! let index = LogIndex::new(store, IndexConfig::default());
//!
//! let log = Arc::new(my_reader); // anything implementing LogReader
//! index.open(log).await?;
//!
//! // Queries are valid immediately; they answer from whatever has been
//! // committed so far.
//! let instant = index.get_instant(1_000_000, 0).await?;
//! println!("bytes written in stratum 0: {}", instant.write_totals.get(0));
//!
//! index.wait_for_completion().await?;
//! index.close().await;
//! ```
//!
//! ## Concurrency model
//!
//! Exactly one indexing worker (producer) and any number of querying tasks
//! (consumers). Two mutual-exclusion domains, always acquired in this
//! order: the data lock (reader handle, caches, running tail of the index)
//! first, then the persistence domain (the store's connection pool and its
//! per-checkpoint transactions). Queries never wait for indexing to finish
//! - only for sub-millisecond field reads.

pub mod block;
pub mod cache;
pub mod config;
pub mod error;
pub mod index;
pub mod reader;
pub mod store;

pub use block::LogBlock;
pub use cache::{FuzzyCache, FuzzyKey, Generate};
pub use config::IndexConfig;
pub use error::{Error, Result};
pub use index::{IndexState, LogIndex, ProgressUpdate};
pub use reader::{LogReader, MemoryLogBuilder, MemoryLogReader};
pub use store::{BlockVersion, CheckpointRow, IndexStore, SqliteIndexStore};
