//! Memory Transfer Records
//!
//! This module defines `MemTransfer` - the lowest-level unit of a trace log:
//! one read, write, or error marker with an address, length, duration, and
//! payload bytes. It should stay independent of any on-disk log format.
//!
//! ## Transfer kinds
//!
//! Besides plain reads and writes, capture hardware emits error markers when
//! it loses track of the bus: buffer overruns, sync slips, bad checksums,
//! protocol violations. These occupy log records and receive transfer ids
//! like any other record, but they contribute no traffic totals. The
//! `ErrorUnavail` kind doubles as the "not found" sentinel for lookups.
//!
//! ## Aligned chunking
//!
//! A transfer may straddle several strata or blocks. [`AlignedChunks`] walks
//! one transfer's byte range split at power-of-two boundaries, yielding the
//! exact byte-range intersection with each bucket - this is the one true
//! apportionment rule used for both strata accounting and block dirtying.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Largest payload one transfer record may carry.
pub const MAX_TRANSFER_LEN: usize = 4096;

/// What a logged record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    Read,
    Write,

    /// Capture buffer overflow indicator.
    ErrorOverflow,
    /// Record boundary sync problem.
    ErrorSync,
    /// Record data checksum problem.
    ErrorChecksum,
    /// Higher-level memory protocol error.
    ErrorProtocol,
    /// Data not (currently) available; also the not-found sentinel.
    ErrorUnavail,
}

impl TransferKind {
    pub fn is_error(self) -> bool {
        !matches!(self, TransferKind::Read | TransferKind::Write)
    }

    pub fn name(self) -> &'static str {
        match self {
            TransferKind::Read => "Read",
            TransferKind::Write => "Write",
            TransferKind::ErrorOverflow => "Overflow Error",
            TransferKind::ErrorSync => "Sync Error",
            TransferKind::ErrorChecksum => "Checksum Error",
            TransferKind::ErrorProtocol => "Protocol Error",
            TransferKind::ErrorUnavail => "(Unavailable)",
        }
    }
}

impl std::fmt::Display for TransferKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One logged memory operation.
///
/// Immutable once read from the log. `id` is assigned densely during
/// indexing; `log_offset` is the record's byte position in the raw log and
/// the primary scan cursor. `data` carries payload bytes for writes (used
/// for zero accounting and block contents) and may be empty when a log
/// format does not capture payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemTransfer {
    pub kind: TransferKind,
    pub address: u64,
    pub byte_count: u32,
    pub duration: u32,
    pub log_offset: u64,
    pub id: u64,
    pub data: Bytes,
}

impl MemTransfer {
    pub fn new(kind: TransferKind, address: u64, byte_count: u32, duration: u32) -> Self {
        Self {
            kind,
            address,
            byte_count,
            duration,
            log_offset: 0,
            id: 0,
            data: Bytes::new(),
        }
    }

    pub fn with_data(mut self, data: Bytes) -> Self {
        debug_assert!(data.len() <= MAX_TRANSFER_LEN);
        self.data = data;
        self
    }

    pub fn is_error(&self) -> bool {
        self.kind.is_error()
    }

    /// Payload bytes for the span `[span_offset, span_offset + len)`, or an
    /// empty slice when the payload was not captured that far.
    pub fn payload_span(&self, span_offset: u32, len: u32) -> &[u8] {
        let start = (span_offset as usize).min(self.data.len());
        let end = (span_offset as usize + len as usize).min(self.data.len());
        &self.data[start..end]
    }
}

/// Metadata-only view of one transfer, as returned by index lookups.
///
/// Unlike [`MemTransfer`] this carries a timestamp - the *end* of the
/// transfer, consistent with how snapshots accumulate time - and no payload.
/// Summaries are immutable and shared by reference once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSummary {
    /// End-of-transfer timestamp.
    pub time: i64,
    pub kind: TransferKind,
    pub address: u64,
    pub byte_count: u32,
    pub log_offset: u64,
    pub id: u64,
}

impl TransferSummary {
    /// The distinguished not-found / error sentinel for `id`.
    pub fn unavailable(id: u64) -> Self {
        Self {
            time: -1,
            kind: TransferKind::ErrorUnavail,
            address: 0,
            byte_count: 0,
            log_offset: u64::MAX,
            id,
        }
    }

    /// Summarize a transfer that ends at `end_time`.
    pub fn from_transfer(t: &MemTransfer, end_time: i64) -> Self {
        Self {
            time: end_time,
            kind: t.kind,
            address: t.address,
            byte_count: t.byte_count,
            log_offset: t.log_offset,
            id: t.id,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind.is_error()
    }
}

/// One aligned piece of a transfer's byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignedChunk {
    /// Offset of this chunk within the transfer's payload.
    pub span_offset: u32,
    /// Offset of this chunk within its bucket.
    pub chunk_offset: u32,
    /// Bucket number (address >> shift).
    pub chunk_id: u64,
    /// Bytes of the transfer falling in this bucket.
    pub len: u32,
}

/// Iterator that splits a transfer's byte range at `1 << shift` boundaries.
///
/// Yields nothing for an empty range. Byte counts are apportioned by exact
/// intersection with each bucket, never approximated.
#[derive(Debug, Clone)]
pub struct AlignedChunks {
    size: u64,
    byte_count: u32,
    span_offset: u32,
    chunk_offset: u64,
    chunk_id: u64,
    last_chunk: u64,
    done: bool,
}

impl AlignedChunks {
    pub fn new(address: u64, byte_count: u32, shift: u32) -> Self {
        let size = 1u64 << shift;
        let mask = size - 1;
        if byte_count == 0 {
            return Self {
                size,
                byte_count,
                span_offset: 0,
                chunk_offset: 0,
                chunk_id: 0,
                last_chunk: 0,
                done: true,
            };
        }
        Self {
            size,
            byte_count,
            span_offset: 0,
            chunk_offset: address & mask,
            chunk_id: address >> shift,
            last_chunk: (address + byte_count as u64 - 1) >> shift,
            done: false,
        }
    }

    /// Split a transfer at bucket boundaries.
    pub fn for_transfer(t: &MemTransfer, shift: u32) -> Self {
        Self::new(t.address, t.byte_count, shift)
    }
}

impl Iterator for AlignedChunks {
    type Item = AlignedChunk;

    fn next(&mut self) -> Option<AlignedChunk> {
        if self.done {
            return None;
        }
        let len = u32::min(
            (self.size - self.chunk_offset) as u32,
            self.byte_count - self.span_offset,
        );
        let item = AlignedChunk {
            span_offset: self.span_offset,
            chunk_offset: self.chunk_offset as u32,
            chunk_id: self.chunk_id,
            len,
        };

        self.span_offset += len;
        self.chunk_offset = 0;
        self.chunk_id += 1;
        if self.chunk_id > self.last_chunk {
            self.done = true;
        }
        Some(item)
    }
}
