//! Log Reader Abstraction
//!
//! The index engine never touches the physical byte layout of a trace log.
//! Everything it needs is behind the [`LogReader`] trait: the size of the
//! traced address space, the total log length, and record-at-a-time access
//! by byte offset in both directions. To support a new capture format, this
//! trait is the only thing that needs implementing.
//!
//! ## Offsets are the cursor
//!
//! A log offset is a byte position at a record boundary. `read_at` decodes
//! the record starting there, `next_offset` says where the following record
//! starts, and `prev_offset` walks backward - which is what makes reverse
//! replay possible without re-scanning from the start of the log.
//!
//! ## MemoryLogReader
//!
//! The built-in [`MemoryLogReader`] serves a synthetic log assembled with
//! [`MemoryLogBuilder`]. Tests use it heavily, and it is the reference
//! answer for "what must a reader implementation guarantee".

use bytes::Bytes;
use tracehouse_core::{MemTransfer, TransferKind};

use crate::error::{Error, Result};

/// Record-at-a-time access to a trace log, independent of its wire format.
pub trait LogReader: Send + Sync {
    /// Size of the traced address space, in bytes.
    fn mem_size(&self) -> u64;

    /// Total length of the log, in bytes. Used as the progress denominator.
    fn len_bytes(&self) -> u64;

    /// Decode the record starting at `log_offset`.
    ///
    /// Returns `Ok(None)` at the end of the log. An offset that is not a
    /// record boundary is a read error.
    fn read_at(&self, log_offset: u64) -> Result<Option<MemTransfer>>;

    /// Byte offset just past the given record.
    fn next_offset(&self, t: &MemTransfer) -> u64;

    /// Byte offset of the record immediately preceding the record boundary
    /// `log_offset`, or `None` at the start of the log.
    fn prev_offset(&self, log_offset: u64) -> Result<Option<u64>>;
}

/// Fixed per-record framing overhead in the synthetic log.
const RECORD_HEADER_LEN: u64 = 8;

/// An in-memory trace log for tests and embedders that decode their own
/// capture formats up front.
pub struct MemoryLogReader {
    mem_size: u64,
    records: Vec<MemTransfer>,
    /// Start offset of each record, parallel to `records`.
    offsets: Vec<u64>,
    len_bytes: u64,
}

impl MemoryLogReader {
    fn record_len(t: &MemTransfer) -> u64 {
        RECORD_HEADER_LEN + t.byte_count as u64
    }
}

impl LogReader for MemoryLogReader {
    fn mem_size(&self) -> u64 {
        self.mem_size
    }

    fn len_bytes(&self) -> u64 {
        self.len_bytes
    }

    fn read_at(&self, log_offset: u64) -> Result<Option<MemTransfer>> {
        if log_offset >= self.len_bytes {
            return Ok(None);
        }
        match self.offsets.binary_search(&log_offset) {
            Ok(i) => Ok(Some(self.records[i].clone())),
            Err(_) => Err(Error::Read(format!(
                "offset {} is not a record boundary",
                log_offset
            ))),
        }
    }

    fn next_offset(&self, t: &MemTransfer) -> u64 {
        t.log_offset + Self::record_len(t)
    }

    fn prev_offset(&self, log_offset: u64) -> Result<Option<u64>> {
        if log_offset == 0 {
            return Ok(None);
        }
        // The preceding record is the one that ends exactly at log_offset.
        match self.offsets.binary_search(&log_offset) {
            Ok(i) => Ok(Some(self.offsets[i - 1])),
            Err(i) if i == self.offsets.len() && log_offset == self.len_bytes && i > 0 => {
                Ok(Some(self.offsets[i - 1]))
            }
            _ => Err(Error::Read(format!(
                "offset {} is not a record boundary",
                log_offset
            ))),
        }
    }
}

/// Builder for a [`MemoryLogReader`].
///
/// Records are framed sequentially in push order; offsets and the total log
/// length fall out of the record sizes.
pub struct MemoryLogBuilder {
    mem_size: u64,
    records: Vec<MemTransfer>,
}

impl MemoryLogBuilder {
    pub fn new(mem_size: u64) -> Self {
        Self {
            mem_size,
            records: Vec::new(),
        }
    }

    /// Append an arbitrary record. Its `log_offset` and `id` are assigned at
    /// build time.
    pub fn push(mut self, t: MemTransfer) -> Self {
        self.records.push(t);
        self
    }

    /// Append a read of `byte_count` bytes at `address` taking `duration`
    /// ticks.
    pub fn read(self, address: u64, byte_count: u32, duration: u32) -> Self {
        self.push(MemTransfer::new(
            TransferKind::Read,
            address,
            byte_count,
            duration,
        ))
    }

    /// Append a write of `data` at `address` taking `duration` ticks.
    pub fn write(self, address: u64, data: impl Into<Bytes>, duration: u32) -> Self {
        let data = data.into();
        let byte_count = data.len() as u32;
        self.push(MemTransfer::new(TransferKind::Write, address, byte_count, duration).with_data(data))
    }

    /// Append a zero-fill: a write whose payload is all zero bytes.
    pub fn zero_fill(self, address: u64, byte_count: u32, duration: u32) -> Self {
        self.write(address, vec![0u8; byte_count as usize], duration)
    }

    /// Append an error marker record.
    pub fn error(self, kind: TransferKind, duration: u32) -> Self {
        debug_assert!(kind.is_error());
        self.push(MemTransfer::new(kind, 0, 0, duration))
    }

    pub fn build(self) -> MemoryLogReader {
        let mut offsets = Vec::with_capacity(self.records.len());
        let mut cursor = 0u64;
        let mut records = self.records;
        for t in records.iter_mut() {
            t.log_offset = cursor;
            offsets.push(cursor);
            cursor += MemoryLogReader::record_len(t);
        }
        MemoryLogReader {
            mem_size: self.mem_size,
            records,
            offsets,
            len_bytes: cursor,
        }
    }
}
