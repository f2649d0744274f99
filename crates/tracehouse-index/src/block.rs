//! Memory Block Snapshots
//!
//! Strata answer "how much traffic", blocks answer "what did memory say".
//! A block is a small fixed-size chunk of the address space (512 bytes by
//! default - far finer than a stratum). While indexing, the worker keeps the
//! running contents of every block touched by a write; at each checkpoint it
//! persists the blocks dirtied since the previous checkpoint, versioned by
//! the checkpoint's log offset. A content query then reads the newest
//! version at or before the instant it resolved.
//!
//! A block that was never written reads as zeroes.

use std::collections::{BTreeSet, HashMap};

use bytes::Bytes;
use tracehouse_core::{AlignedChunks, MemTransfer, TransferKind};

use crate::store::BlockVersion;

/// A chunk of memory contents from a specific point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogBlock {
    /// First address covered by the block.
    pub address: u64,
    /// Timestamp of the instant the contents were resolved for.
    pub time: i64,
    pub data: Bytes,
}

impl LogBlock {
    /// A never-written block: all zeroes.
    pub fn zeroed(address: u64, time: i64, size: usize) -> Self {
        Self {
            address,
            time,
            data: Bytes::from(vec![0u8; size]),
        }
    }
}

/// Running block contents plus the set dirtied since the last checkpoint.
///
/// Owned exclusively by the indexing worker; never shared.
pub(crate) struct BlockTracker {
    shift: u32,
    size: usize,
    contents: HashMap<u64, Vec<u8>>,
    dirty: BTreeSet<u64>,
}

impl BlockTracker {
    pub fn new(shift: u32) -> Self {
        Self {
            shift,
            size: 1 << shift,
            contents: HashMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    /// Fold a write's captured payload into the affected blocks.
    ///
    /// Payload bytes beyond what the log captured leave the existing block
    /// contents in place, but the blocks still count as dirtied - the write
    /// happened even if its bytes were not recorded.
    pub fn record_write(&mut self, t: &MemTransfer) {
        if t.kind != TransferKind::Write {
            return;
        }
        for chunk in AlignedChunks::for_transfer(t, self.shift) {
            let block = self
                .contents
                .entry(chunk.chunk_id)
                .or_insert_with(|| vec![0u8; self.size]);
            let payload = t.payload_span(chunk.span_offset, chunk.len);
            let start = chunk.chunk_offset as usize;
            block[start..start + payload.len()].copy_from_slice(payload);
            self.dirty.insert(chunk.chunk_id);
        }
    }

    /// Take the blocks dirtied since the last call, in block-id order, and
    /// reset the dirty set. Contents are retained for later writes.
    pub fn take_dirty(&mut self) -> Vec<BlockVersion> {
        let dirty = std::mem::take(&mut self.dirty);
        dirty
            .into_iter()
            .map(|block_id| BlockVersion {
                block_id,
                data: self.contents[&block_id].clone(),
            })
            .collect()
    }
}
