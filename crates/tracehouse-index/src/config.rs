//! Index Configuration
//!
//! Tuning knobs for index geometry and cache sizing. All of these are
//! density/performance trade-offs, not correctness invariants: a denser
//! timestep means more checkpoints and shorter replays, a coarser stratum
//! shift means fewer counters per checkpoint.

use serde::{Deserialize, Serialize};

/// Configuration for a [`crate::LogIndex`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Maximum bytes of log scanned between checkpoints.
    ///
    /// Smaller steps give better cold-cache query latency; larger steps keep
    /// the index small on big logs.
    pub timestep_bytes: u64,

    /// log2 of the stratum size. 14 means 16 KiB strata (1024 strata per
    /// 16 MiB of traced memory).
    pub stratum_shift: u32,

    /// log2 of the block size used for content snapshots. 9 means 512-byte
    /// blocks.
    pub block_shift: u32,

    /// Capacity of the instant cache (entries).
    pub instant_cache_size: usize,

    /// Capacity of the transfer-summary cache (entries).
    pub transfer_cache_size: usize,

    /// Minimum progress change worth notifying subscribers about.
    pub progress_epsilon: f64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            timestep_bytes: 96 * 1024,
            stratum_shift: 14,
            block_shift: 9,
            instant_cache_size: 1 << 15,
            transfer_cache_size: 1 << 12,
            progress_epsilon: 0.001,
        }
    }
}

impl IndexConfig {
    pub fn stratum_size(&self) -> u64 {
        1 << self.stratum_shift
    }

    pub fn block_size(&self) -> usize {
        1 << self.block_shift
    }

    /// Strata needed to cover `mem_size` bytes of address space.
    pub fn num_strata(&self, mem_size: u64) -> usize {
        (mem_size.div_ceil(self.stratum_size())) as usize
    }

    /// Blocks needed to cover `mem_size` bytes of address space.
    pub fn num_blocks(&self, mem_size: u64) -> usize {
        (mem_size.div_ceil(1 << self.block_shift)) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_expected_geometry() {
        let config = IndexConfig::default();
        assert_eq!(config.stratum_size(), 16 * 1024);
        assert_eq!(config.block_size(), 512);
        // 16 MiB of traced memory: 1024 strata, 32768 blocks.
        assert_eq!(config.num_strata(16 * 1024 * 1024), 1024);
        assert_eq!(config.num_blocks(16 * 1024 * 1024), 32768);
    }

    #[test]
    fn test_partial_buckets_round_up() {
        let config = IndexConfig::default();
        assert_eq!(config.num_strata(16 * 1024 + 1), 2);
        assert_eq!(config.num_strata(150), 1);
        assert_eq!(config.num_blocks(513), 2);
        assert_eq!(config.num_strata(0), 0);
    }
}
