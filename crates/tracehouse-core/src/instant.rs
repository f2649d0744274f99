//! Instants - Snapshots of Cumulative Traffic
//!
//! An `Instant` is the state of the trace at one point: a timestamp, a log
//! byte offset, a running transfer-id counter, and three [`StrataVector`]s
//! holding the bytes read, written, and zero-written per stratum since the
//! start of the log.
//!
//! ## Pure function of the log prefix
//!
//! An instant is fully determined by "everything logged up to this offset".
//! Two instants are equal iff every field compares equal, which is what
//! makes checkpoint-plus-replay verifiable: replaying the same records onto
//! the same starting instant must reproduce the same instant, and replaying
//! them in reverse must restore the original.
//!
//! ## Zero accounting
//!
//! Written bytes whose payload value is zero are counted into `zero_totals`
//! *in addition to* `write_totals`, so the zero total of a stratum never
//! exceeds its write total. Consumers use the difference to distinguish
//! zero-fill traffic from payload writes.
//!
//! ## Checkpoint blob format
//!
//! [`Instant::pack`] produces the durable checkpoint encoding:
//!
//! ```text
//! ┌───────────┬──────────┬────────────┬─────────────┬──────┬───────┬──────┐
//! │ CRC32     │ time     │ log_offset │ transfer_id │ read │ write │ zero │
//! │ (4 B, LE) │ (varint) │ (varint)   │ (varint)    │ ...  │ ...   │ ...  │
//! └───────────┴──────────┴────────────┴─────────────┴──────┴───────┴──────┘
//! ```
//!
//! The CRC covers every byte after itself. A checksum or decode failure
//! means the persisted index can no longer be trusted.

use crate::error::{Error, Result};
use crate::strata::StrataVector;
use crate::transfer::{AlignedChunks, MemTransfer, TransferKind};
use crate::varint::{self, Decoded};

/// A snapshot of cumulative per-stratum traffic totals at a single time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instant {
    /// Timestamp, in log clock ticks. Totals cover transfers ending at or
    /// before this time.
    pub time: i64,
    /// Byte offset into the raw log covered by this snapshot.
    pub log_offset: u64,
    /// Id the next transfer will be assigned; equals the number of records
    /// covered by this snapshot.
    pub transfer_id: u64,
    pub read_totals: StrataVector,
    pub write_totals: StrataVector,
    pub zero_totals: StrataVector,
}

impl Instant {
    /// A zeroed instant for an index with `num_strata` strata.
    pub fn new(num_strata: usize) -> Self {
        Self {
            time: 0,
            log_offset: 0,
            transfer_id: 0,
            read_totals: StrataVector::new(num_strata),
            write_totals: StrataVector::new(num_strata),
            zero_totals: StrataVector::new(num_strata),
        }
    }

    pub fn num_strata(&self) -> usize {
        self.read_totals.count()
    }

    /// Reset to the state at the very start of the log.
    pub fn clear(&mut self) {
        self.time = 0;
        self.log_offset = 0;
        self.transfer_id = 0;
        self.read_totals.clear();
        self.write_totals.clear();
        self.zero_totals.clear();
    }

    /// Advance (or rewind) the clock.
    pub fn update_time(&mut self, amount: u32, reverse: bool) {
        if reverse {
            self.time -= amount as i64;
        } else {
            self.time += amount as i64;
        }
    }

    /// Fold one transfer's traffic into the totals, splitting its byte range
    /// at stratum boundaries. With `reverse` the same deltas are subtracted,
    /// undoing a previous forward application.
    ///
    /// Updates time and the transfer-id counter; the caller owns
    /// `log_offset`, since where the *next* record starts is knowledge of
    /// the log format.
    ///
    /// Error-kind transfers occupy a record and a time slot but carry no
    /// traffic.
    pub fn apply_transfer(
        &mut self,
        t: &MemTransfer,
        stratum_shift: u32,
        reverse: bool,
    ) -> Result<()> {
        match t.kind {
            TransferKind::Read => {
                for chunk in AlignedChunks::for_transfer(t, stratum_shift) {
                    self.read_totals
                        .update(chunk.chunk_id as usize, chunk.len as u64, reverse)?;
                }
            }
            TransferKind::Write => {
                for chunk in AlignedChunks::for_transfer(t, stratum_shift) {
                    self.write_totals
                        .update(chunk.chunk_id as usize, chunk.len as u64, reverse)?;
                    let zeros = t
                        .payload_span(chunk.span_offset, chunk.len)
                        .iter()
                        .filter(|&&b| b == 0)
                        .count() as u64;
                    if zeros > 0 {
                        self.zero_totals
                            .update(chunk.chunk_id as usize, zeros, reverse)?;
                    }
                }
            }
            _ => {}
        }

        self.update_time(t.duration, reverse);
        if reverse {
            self.transfer_id -= 1;
        } else {
            self.transfer_id += 1;
        }
        Ok(())
    }

    /// Serialize into the checkpoint blob format.
    pub fn pack(&self) -> Result<Vec<u8>> {
        let time = u64::try_from(self.time).map_err(|_| Error::NegativeTime(self.time))?;
        for v in [time, self.log_offset, self.transfer_id] {
            if v > varint::MAX {
                return Err(Error::ValueOutOfRange(v));
            }
        }

        let mut payload = Vec::with_capacity(
            24 + self.read_totals.packed_len()
                + self.write_totals.packed_len()
                + self.zero_totals.packed_len(),
        );
        varint::write(time, &mut payload);
        varint::write(self.log_offset, &mut payload);
        varint::write(self.transfer_id, &mut payload);
        self.read_totals.pack(&mut payload)?;
        self.write_totals.pack(&mut payload)?;
        self.zero_totals.pack(&mut payload)?;

        let mut buf = Vec::with_capacity(payload.len() + 4);
        buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Decode a checkpoint blob for an index with `num_strata` strata.
    ///
    /// Rejects bad checksums, truncation, and trailing garbage - any of
    /// which mean the persisted index is corrupt.
    pub fn unpack(buf: &[u8], num_strata: usize) -> Result<Self> {
        if buf.len() < 4 {
            return Err(Error::TruncatedBuffer);
        }
        let stored = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let payload = &buf[4..];
        if crc32fast::hash(payload) != stored {
            return Err(Error::ChecksumMismatch);
        }

        let mut cursor = 0;
        let mut fields = [0u64; 3];
        for field in fields.iter_mut() {
            match varint::read(&payload[cursor..]) {
                Decoded::Value { value, len } => {
                    *field = value;
                    cursor += len;
                }
                Decoded::Flag => return Err(Error::UnexpectedFlag),
                Decoded::Fence => return Err(Error::TruncatedBuffer),
            }
        }

        let (read_totals, n) = StrataVector::unpack(&payload[cursor..], num_strata)?;
        cursor += n;
        let (write_totals, n) = StrataVector::unpack(&payload[cursor..], num_strata)?;
        cursor += n;
        let (zero_totals, n) = StrataVector::unpack(&payload[cursor..], num_strata)?;
        cursor += n;

        if cursor != payload.len() {
            return Err(Error::TrailingBytes);
        }

        Ok(Self {
            time: fields[0] as i64,
            log_offset: fields[1],
            transfer_id: fields[2],
            read_totals,
            write_totals,
            zero_totals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    const SHIFT: u32 = 4; // 16-byte strata for tests

    fn write(address: u64, data: &'static [u8]) -> MemTransfer {
        MemTransfer::new(TransferKind::Write, address, data.len() as u32, 10)
            .with_data(Bytes::from_static(data))
    }

    #[test]
    fn test_apply_read_accumulates_per_stratum() {
        let mut instant = Instant::new(4);
        // 20 bytes from address 10: 6 in stratum 0, 14 in stratum 1.
        let t = MemTransfer::new(TransferKind::Read, 10, 20, 7);
        instant.apply_transfer(&t, SHIFT, false).unwrap();

        assert_eq!(instant.read_totals.get(0), 6);
        assert_eq!(instant.read_totals.get(1), 14);
        assert_eq!(instant.write_totals.get(0), 0);
        assert_eq!(instant.time, 7);
        assert_eq!(instant.transfer_id, 1);
    }

    #[test]
    fn test_apply_write_counts_zero_bytes() {
        let mut instant = Instant::new(2);
        let t = write(0, &[0, 0, 5, 0, 9]);
        instant.apply_transfer(&t, SHIFT, false).unwrap();

        assert_eq!(instant.write_totals.get(0), 5);
        assert_eq!(instant.zero_totals.get(0), 3);
        // Zero bytes are a subset of written bytes.
        assert!(instant.zero_totals.get(0) <= instant.write_totals.get(0));
    }

    #[test]
    fn test_zero_accounting_splits_with_the_payload() {
        let mut instant = Instant::new(2);
        // 8 bytes at address 12: bytes [12..16) land in stratum 0,
        // [16..20) in stratum 1. Zeros sit at span offsets 0,1 and 5.
        let t = write(12, &[0, 0, 1, 2, 3, 0, 4, 5]);
        instant.apply_transfer(&t, SHIFT, false).unwrap();

        assert_eq!(instant.write_totals.get(0), 4);
        assert_eq!(instant.write_totals.get(1), 4);
        assert_eq!(instant.zero_totals.get(0), 2);
        assert_eq!(instant.zero_totals.get(1), 1);
    }

    #[test]
    fn test_error_transfers_carry_no_traffic() {
        let mut instant = Instant::new(2);
        let t = MemTransfer::new(TransferKind::ErrorSync, 0, 100, 3);
        instant.apply_transfer(&t, SHIFT, false).unwrap();

        assert_eq!(instant.read_totals.get(0), 0);
        assert_eq!(instant.write_totals.get(0), 0);
        assert_eq!(instant.time, 3);
        assert_eq!(instant.transfer_id, 1);
    }

    #[test]
    fn test_reverse_apply_restores_prior_state() {
        let mut instant = Instant::new(4);
        let transfers = [
            MemTransfer::new(TransferKind::Read, 0, 30, 5),
            write(25, &[0, 1, 0, 2, 0]),
            MemTransfer::new(TransferKind::ErrorChecksum, 0, 0, 1),
        ];
        for t in &transfers {
            instant.apply_transfer(t, SHIFT, false).unwrap();
        }
        let after = instant.clone();

        for t in transfers.iter().rev() {
            instant.apply_transfer(t, SHIFT, true).unwrap();
        }
        assert_eq!(instant, Instant::new(4));

        // And forward again reproduces the same snapshot.
        for t in &transfers {
            instant.apply_transfer(t, SHIFT, false).unwrap();
        }
        assert_eq!(instant, after);
    }

    #[test]
    fn test_reverse_underflow_is_detected() {
        let mut instant = Instant::new(2);
        let t = MemTransfer::new(TransferKind::Read, 0, 10, 1);
        assert!(matches!(
            instant.apply_transfer(&t, SHIFT, true),
            Err(Error::CounterUnderflow { .. })
        ));
    }

    #[test]
    fn test_pack_unpack_roundtrip() {
        let mut instant = Instant::new(3);
        instant.time = 12345;
        instant.log_offset = 0x4_0000;
        instant.transfer_id = 999;
        instant.read_totals.set(0, 7);
        instant.read_totals.set(2, varint::MAX);
        instant.write_totals.set(1, 0x8899);
        instant.zero_totals.set(1, 0x11);

        let blob = instant.pack().unwrap();
        let decoded = Instant::unpack(&blob, 3).unwrap();
        assert_eq!(decoded, instant);
    }

    #[test]
    fn test_unpack_rejects_corruption() {
        let instant = Instant::new(2);
        let blob = instant.pack().unwrap();

        // Flip a payload bit: checksum must catch it.
        let mut bad = blob.clone();
        *bad.last_mut().unwrap() ^= 0x40;
        assert_eq!(Instant::unpack(&bad, 2).unwrap_err(), Error::ChecksumMismatch);

        // Truncations fail one way or another, never decode.
        for cut in 0..blob.len() {
            assert!(Instant::unpack(&blob[..cut], 2).is_err());
        }

        // Trailing bytes are rejected even with a fixed-up checksum.
        let mut padded = instant.pack().unwrap();
        padded.push(0x81);
        let crc = crc32fast::hash(&padded[4..]).to_le_bytes();
        padded[..4].copy_from_slice(&crc);
        assert_eq!(Instant::unpack(&padded, 2).unwrap_err(), Error::TrailingBytes);
    }

    #[test]
    fn test_unpack_wrong_strata_count_fails() {
        let mut instant = Instant::new(4);
        instant.read_totals.set(3, 9);
        let blob = instant.pack().unwrap();
        // A mismatched geometry cannot round-trip cleanly.
        assert!(Instant::unpack(&blob, 5).is_err());
    }

    #[test]
    fn test_pack_rejects_negative_time() {
        let mut instant = Instant::new(1);
        instant.time = -5;
        assert_eq!(instant.pack().unwrap_err(), Error::NegativeTime(-5));
    }

    #[test]
    fn test_monotonic_totals_across_applies() {
        let mut instant = Instant::new(4);
        let mut prev = instant.clone();
        let transfers = [
            MemTransfer::new(TransferKind::Read, 0, 16, 1),
            write(8, &[1, 2, 3, 4]),
            MemTransfer::new(TransferKind::Read, 40, 16, 1),
            write(0, &[0; 32]),
        ];
        for t in &transfers {
            instant.apply_transfer(t, SHIFT, false).unwrap();
            for s in 0..4 {
                assert!(instant.read_totals.get(s) >= prev.read_totals.get(s));
                assert!(instant.write_totals.get(s) >= prev.write_totals.get(s));
                assert!(instant.zero_totals.get(s) >= prev.zero_totals.get(s));
            }
            prev = instant.clone();
        }
    }
}
