//! The Log Index Engine
//!
//! This module owns the whole lifecycle of a trace index: a background
//! worker that scans the log once and persists periodic checkpoints, and a
//! query surface that answers from checkpoint-plus-bounded-replay.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  read_at / next_offset   ┌────────────┐
//! │ Index worker ├─────────────────────────→│ LogReader  │
//! │ (one task)   │                          └────────────┘
//! │  instant +   │  put_checkpoint (tx)     ┌────────────┐
//! │  dirty blocks├─────────────────────────→│ IndexStore │
//! └──────┬───────┘                          └─────┬──────┘
//!        │ publish (state, progress,              │ ordered lookups
//!        │          last_instant)                 │
//!        ▼                                        ▼
//! ┌──────────────┐   get / generate        ┌────────────┐
//! │ shared state │◄────────────────────────┤  queries   │
//! │ (data lock)  │                         │ (any task) │
//! └──────────────┘                         └────────────┘
//! ```
//!
//! ## The indexing loop
//!
//! The worker starts from a zeroed [`Instant`] at offset 0 and folds in one
//! transfer at a time: apportion the byte range across strata, account zero
//! bytes for writes, track dirtied blocks, advance the clock, assign the
//! next dense transfer id. Every `timestep_bytes` of log progress it packs
//! the running instant and persists it - atomically with the blocks dirtied
//! since the previous checkpoint - then publishes progress. At end of log a
//! final checkpoint and a completion marker land, and the state machine goes
//! `Finishing -> Complete`.
//!
//! ## Queries: checkpoint + bounded replay
//!
//! `get_instant(T, 0)` finds the checkpoint nearest `T` (either side) and
//! replays the few records between it and `T` - forward applying deltas, or
//! backward undoing them when the checkpoint overshoots. Replay work is
//! bounded by the timestep, so query latency does not grow with log size.
//! With a tolerance, a cached or checkpointed instant within range is
//! returned without any replay at all.
//!
//! `get_transfer_summary(id)` binary-searches checkpoints by transfer id
//! and scans forward at most one timestep. Summary lookups - including
//! misses - are cached, so repeating them never rescans the log.
//!
//! ## Failure semantics
//!
//! Reader or store failures during indexing are fatal to this index
//! instance: the worker stops and the state becomes `Error`. Queries issued
//! in that state return unavailable sentinels instead of failing. A corrupt
//! checkpoint (bad checksum, counter underflow during replay) aborts the
//! query with an error rather than returning wrong data.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use bytes::Bytes;
use tracehouse_core::{Instant, TransferSummary};

use crate::block::{BlockTracker, LogBlock};
use crate::cache::{FuzzyCache, Generate};
use crate::config::IndexConfig;
use crate::error::{Error, Result};
use crate::reader::LogReader;
use crate::store::{CheckpointRow, IndexStore};

/// Marker key recording that a previous run fully indexed this log.
const MARKER_COMPLETE: &str = "index_complete";

/// Lifecycle of a [`LogIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexState {
    /// No log attached.
    Idle,
    /// The worker is scanning the log.
    Indexing,
    /// Scan finished; final checkpoint being written.
    Finishing,
    /// The whole log is indexed.
    Complete,
    /// Indexing hit an unrecoverable reader or store failure.
    Error,
}

/// One progress notification, delivered whenever the state changes or
/// progress moves by a meaningful increment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUpdate {
    pub state: IndexState,
    /// Fraction of the log scanned, in [0, 1]. Reaches 1.0 at `Complete`.
    pub progress: f64,
}

/// Fields guarded by the data lock. Lock order: this lock first, then any
/// store operation; never the other way around.
struct DataState {
    reader: Option<Arc<dyn LogReader>>,
    last_instant: Arc<Instant>,
    state: IndexState,
    progress: f64,
    last_error: Option<String>,
    num_strata: usize,
    mem_size: u64,
}

struct IndexShared {
    config: IndexConfig,
    store: Arc<dyn IndexStore>,
    data: Mutex<DataState>,
    progress_tx: watch::Sender<ProgressUpdate>,
}

impl IndexShared {
    async fn reader_and_geometry(&self) -> Result<(Arc<dyn LogReader>, usize)> {
        let data = self.data.lock().await;
        let reader = data.reader.clone().ok_or(Error::NotOpen)?;
        Ok((reader, data.num_strata))
    }

    /// Publish worker progress. Holds the data lock only for the field
    /// updates; notification uses the watch channel.
    async fn publish(&self, state: IndexState, progress: f64, last: Option<Arc<Instant>>) {
        let mut data = self.data.lock().await;
        let state_changed = data.state != state;
        let progress = progress.clamp(0.0, 1.0).max(data.progress);
        let significant = progress - data.progress >= self.config.progress_epsilon;

        data.state = state;
        data.progress = progress;
        if let Some(last) = last {
            data.last_instant = last;
        }

        if state_changed || significant {
            let _ = self.progress_tx.send(ProgressUpdate { state, progress });
        }
    }

    async fn fail(&self, e: &Error) {
        let mut data = self.data.lock().await;
        data.state = IndexState::Error;
        data.last_error = Some(e.to_string());
        let progress = data.progress;
        let _ = self.progress_tx.send(ProgressUpdate {
            state: IndexState::Error,
            progress,
        });
    }

    /// Compute the exact instant at `target` by decoding the nearest
    /// checkpoint and replaying the records between it and `target`.
    async fn exact_instant_at(&self, target: i64) -> Result<Instant> {
        let (reader, num_strata) = self.reader_and_geometry().await?;

        // Candidate starting points: the latest checkpoint at or before the
        // target, the zeroed start-of-log instant, and the first checkpoint
        // after the target (replayed backward). Closest wins; a tie keeps
        // the earlier side.
        let before = self.store.checkpoint_at_or_before_time(target).await?;
        let after = self.store.checkpoint_after_time(target).await?;

        let best_distance = match &before {
            Some(cp) => cp.time.abs_diff(target),
            None => 0i64.abs_diff(target),
        };
        let mut start = before;
        if let Some(cp) = after {
            if cp.time.abs_diff(target) < best_distance {
                start = Some(cp);
            }
        }

        let instant = match start {
            Some(cp) => Instant::unpack(&cp.blob, num_strata)?,
            None => Instant::new(num_strata),
        };
        self.replay(reader.as_ref(), instant, target)
    }

    /// Replay records between `instant` and `target`, in whichever
    /// direction is needed. `instant` must come from a checkpoint (or the
    /// zeroed start), so its time is the accumulated record time.
    fn replay(
        &self,
        reader: &dyn LogReader,
        mut instant: Instant,
        target: i64,
    ) -> Result<Instant> {
        let shift = self.config.stratum_shift;

        if instant.time <= target {
            // Forward: fold in every record ending at or before the target.
            let mut cursor = instant.log_offset;
            while let Some(mut t) = reader.read_at(cursor)? {
                if instant.time + t.duration as i64 > target {
                    break;
                }
                t.id = instant.transfer_id;
                instant.apply_transfer(&t, shift, false)?;
                cursor = reader.next_offset(&t);
                instant.log_offset = cursor;
            }
        } else {
            // Backward: undo every record ending after the target.
            while instant.time > target {
                let Some(prev) = reader.prev_offset(instant.log_offset)? else {
                    break;
                };
                let Some(mut t) = reader.read_at(prev)? else {
                    return Err(Error::CorruptIndex(format!(
                        "no record at offset {} during reverse replay",
                        prev
                    )));
                };
                t.id = instant.transfer_id.checked_sub(1).ok_or_else(|| {
                    Error::CorruptIndex("transfer id underflow during reverse replay".into())
                })?;
                instant.apply_transfer(&t, shift, true)?;
                instant.log_offset = prev;
            }
        }

        instant.time = target;
        Ok(instant)
    }

    /// Locate the record with the given dense id: binary search the
    /// checkpoints, then scan forward at most one timestep.
    async fn summarize_transfer(&self, id: u64) -> Result<Arc<TransferSummary>> {
        let (reader, _) = self.reader_and_geometry().await?;

        let start = self.store.checkpoint_at_or_before_id(id).await?;
        let (mut cursor, mut next_id, mut time) = match start {
            Some(cp) => (cp.log_offset, cp.transfer_id, cp.time),
            None => (0, 0, 0),
        };

        loop {
            let Some(mut t) = reader.read_at(cursor)? else {
                // The id was in range when the caller checked, so this only
                // happens if the log shrank under us.
                return Ok(Arc::new(TransferSummary::unavailable(id)));
            };
            time += t.duration as i64;
            if next_id == id {
                t.id = id;
                return Ok(Arc::new(TransferSummary::from_transfer(&t, time)));
            }
            next_id += 1;
            cursor = reader.next_offset(&t);
        }
    }
}

/// Instant generation for the fuzzy cache: checkpoint lookup plus replay.
struct InstantSource {
    shared: Arc<IndexShared>,
}

#[async_trait]
impl Generate<i64, Arc<Instant>> for InstantSource {
    async fn generate(&self, time: i64) -> Result<Arc<Instant>> {
        self.shared.exact_instant_at(time).await.map(Arc::new)
    }
}

/// Transfer summary generation for the fuzzy cache.
struct TransferSource {
    shared: Arc<IndexShared>,
}

#[async_trait]
impl Generate<u64, Arc<TransferSummary>> for TransferSource {
    async fn generate(&self, id: u64) -> Result<Arc<TransferSummary>> {
        self.shared.summarize_transfer(id).await
    }
}

struct Worker {
    handle: JoinHandle<()>,
    stop: watch::Sender<bool>,
}

/// A durable index over one trace log.
///
/// Create it over an [`IndexStore`], then [`open`](Self::open) a reader to
/// start the background indexing worker. Queries are valid immediately and
/// answer from whatever has been committed so far.
pub struct LogIndex {
    shared: Arc<IndexShared>,
    instant_cache: Arc<FuzzyCache<i64, Arc<Instant>>>,
    transfer_cache: Arc<FuzzyCache<u64, Arc<TransferSummary>>>,
    worker: Mutex<Option<Worker>>,
}

impl LogIndex {
    pub fn new(store: Arc<dyn IndexStore>, config: IndexConfig) -> Self {
        let (progress_tx, _) = watch::channel(ProgressUpdate {
            state: IndexState::Idle,
            progress: 0.0,
        });
        let shared = Arc::new(IndexShared {
            config: config.clone(),
            store,
            data: Mutex::new(DataState {
                reader: None,
                last_instant: Arc::new(Instant::new(0)),
                state: IndexState::Idle,
                progress: 0.0,
                last_error: None,
                num_strata: 0,
                mem_size: 0,
            }),
            progress_tx,
        });

        let instant_cache = Arc::new(FuzzyCache::new(
            config.instant_cache_size,
            Arc::new(InstantSource {
                shared: shared.clone(),
            }) as Arc<dyn Generate<i64, Arc<Instant>>>,
        ));
        let transfer_cache = Arc::new(FuzzyCache::new(
            config.transfer_cache_size,
            Arc::new(TransferSource {
                shared: shared.clone(),
            }) as Arc<dyn Generate<u64, Arc<TransferSummary>>>,
        ));

        Self {
            shared,
            instant_cache,
            transfer_cache,
            worker: Mutex::new(None),
        }
    }

    /// Attach a log and start indexing it on a background task.
    ///
    /// If the store already holds a finished index for this exact log and
    /// geometry, the scan is skipped and the index goes straight to
    /// `Complete`.
    pub async fn open(&self, reader: Arc<dyn LogReader>) -> Result<()> {
        {
            let mut data = self.shared.data.lock().await;
            if data.reader.is_some() {
                return Err(Error::AlreadyOpen);
            }
            let mem_size = reader.mem_size();
            data.reader = Some(reader.clone());
            data.num_strata = self.shared.config.num_strata(mem_size);
            data.mem_size = mem_size;
            data.state = IndexState::Indexing;
            data.progress = 0.0;
            data.last_error = None;
            data.last_instant = Arc::new(Instant::new(data.num_strata));
            let _ = self.shared.progress_tx.send(ProgressUpdate {
                state: IndexState::Indexing,
                progress: 0.0,
            });
        }
        self.instant_cache.clear();
        self.transfer_cache.clear();

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_worker(self.shared.clone(), reader.clone(), stop_rx));
        *self.worker.lock().await = Some(Worker {
            handle,
            stop: stop_tx,
        });

        info!(
            mem_size = reader.mem_size(),
            len_bytes = reader.len_bytes(),
            "index opened"
        );
        Ok(())
    }

    /// Stop the worker at its next safe point, join it, and release the
    /// reader. The index returns to `Idle` and may be reopened.
    pub async fn close(&self) {
        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            let _ = worker.stop.send(true);
            let _ = worker.handle.await;
        }

        self.instant_cache.quiesce();
        self.transfer_cache.quiesce();
        self.instant_cache.clear();
        self.transfer_cache.clear();

        let mut data = self.shared.data.lock().await;
        data.reader = None;
        data.state = IndexState::Idle;
        data.progress = 0.0;
        data.last_instant = Arc::new(Instant::new(0));
        let _ = self.shared.progress_tx.send(ProgressUpdate {
            state: IndexState::Idle,
            progress: 0.0,
        });
        info!("index closed");
    }

    pub async fn state(&self) -> IndexState {
        self.shared.data.lock().await.state
    }

    /// Fraction of the log indexed so far, monotonically non-decreasing.
    pub async fn progress(&self) -> f64 {
        self.shared.data.lock().await.progress
    }

    /// The failure that moved the index to `Error`, if any.
    pub async fn last_error(&self) -> Option<String> {
        self.shared.data.lock().await.last_error.clone()
    }

    /// Subscribe to `(state, progress)` notifications.
    pub fn subscribe_progress(&self) -> watch::Receiver<ProgressUpdate> {
        self.shared.progress_tx.subscribe()
    }

    /// Block until indexing reaches `Complete`, or surface the failure that
    /// stopped it.
    pub async fn wait_for_completion(&self) -> Result<()> {
        let mut rx = self.subscribe_progress();
        loop {
            let update = *rx.borrow_and_update();
            match update.state {
                IndexState::Complete => return Ok(()),
                IndexState::Idle => return Err(Error::NotOpen),
                IndexState::Error => {
                    let msg = self
                        .shared
                        .data
                        .lock()
                        .await
                        .last_error
                        .clone()
                        .unwrap_or_else(|| "unknown failure".into());
                    return Err(Error::IndexingFailed(msg));
                }
                _ => {}
            }
            if rx.changed().await.is_err() {
                return Err(Error::IndexingFailed("progress channel closed".into()));
            }
        }
    }

    /// Total duration of the log indexed so far. Grows while indexing runs;
    /// exact once `Complete`.
    pub async fn duration(&self) -> i64 {
        self.shared.data.lock().await.last_instant.time
    }

    /// Number of transfers indexed so far.
    pub async fn num_transfers(&self) -> u64 {
        self.shared.data.lock().await.last_instant.transfer_id
    }

    /// Size of the traced address space.
    pub async fn mem_size(&self) -> u64 {
        self.shared.data.lock().await.mem_size
    }

    pub async fn num_strata(&self) -> usize {
        self.shared.data.lock().await.num_strata
    }

    pub async fn num_blocks(&self) -> usize {
        let mem_size = self.mem_size().await;
        self.shared.config.num_blocks(mem_size)
    }

    pub fn stratum_for_address(&self, address: u64) -> usize {
        (address >> self.shared.config.stratum_shift) as usize
    }

    pub fn stratum_first_address(&self, stratum: usize) -> u64 {
        (stratum as u64) << self.shared.config.stratum_shift
    }

    pub fn stratum_last_address(&self, stratum: usize) -> u64 {
        self.stratum_first_address(stratum) + self.shared.config.stratum_size() - 1
    }

    /// Snapshot of cumulative traffic at `time`.
    ///
    /// With `distance == 0` the result is exact, produced by checkpoint
    /// lookup plus bounded replay. With a positive `distance` any instant
    /// within that many ticks may be returned instead - a cached neighbor
    /// or a raw checkpoint - trading accuracy for latency.
    ///
    /// In the `Error` state this returns the zeroed sentinel instant.
    pub async fn get_instant(&self, time: i64, distance: u64) -> Result<Arc<Instant>> {
        let (state, num_strata) = {
            let data = self.shared.data.lock().await;
            (data.state, data.num_strata)
        };
        match state {
            IndexState::Idle => return Err(Error::NotOpen),
            IndexState::Error => return Ok(Arc::new(Instant::new(num_strata))),
            _ => {}
        }

        if distance > 0 {
            if let Some(hit) = self.instant_cache.lookup(time, distance) {
                return Ok(hit);
            }
            // The running tail of the index is often the closest thing we
            // have; serving it avoids touching the store at all.
            {
                let data = self.shared.data.lock().await;
                if data.last_instant.time.abs_diff(time) <= distance {
                    return Ok(data.last_instant.clone());
                }
            }
            // A checkpoint inside the tolerance can be served without
            // replaying anything.
            if let Some(cp) = self.shared.store.checkpoint_at_or_before_time(time).await? {
                if cp.time.abs_diff(time) <= distance {
                    let instant = Arc::new(Instant::unpack(&cp.blob, num_strata)?);
                    self.instant_cache.insert(instant.time, instant.clone());
                    return Ok(instant);
                }
            }
        }

        self.instant_cache.get(time, 0).await
    }

    /// Metadata for the transfer with dense id `id`.
    ///
    /// Out-of-range ids return the unavailable sentinel; successful and
    /// failed lookups are both cached, so repeated misses never rescan the
    /// log. Never fails for missing data - only for a corrupt index.
    pub async fn get_transfer_summary(&self, id: u64) -> Result<Arc<TransferSummary>> {
        let state = self.state().await;
        match state {
            IndexState::Idle => return Err(Error::NotOpen),
            IndexState::Error => return Ok(Arc::new(TransferSummary::unavailable(id))),
            _ => {}
        }

        if id >= self.num_transfers().await {
            let summary = Arc::new(TransferSummary::unavailable(id));
            // Only a finished index can promise the id will stay invalid.
            if state == IndexState::Complete {
                self.transfer_cache.insert(id, summary.clone());
            }
            return Ok(summary);
        }

        self.transfer_cache.get(id, 0).await
    }

    /// The transfer whose end time is closest to `time`, before or after.
    /// An exact midpoint resolves to the earlier transfer.
    pub async fn get_closest_transfer(&self, time: i64) -> Result<Arc<TransferSummary>> {
        let state = self.state().await;
        match state {
            IndexState::Idle => return Err(Error::NotOpen),
            IndexState::Error => return Ok(Arc::new(TransferSummary::unavailable(u64::MAX))),
            _ => {}
        }

        let count = self.num_transfers().await;
        if count == 0 {
            return Ok(Arc::new(TransferSummary::unavailable(u64::MAX)));
        }

        // The instant at `time` tells us which transfers end on either side
        // of it: ids below `transfer_id` end at or before, `transfer_id`
        // itself ends after.
        let instant = self.get_instant(time, 0).await?;
        let next_id = instant.transfer_id;

        let before = if next_id > 0 {
            Some(self.get_transfer_summary(next_id - 1).await?)
        } else {
            None
        };
        let after = if next_id < count {
            Some(self.get_transfer_summary(next_id).await?)
        } else {
            None
        };

        Ok(match (before, after) {
            (Some(b), Some(a)) => {
                if b.time.abs_diff(time) <= a.time.abs_diff(time) {
                    b
                } else {
                    a
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => Arc::new(TransferSummary::unavailable(u64::MAX)),
        })
    }

    /// Contents of the fixed-size block covering `address`, as of `time`.
    ///
    /// Returns a zero-filled block for memory never written (or in the
    /// `Error` state).
    pub async fn get_block(&self, time: i64, address: u64) -> Result<LogBlock> {
        let state = self.state().await;
        let block_size = self.shared.config.block_size();
        let base = (address >> self.shared.config.block_shift) << self.shared.config.block_shift;
        match state {
            IndexState::Idle => return Err(Error::NotOpen),
            IndexState::Error => return Ok(LogBlock::zeroed(base, time, block_size)),
            _ => {}
        }

        let instant = self.get_instant(time, 0).await?;
        let block_id = address >> self.shared.config.block_shift;
        match self
            .shared
            .store
            .block_at(block_id, instant.log_offset)
            .await?
        {
            Some(data) => Ok(LogBlock {
                address: base,
                time: instant.time,
                data: Bytes::from(data),
            }),
            None => Ok(LogBlock::zeroed(base, instant.time, block_size)),
        }
    }

    /// Speculatively warm the instant cache around `time`.
    pub fn prefetch_instant(&self, time: i64) {
        self.instant_cache.prefetch(time);
    }

    /// Signal that speculative background work is no longer wanted. Never
    /// affects correctness, only in-flight prefetching.
    pub fn quiesce(&self) {
        self.instant_cache.quiesce();
        self.transfer_cache.quiesce();
    }
}

enum Outcome {
    Completed,
    Stopped,
}

async fn run_worker(
    shared: Arc<IndexShared>,
    reader: Arc<dyn LogReader>,
    stop: watch::Receiver<bool>,
) {
    match index_log(&shared, reader.as_ref(), &stop).await {
        Ok(Outcome::Completed) => {
            info!("indexing complete");
        }
        Ok(Outcome::Stopped) => {
            debug!("indexing stopped before completion");
        }
        Err(e) => {
            error!(error = %e, "indexing failed");
            shared.fail(&e).await;
        }
    }
}

/// The single scan over the log. Runs once per `open`.
async fn index_log(
    shared: &Arc<IndexShared>,
    reader: &dyn LogReader,
    stop: &watch::Receiver<bool>,
) -> Result<Outcome> {
    let config = &shared.config;
    let mem_size = reader.mem_size();
    let num_strata = config.num_strata(mem_size);
    let total_bytes = reader.len_bytes();

    let fingerprint = format!(
        "v1:mem_size={}:len={}:timestep={}:stratum_shift={}:block_shift={}",
        mem_size, total_bytes, config.timestep_bytes, config.stratum_shift, config.block_shift
    );

    // A finished index over this exact log is reusable as-is.
    if shared.store.get_marker(MARKER_COMPLETE).await?.as_deref() == Some(fingerprint.as_str()) {
        if let Some(cp) = shared.store.last_checkpoint().await? {
            let instant = Arc::new(Instant::unpack(&cp.blob, num_strata)?);
            info!(
                checkpoints = shared.store.checkpoint_count().await?,
                "reusing finished index"
            );
            shared
                .publish(IndexState::Complete, 1.0, Some(instant))
                .await;
            return Ok(Outcome::Completed);
        }
    }

    shared.store.clear().await?;

    let mut instant = Instant::new(num_strata);
    let mut blocks = BlockTracker::new(config.block_shift);
    let mut since_checkpoint = 0u64;
    let mut cursor = 0u64;

    loop {
        if *stop.borrow() {
            return Ok(Outcome::Stopped);
        }

        let Some(mut t) = reader.read_at(cursor)? else {
            break;
        };
        t.id = instant.transfer_id;
        instant.apply_transfer(&t, config.stratum_shift, false)?;
        blocks.record_write(&t);

        let next = reader.next_offset(&t);
        since_checkpoint += next - cursor;
        cursor = next;
        instant.log_offset = cursor;

        if since_checkpoint >= config.timestep_bytes {
            store_instant(shared, &instant, &mut blocks).await?;
            since_checkpoint = 0;

            let progress = if total_bytes == 0 {
                1.0
            } else {
                cursor as f64 / total_bytes as f64
            };
            shared
                .publish(IndexState::Indexing, progress, Some(Arc::new(instant.clone())))
                .await;
        }
    }

    shared.publish(IndexState::Finishing, 1.0, None).await;
    store_instant(shared, &instant, &mut blocks).await?;
    shared.store.set_marker(MARKER_COMPLETE, &fingerprint).await?;
    shared
        .publish(IndexState::Complete, 1.0, Some(Arc::new(instant)))
        .await;
    Ok(Outcome::Completed)
}

async fn store_instant(
    shared: &Arc<IndexShared>,
    instant: &Instant,
    blocks: &mut BlockTracker,
) -> Result<()> {
    let row = CheckpointRow {
        log_offset: instant.log_offset,
        time: instant.time,
        transfer_id: instant.transfer_id,
        blob: instant.pack()?,
    };
    let dirty = blocks.take_dirty();
    shared.store.put_checkpoint(&row, &dirty).await
}
