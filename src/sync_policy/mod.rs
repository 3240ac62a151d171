//! # WAL Sync Policy Module
//!
//! Decides *when* the engine calls [`crate::wal::Wal::sync`], independent
//! of the WAL's own append/replay mechanics. Three policies are supported,
//! selected by [`crate::engine::EngineConfig::write_mode`]:
//!
//! - [`WriteMode::Sync`] — fsync after every single append. Maximizes
//!   durability, minimizes throughput.
//! - [`WriteMode::Batch`] — fsync once `batch_size` appends have
//!   accumulated, or once `batch_interval_ms` has elapsed since the last
//!   sync, whichever comes first.
//! - [`WriteMode::Adaptive`] — like `Batch`, but the effective batch size
//!   is retuned after each sync based on the throughput observed since the
//!   previous one: sustained high QPS widens the batch (fewer, larger
//!   syncs), low QPS narrows it back down.
//!
//! The adaptive retuning only takes effect starting with the window
//! *after* the one that produced the measurement — `sync()` both performs
//! the fsync and updates `adaptive_batch_size` from the throughput it just
//! observed, so the trigger that caused this particular sync was decided
//! under the previous batch size. This mirrors the reference
//! implementation's behavior exactly and is not an oversight.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::time::Instant;

use tracing::{debug, trace};

use crate::wal::{Wal, WalError};

/// Throughput band below which the adaptive policy resets to the
/// configured base `batch_size`.
const ADAPTIVE_LOW_QPS: f64 = 1_000.0;

/// Throughput band above which the adaptive policy widens the batch to
/// `4 × batch_size`.
const ADAPTIVE_HIGH_QPS: f64 = 10_000.0;

/// Multiplier applied to `batch_size` when sustained throughput is high.
const ADAPTIVE_WIDEN_FACTOR: u64 = 4;

/// Selects which sync policy family the engine uses for a given instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Sync after every append.
    Sync,
    /// Sync once `batch_size` appends accumulate or `batch_interval_ms`
    /// elapses, whichever comes first.
    Batch,
    /// Like `Batch`, but the batch size adapts to observed throughput.
    Adaptive,
}

/// Per-engine sync-policy state and decision logic.
///
/// Owned by [`crate::engine::Engine`] alongside its [`crate::wal::Wal`].
/// `SyncPolicy` never touches the WAL except by calling `sync()` on it —
/// it has no opinion on how appends happen, only on when a sync should
/// follow one.
#[derive(Debug)]
pub struct SyncPolicy {
    write_mode: WriteMode,
    batch_size: u64,
    batch_interval_ms: u64,

    pending_ops: u64,
    last_sync_time: Option<Instant>,
    adaptive_batch_size: u64,
    fsync_count: u64,
}

impl SyncPolicy {
    /// Construct a policy for `write_mode`, with `batch_size` used both as
    /// the fixed `Batch` threshold and as the starting point for
    /// `Adaptive`'s self-tuned threshold.
    pub fn new(write_mode: WriteMode, batch_size: u64, batch_interval_ms: u64) -> Self {
        Self {
            write_mode,
            batch_size,
            batch_interval_ms,
            pending_ops: 0,
            last_sync_time: None,
            adaptive_batch_size: batch_size,
            fsync_count: 0,
        }
    }

    /// Total number of times this policy has called `Wal::sync`.
    pub fn fsync_count(&self) -> u64 {
        self.fsync_count
    }

    /// Record that a WAL append just happened and, per the configured
    /// write mode, possibly sync the WAL in response.
    pub fn after_wal_append(&mut self, wal: &mut Wal) -> Result<(), WalError> {
        self.pending_ops += 1;

        match self.write_mode {
            WriteMode::Sync => self.sync_now(wal),
            WriteMode::Batch => self.maybe_sync_fixed_batch(wal),
            WriteMode::Adaptive => self.maybe_sync_adaptive_batch(wal),
        }
    }

    fn maybe_sync_fixed_batch(&mut self, wal: &mut Wal) -> Result<(), WalError> {
        if self.pending_ops >= self.batch_size || self.interval_elapsed() {
            self.sync_now(wal)
        } else {
            Ok(())
        }
    }

    fn maybe_sync_adaptive_batch(&mut self, wal: &mut Wal) -> Result<(), WalError> {
        if self.pending_ops >= self.adaptive_batch_size || self.interval_elapsed() {
            self.sync_now(wal)
        } else {
            Ok(())
        }
    }

    /// Before the first sync, `last_sync_time` is the "0 sentinel" from
    /// the design: elapsed time since it is treated as unboundedly large,
    /// so the very first append under `Batch`/`Adaptive` always forces an
    /// initial sync rather than waiting for a full batch to accumulate.
    fn interval_elapsed(&self) -> bool {
        match self.last_sync_time {
            None => true,
            Some(last) => last.elapsed().as_millis() as u64 > self.batch_interval_ms,
        }
    }

    /// Unconditionally sync the WAL now, recording the observed throughput
    /// since the previous sync and updating `adaptive_batch_size` from it.
    pub fn sync_now(&mut self, wal: &mut Wal) -> Result<(), WalError> {
        let now = Instant::now();
        let elapsed_secs = self
            .last_sync_time
            .map(|last| now.duration_since(last).as_secs_f64());
        let pending = self.pending_ops;

        wal.sync()?;
        self.fsync_count += 1;
        self.pending_ops = 0;
        self.last_sync_time = Some(now);

        trace!(fsync_count = self.fsync_count, pending, "synced WAL");

        if let Some(elapsed) = elapsed_secs {
            if elapsed > 0.0 && pending > 0 {
                let qps = pending as f64 / elapsed;
                self.update_adaptive_batch_size(qps);
            }
        }

        Ok(())
    }

    fn update_adaptive_batch_size(&mut self, qps: f64) {
        let previous = self.adaptive_batch_size;
        if qps >= ADAPTIVE_HIGH_QPS {
            self.adaptive_batch_size = self.batch_size * ADAPTIVE_WIDEN_FACTOR;
        } else if qps <= ADAPTIVE_LOW_QPS {
            self.adaptive_batch_size = self.batch_size;
        }

        if self.adaptive_batch_size != previous {
            debug!(
                qps,
                previous, next = self.adaptive_batch_size, "adaptive batch size retuned"
            );
        }
    }
}
