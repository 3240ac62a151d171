//! # Engine Module
//!
//! Ties the WAL, MemTable, SST segments, sync policy, and compaction
//! routine together into the single public entry point: [`Engine`].
//!
//! The engine is synchronous and single-threaded. There is no background
//! flush or compaction thread; `put`/`delete` may trigger a flush inline
//! when the memtable crosses [`EngineConfig::memtable_limit`], and
//! compaction only ever runs when the caller calls [`Engine::compact_all`]
//! directly.
//!
//! ## Read path
//!
//! `get` checks the memtable first. If the key is absent there, SST
//! segments are searched newest → oldest. A segment search result of
//! "absent" means *keep looking* in older segments; only an explicit
//! tombstone stops the search early, since an older segment could still
//! hold a live value for a key a newer segment never mentions.
//!
//! ## Persisted layout
//!
//! - `<data_dir>/wal.log` — the write-ahead log.
//! - `<data_dir>/sst_NNNN.txt` — immutable segments, zero-padded 4-digit
//!   index, monotone with respect to creation order.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::compaction::{self, CompactionError};
use crate::memtable::{Memtable, TOMBSTONE};
use crate::sstable::{SstError, SstSegment};
use crate::sync_policy::{SyncPolicy, WriteMode};
use crate::wal::{Wal, WalError};

const SST_PREFIX: &str = "sst_";
const SST_SUFFIX: &str = ".txt";

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`Engine`] operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A data operation was attempted before `open()` or after `close()`.
    #[error("engine is not open")]
    NotOpen,

    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WAL subsystem error.
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),

    /// SST subsystem error.
    #[error("SST error: {0}")]
    Sst(#[from] SstError),

    /// Compaction subsystem error.
    #[error("compaction error: {0}")]
    Compaction(#[from] CompactionError),

    /// An on-disk segment violated an invariant the engine relies on: a
    /// sort-order violation surfaced by [`crate::sstable::SstSegment`], or a
    /// tracked segment that disappeared mid-compaction. Surfaced directly
    /// here (rather than nested inside [`EngineError::Sst`] /
    /// [`EngineError::Compaction`]) since both collaborators can produce it
    /// and callers should not need to match on the originating subsystem to
    /// detect a corrupt session. Not raised for merely malformed lines,
    /// which are skipped rather than treated as corruption.
    #[error("corruption detected: {0}")]
    Corruption(String),
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Configuration for an [`Engine`] instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding `wal.log` and `sst_NNNN.txt` files. Created on
    /// demand.
    pub data_dir: PathBuf,

    /// Which sync policy governs WAL durability (see [`crate::sync_policy`]).
    pub write_mode: WriteMode,

    /// Target records per sync in `Batch`/`Adaptive`; also the base value
    /// `Adaptive` tunes around.
    pub batch_size: u64,

    /// Maximum elapsed time, in milliseconds, before a forced sync in
    /// `Batch`/`Adaptive`.
    pub batch_interval_ms: u64,

    /// Entry-count threshold in the memtable that triggers an inline flush.
    pub memtable_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/"),
            write_mode: WriteMode::Sync,
            batch_size: 10,
            batch_interval_ms: 5,
            memtable_limit: 1000,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Engine
// ------------------------------------------------------------------------------------------------

/// The embedded key-value engine: a WAL-backed memtable flushed to
/// immutable SST segments, with a WAL-sync policy and a full-compaction
/// routine. Not `Sync`; a single engine instance is meant to own its data
/// directory exclusively (see the crate's concurrency notes).
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    memtable: Memtable,
    sstables: Vec<SstSegment>,
    wal: Wal,
    sync_policy: SyncPolicy,
    is_open: bool,
}

impl Engine {
    /// Construct an engine bound to `config`. No files are touched until
    /// [`Engine::open`] is called.
    pub fn new(config: EngineConfig) -> Self {
        let wal_path = config.data_dir.join("wal.log");
        let sync_policy = SyncPolicy::new(config.write_mode, config.batch_size, config.batch_interval_ms);
        Self {
            wal: Wal::new(wal_path),
            sync_policy,
            config,
            memtable: Memtable::new(),
            sstables: Vec::new(),
            is_open: false,
        }
    }

    /// Open the engine: enumerate existing SST segments, open the WAL, and
    /// replay it into a fresh memtable. Idempotent.
    pub fn open(&mut self) -> Result<(), EngineError> {
        if self.is_open {
            return Ok(());
        }

        self.is_open = true;
        self.memtable = Memtable::new();
        self.sstables = Self::load_sst_segments(&self.config.data_dir)?;

        self.wal.open()?;
        self.wal.replay_into(self.memtable.raw_entries_mut())?;

        info!(
            data_dir = %self.config.data_dir.display(),
            segments = self.sstables.len(),
            "opened engine"
        );
        Ok(())
    }

    /// Close the engine: flush any pending writes, sync and close the WAL.
    /// Idempotent.
    pub fn close(&mut self) -> Result<(), EngineError> {
        if !self.is_open {
            return Ok(());
        }

        self.flush_to_sst()?;
        self.sync_policy.sync_now(&mut self.wal)?;
        self.wal.close()?;
        self.is_open = false;

        info!(data_dir = %self.config.data_dir.display(), "closed engine");
        Ok(())
    }

    /// Insert or overwrite `key`'s value.
    pub fn put(&mut self, key: &str, value: &str) -> Result<(), EngineError> {
        self.ensure_open()?;

        self.wal.append_put(key, value)?;
        self.sync_policy.after_wal_append(&mut self.wal)?;

        self.memtable.put(key.to_string(), value.to_string());
        self.maybe_flush()?;
        Ok(())
    }

    /// Mark `key` deleted. A subsequent `get` for `key` returns `None`
    /// until overwritten by a later `put`.
    pub fn delete(&mut self, key: &str) -> Result<(), EngineError> {
        self.ensure_open()?;

        self.wal.append_delete(key)?;
        self.sync_policy.after_wal_append(&mut self.wal)?;

        self.memtable.delete(key.to_string());
        self.maybe_flush()?;
        Ok(())
    }

    /// Look up `key`. Checks the memtable first, then SST segments
    /// newest → oldest. A segment with no entry for `key` is skipped, not
    /// treated as a terminal answer — only a tombstone (in the memtable or
    /// a segment) stops the search and yields `None`.
    pub fn get(&mut self, key: &str) -> Result<Option<String>, EngineError> {
        self.ensure_open()?;

        if let Some(value) = self.memtable.get(key) {
            return Ok(if value == TOMBSTONE {
                None
            } else {
                Some(value.to_string())
            });
        }

        for sst in self.sstables.iter().rev() {
            match sst.search(key) {
                Ok(None) => continue,
                Ok(Some(value)) if value == TOMBSTONE => return Ok(None),
                Ok(Some(value)) => return Ok(Some(value)),
                Err(SstError::Corruption { path, detail }) => {
                    return Err(EngineError::Corruption(format!(
                        "{}: {detail}",
                        path.display()
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(None)
    }

    /// Run a full compaction: merge every SST into one, physically drop
    /// tombstones, and checkpoint the WAL. See [`crate::compaction::compact_all`].
    pub fn compact_all(&mut self) -> Result<(), EngineError> {
        self.ensure_open()?;

        let data_dir = self.config.data_dir.clone();
        let existing_count = self.sstables.len();
        let mut calls = 0u32;
        let result = compaction::compact_all(&mut self.memtable, &mut self.sstables, &mut self.wal, || {
            // The pre-merge flush (if any) allocates the next index in the
            // existing segment list; the merged segment written after all
            // old segments are deleted always lands at index 0.
            let index = if calls == 0 { existing_count } else { 0 };
            calls += 1;
            Self::next_sst_path(&data_dir, index)
        });

        match result {
            Ok(()) => Ok(()),
            Err(CompactionError::Corruption(detail)) => Err(EngineError::Corruption(detail)),
            Err(e) => Err(e.into()),
        }
    }

    /// Total number of WAL `fsync` calls made so far by the sync policy.
    pub fn fsync_count(&self) -> u64 {
        self.sync_policy.fsync_count()
    }

    /// Number of SST segments currently tracked (after the most recent
    /// flush or compaction).
    pub fn sstable_count(&self) -> usize {
        self.sstables.len()
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.is_open {
            Ok(())
        } else {
            Err(EngineError::NotOpen)
        }
    }

    fn maybe_flush(&mut self) -> Result<(), EngineError> {
        if self.memtable.len() >= self.config.memtable_limit {
            self.flush_to_sst()?;
        }
        Ok(())
    }

    /// Flush the memtable to a new SST segment, if non-empty.
    fn flush_to_sst(&mut self) -> Result<(), EngineError> {
        if self.memtable.is_empty() {
            return Ok(());
        }

        let path = Self::next_sst_path(&self.config.data_dir, self.sstables.len());
        let snapshot = self.memtable.take_snapshot();
        let sst = SstSegment::write_from_memtable(&path, &snapshot)?;

        debug!(path = %path.display(), entries = snapshot.len(), "flushed memtable to SST");
        self.sstables.push(sst);
        Ok(())
    }

    fn next_sst_path(data_dir: &Path, index: usize) -> PathBuf {
        data_dir.join(format!("{SST_PREFIX}{index:04}{SST_SUFFIX}"))
    }

    /// Enumerate existing `sst_<digits>.txt` files under `data_dir`, sorted
    /// ascending by name, as unscanned segment descriptors. A missing
    /// `data_dir` yields an empty list rather than an error.
    fn load_sst_segments(data_dir: &Path) -> Result<Vec<SstSegment>, EngineError> {
        if !data_dir.exists() {
            return Ok(Vec::new());
        }

        let mut names: Vec<String> = fs::read_dir(data_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with(SST_PREFIX) && name.ends_with(SST_SUFFIX))
            .collect();
        names.sort();

        Ok(names
            .into_iter()
            .map(|name| SstSegment::new(data_dir.join(name)))
            .collect())
    }
}
