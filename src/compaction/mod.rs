//! # Compaction Module
//!
//! Implements the engine's single compaction routine: a full,
//! stop-the-world merge of every on-disk SST segment into one, dropping
//! tombstones that no longer need to shadow anything once everything has
//! been merged together.
//!
//! ## Full Compaction (`compact_all`)
//!
//! 1. Flush the active memtable so no pending writes are left unaccounted
//!    for.
//! 2. If no segments exist after the flush, there is nothing to merge —
//!    return without touching the WAL, matching the reference
//!    implementation's early return.
//! 3. Walk segments newest → oldest, classifying each key the first time
//!    it is seen (a tombstone is recorded as deleted, anything else as a
//!    live value) and ignoring every later, older occurrence of a key
//!    already classified.
//! 4. Delete every existing segment file and clear the in-memory list.
//! 5. If any live keys survived, write them out as a single new segment
//!    at index 0.
//! 6. Checkpoint the WAL — its entire content is now redundant with the
//!    on-disk segments.
//!
//! This is the only compaction strategy the engine exposes; there is no
//! background thread, no size-tiered bucketing, and no partial merge —
//! everything is merged every time `compact_all` is called.
//!
//! A segment that vanishes between being listed and being read during the
//! merge, or whose keys are not in sorted order, is reported as
//! [`CompactionError::Corruption`] rather than silently treated as
//! contributing nothing — either condition means the merge can no longer
//! trust what it read.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    io::{self, BufRead, BufReader},
    path::Path,
};

use thiserror::Error;
use tracing::info;

use crate::memtable::{Memtable, TOMBSTONE};
use crate::sstable::{SstError, SstSegment};
use crate::wal::{Wal, WalError};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`compact_all`].
#[derive(Debug, Error)]
pub enum CompactionError {
    /// Underlying I/O error (reading, deleting, or writing segment files).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error from the SST segment layer.
    #[error("SST error: {0}")]
    Sst(#[from] SstError),

    /// Error from the WAL layer while checkpointing.
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),

    /// A segment tracked in the in-memory list vanished between being
    /// listed and being read during the merge, or a line within it violated
    /// sort order. Either way the merge cannot trust what it read.
    #[error("corruption during compaction: {0}")]
    Corruption(String),
}

/// Run a full compaction over `sstables`, using `memtable` and `wal` as the
/// engine's current write-side state.
///
/// `next_sst_path` is a callback that allocates the path for a freshly
/// written segment, mirroring how [`crate::engine::Engine`] names segments
/// during a flush — compaction asks the engine for a path rather than
/// hard-coding its own naming scheme, since both must agree with what
/// `Engine::open` expects to find on disk. It may be called twice (once
/// for the pre-merge flush, once for the merged segment), so it takes
/// `FnMut` rather than `FnOnce`.
pub fn compact_all(
    memtable: &mut Memtable,
    sstables: &mut Vec<SstSegment>,
    wal: &mut Wal,
    mut next_sst_path: impl FnMut() -> std::path::PathBuf,
) -> Result<(), CompactionError> {
    // 1. Flush any pending writes so every live key is represented by an
    //    on-disk segment before merging.
    if !memtable.is_empty() {
        let snapshot = memtable.take_snapshot();
        let path = next_sst_path();
        let sst = SstSegment::write_from_memtable(&path, &snapshot)?;
        sstables.push(sst);
    }

    if sstables.is_empty() {
        return Ok(());
    }

    // 2. Merge newest -> oldest, keeping only the first (i.e. newest)
    //    occurrence of each key.
    let mut merged: BTreeMap<String, String> = BTreeMap::new();
    let mut deleted: BTreeSet<String> = BTreeSet::new();

    for sst in sstables.iter().rev() {
        for (key, value) in read_segment_lines(sst.path())? {
            if merged.contains_key(&key) || deleted.contains(&key) {
                continue;
            }
            if value == TOMBSTONE {
                deleted.insert(key);
            } else {
                merged.insert(key, value);
            }
        }
    }

    // 3. Remove every existing segment; the merged view supersedes them
    //    all.
    for sst in sstables.iter() {
        match fs::remove_file(sst.path()) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    sstables.clear();

    // 4. Emit a single merged segment, if anything survived.
    if !merged.is_empty() {
        let path = next_sst_path();
        let new_sst = SstSegment::write_from_memtable(&path, &merged)?;
        sstables.push(new_sst);
    }

    // 5. The WAL's contents are now fully represented on disk; checkpoint
    //    it so replay on the next open starts from an empty log.
    wal.truncate_and_reopen()?;

    info!(
        surviving_keys = merged.len(),
        dropped_tombstones = deleted.len(),
        "compaction complete"
    );

    Ok(())
}

/// Read every well-formed `key<TAB>value` line out of a segment file.
/// Malformed lines are skipped, matching the read-side tolerance of
/// [`crate::sstable::SstSegment::search`].
///
/// A segment that was present in the in-memory list but has since vanished
/// from disk, or whose keys are not non-decreasing, is `Corruption` rather
/// than an empty contribution to the merge — compaction cannot silently
/// treat a missing or out-of-order segment as "nothing to merge" without
/// risking I5 (surviving keys no longer matching pre-compaction reads).
fn read_segment_lines(path: &Path) -> Result<Vec<(String, String)>, CompactionError> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(CompactionError::Corruption(format!(
                "segment {} disappeared during compaction",
                path.display()
            )));
        }
        Err(e) => return Err(e.into()),
    };

    let mut out = Vec::new();
    let mut last_key: Option<String> = None;
    for line in BufReader::new(file).lines() {
        let line = line?;
        let Some((k, v)) = line.split_once('\t') else {
            continue;
        };
        if let Some(prev) = &last_key {
            if k < prev.as_str() {
                return Err(CompactionError::Corruption(format!(
                    "segment {}: key {k:?} is out of order after {prev:?}",
                    path.display()
                )));
            }
        }
        last_key = Some(k.to_string());
        out.push((k.to_string(), v.to_string()));
    }
    Ok(out)
}
