//! Sorted String Table (SSTable) Segment Module
//!
//! An SST segment is an immutable, on-disk file whose lines are
//! lexicographically sorted `key<TAB>value<LF>` pairs, one entry per key.
//! Segments are produced by flushing a memtable or by compaction and are
//! never modified in place afterward.
//!
//! Each segment lazily discovers its own `min_key`/`max_key` bounds on
//! first lookup — a segment that has just been enumerated by name at
//! `Engine::open` carries no metadata until something actually queries it,
//! avoiding a full scan of every on-disk segment up front.
//!
//! # On-disk layout
//!
//! ```text
//! {key_0}\t{value_0}\n
//! {key_1}\t{value_1}\n
//! ...
//! ```
//!
//! Lines are sorted ascending by key and each key appears at most once.
//! Malformed lines (fewer than two tab-separated fields) are skipped both
//! while scanning for bounds and while searching — this is the same
//! "drop what doesn't parse" recovery policy the WAL uses for a
//! partially-written trailing line. A well-formed line that is merely out
//! of order is a different failure: it is not silently dropped, it fails
//! the scan with [`SstError::Corruption`].

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::{
    cell::RefCell,
    collections::BTreeMap,
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{trace, warn};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by SST segment operations.
#[derive(Debug, Error)]
pub enum SstError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A line parsed cleanly but violated the segment's sort-order
    /// invariant (each key must appear once, in ascending order). Unlike a
    /// malformed line, this is not silently skipped — the segment cannot be
    /// trusted to answer `search` correctly once its ordering is broken.
    #[error("corruption in {path}: {detail}")]
    Corruption { path: PathBuf, detail: String },
}

// ------------------------------------------------------------------------------------------------
// SST Segment
// ------------------------------------------------------------------------------------------------

/// A handle to one immutable, on-disk sorted segment.
///
/// `min_key`/`max_key` start unset and are populated by the first call to
/// [`SstSegment::search`], which needs them anyway; a fresh segment built
/// by [`SstSegment::write_from_memtable`] has them set immediately since
/// the bounds are known for free while writing.
#[derive(Debug)]
pub struct SstSegment {
    path: PathBuf,
    bounds: RefCell<Option<(String, String)>>,
}

impl SstSegment {
    /// Wrap an existing (or not-yet-scanned) segment file. Bounds are
    /// unset and will be discovered lazily on first `search`.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            bounds: RefCell::new(None),
        }
    }

    /// Path of the segment file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Currently-known `(min_key, max_key)` bounds, if already loaded.
    pub fn bounds(&self) -> Option<(String, String)> {
        self.bounds.borrow().clone()
    }

    /// Write `snapshot` out as a new, immutable segment at `path`, sorted
    /// ascending by key (the caller hands in a `BTreeMap`, which already
    /// iterates in that order). The snapshot must be non-empty — writing
    /// an empty segment is the caller's responsibility to avoid.
    pub fn write_from_memtable(
        path: impl Into<PathBuf>,
        snapshot: &BTreeMap<String, String>,
    ) -> Result<Self, SstError> {
        let path = path.into();
        debug_assert!(!snapshot.is_empty(), "must not write an empty SST segment");

        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);

        let mut first_key = None;
        let mut last_key = None;
        for (key, value) in snapshot {
            write!(writer, "{key}\t{value}\n")?;
            if first_key.is_none() {
                first_key = Some(key.clone());
            }
            last_key = Some(key.clone());
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;

        trace!(path = %path.display(), entries = snapshot.len(), "wrote SST segment");

        let bounds = match (first_key, last_key) {
            (Some(min), Some(max)) => Some((min, max)),
            _ => None,
        };

        Ok(Self {
            path,
            bounds: RefCell::new(bounds),
        })
    }

    /// Point lookup. Returns the raw stored value (which may be the
    /// tombstone sentinel) or `None` if the key is absent from this
    /// segment.
    ///
    /// A missing file returns `None` rather than erroring — a segment
    /// enumerated by name that has since been removed by compaction is
    /// simply treated as contributing nothing.
    pub fn search(&self, key: &str) -> Result<Option<String>, SstError> {
        if !self.path.exists() {
            return Ok(None);
        }

        self.ensure_bounds_loaded()?;

        if let Some((min_key, max_key)) = self.bounds.borrow().as_ref() {
            if key < min_key.as_str() || key > max_key.as_str() {
                return Ok(None);
            }
        }

        let file = File::open(&self.path)?;
        for line in BufReader::new(file).lines() {
            let line = line?;
            let Some((k, v)) = split_line(&line) else {
                if !line.is_empty() {
                    warn!(path = %self.path.display(), %line, "skipping malformed SST line");
                }
                continue;
            };
            if k == key {
                return Ok(Some(v.to_string()));
            }
        }

        Ok(None)
    }

    /// Scan the file once to populate `min_key`/`max_key` if not already
    /// known. A no-op once bounds are loaded.
    ///
    /// The same pass verifies keys are non-decreasing (I2): a segment whose
    /// lines are out of order cannot be trusted by the bounds-pruning check
    /// in `search`, so an out-of-order key is reported as `Corruption`
    /// rather than silently tolerated.
    fn ensure_bounds_loaded(&self) -> Result<(), SstError> {
        if self.bounds.borrow().is_some() {
            return Ok(());
        }

        let file = File::open(&self.path)?;
        let mut first_key: Option<String> = None;
        let mut last_key: Option<String> = None;

        for line in BufReader::new(file).lines() {
            let line = line?;
            let Some((k, _)) = split_line(&line) else {
                continue;
            };
            if let Some(prev) = &last_key {
                if k < prev.as_str() {
                    return Err(SstError::Corruption {
                        path: self.path.clone(),
                        detail: format!("key {k:?} is out of order after {prev:?}"),
                    });
                }
            }
            if first_key.is_none() {
                first_key = Some(k.to_string());
            }
            last_key = Some(k.to_string());
        }

        if let (Some(min), Some(max)) = (first_key, last_key) {
            *self.bounds.borrow_mut() = Some((min, max));
        }

        Ok(())
    }
}

/// Split a segment line into `(key, value)` on the first tab. Lines with
/// fewer than two tab-separated fields are malformed and rejected.
fn split_line(line: &str) -> Option<(&str, &str)> {
    line.split_once('\t')
}
