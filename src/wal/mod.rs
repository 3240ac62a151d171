//! Write-Ahead Logging (WAL) Module
//!
//! Implements a durable, append-only log of `put`/`delete` mutations for
//! crash recovery. Unlike a generic binary-framed WAL, this log's format is
//! deliberately minimal: one newline-delimited, tab-separated text record
//! per mutation, with no checksums and no length framing. The engine's
//! crash-recovery policy is correspondingly simple — a partially written
//! trailing line (no terminating `\n`) is dropped silently on replay rather
//! than treated as corruption.
//!
//! # On-disk layout
//!
//! ```text
//! PUT\t{key}\t{value}\n
//! DEL\t{key}\n
//! ...
//! ```
//!
//! # Guarantees
//!
//! - **Durability:** `sync()` flushes user-space buffers and forces an
//!   `fsync` of the underlying file; a failed sync propagates rather than
//!   being swallowed.
//! - **Recovery:** `replay_into` reconstructs a memtable snapshot from the
//!   full record sequence, skipping malformed lines.
//! - **Checkpointing:** `truncate_and_reopen` resets the log to empty after
//!   its contents have been durably materialized elsewhere (SSTs), without
//!   the caller needing to know how the WAL re-opens itself.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    io::{self, BufRead, BufReader, BufWriter, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{info, trace, warn};

use crate::memtable::TOMBSTONE;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An operation was attempted before `open()` or after `close()`.
    #[error("WAL is not open")]
    NotOpen,
}

// ------------------------------------------------------------------------------------------------
// WAL Core
// ------------------------------------------------------------------------------------------------

/// An append-only, newline-delimited durable log bound to a single path.
///
/// The WAL does not own a memtable; callers pass one in to `replay_into`.
/// It also does not decide *when* to sync — that policy lives in
/// [`crate::sync_policy`] — it only performs the sync when asked.
#[derive(Debug)]
pub struct Wal {
    path: PathBuf,
    file: Option<BufWriter<File>>,
}

impl Wal {
    /// Construct a WAL bound to `path`. The file is not touched until
    /// [`Wal::open`] is called.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    /// Path of the underlying log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open (or create) the WAL file, positioned at the end for appends.
    ///
    /// Idempotent: calling `open` on an already-open WAL is a no-op.
    pub fn open(&mut self) -> Result<(), WalError> {
        if self.file.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        file.seek(SeekFrom::End(0))?;

        info!(path = %self.path.display(), "opened WAL");
        self.file = Some(BufWriter::new(file));
        Ok(())
    }

    /// Append a `PUT` record. Does not sync; see [`crate::sync_policy`].
    pub fn append_put(&mut self, key: &str, value: &str) -> Result<(), WalError> {
        let writer = self.file.as_mut().ok_or(WalError::NotOpen)?;
        write!(writer, "PUT\t{key}\t{value}\n")?;
        trace!(key, "appended PUT record");
        Ok(())
    }

    /// Append a `DEL` record. Does not sync; see [`crate::sync_policy`].
    pub fn append_delete(&mut self, key: &str) -> Result<(), WalError> {
        let writer = self.file.as_mut().ok_or(WalError::NotOpen)?;
        write!(writer, "DEL\t{key}\n")?;
        trace!(key, "appended DEL record");
        Ok(())
    }

    /// Flush user-space buffers and force an `fsync` of the file to stable
    /// storage. A failed sync propagates to the caller.
    pub fn sync(&mut self) -> Result<(), WalError> {
        let writer = self.file.as_mut().ok_or(WalError::NotOpen)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Flush, sync, and release the file handle. Idempotent.
    pub fn close(&mut self) -> Result<(), WalError> {
        if let Some(mut writer) = self.file.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
            info!(path = %self.path.display(), "closed WAL");
        }
        Ok(())
    }

    /// Replay every well-formed record into `memtable`, in file order.
    ///
    /// A missing file is treated as "no prior state", not an error. A
    /// partial trailing line (no terminating `\n`) is the crash-at-write
    /// recovery case and is dropped silently, matching the read side of
    /// the record grammar in [`crate::wal`].
    pub fn replay_into(&self, memtable: &mut BTreeMap<String, String>) -> Result<(), WalError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut replayed = 0usize;
        let reader = BufReader::new(file);
        for line in read_complete_lines(reader) {
            let line = line?;
            if line.is_empty() {
                continue;
            }

            let mut parts = line.splitn(3, '\t');
            match parts.next() {
                Some("PUT") => {
                    if let (Some(key), Some(value)) = (parts.next(), parts.next()) {
                        memtable.insert(key.to_string(), value.to_string());
                        replayed += 1;
                    }
                }
                Some("DEL") => {
                    if let Some(key) = parts.next() {
                        memtable.insert(key.to_string(), TOMBSTONE.to_string());
                        replayed += 1;
                    }
                }
                _ => {
                    warn!(%line, "skipping malformed WAL line during replay");
                }
            }
        }

        info!(path = %self.path.display(), records = replayed, "replayed WAL");
        Ok(())
    }

    /// Checkpoint the WAL: close the handle, truncate the file to zero
    /// length (creating it if missing), then reopen it ready for appends.
    ///
    /// Called by [`crate::compaction::compact_all`] once the WAL's
    /// contents have been durably materialized into SSTs. The compaction
    /// routine calls this method without knowing how a `Wal` constructs or
    /// reopens its file handle.
    pub fn truncate_and_reopen(&mut self) -> Result<(), WalError> {
        self.close()?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        // Opening with `truncate(true)` resets the file to zero length,
        // creating it if it does not exist.
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;

        self.open()?;
        info!(path = %self.path.display(), "checkpointed WAL");
        Ok(())
    }
}

/// Iterate over complete (`\n`-terminated) lines of `reader`, stripping the
/// trailing newline. The final partial line, if any, is dropped silently —
/// this is the WAL's crash-at-write recovery policy.
fn read_complete_lines<R: BufRead>(mut reader: R) -> impl Iterator<Item = Result<String, WalError>> {
    std::iter::from_fn(move || {
        let mut buf = Vec::new();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => None,
            Ok(_) => {
                if buf.last() != Some(&b'\n') {
                    // Partial trailing line with no terminator: drop it.
                    return None;
                }
                buf.pop();
                Some(Ok(String::from_utf8_lossy(&buf).into_owned()))
            }
            Err(e) => Some(Err(WalError::Io(e))),
        }
    })
}
