//! # minikv
//!
//! An embeddable, single-process, single-threaded key-value storage engine
//! built on a small **Log-Structured Merge (LSM)** design. Keys and values
//! are UTF-8 strings; durability and crash recovery are provided by a
//! plain-text write-ahead log, with no background threads anywhere in the
//! engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                    Engine                     │
//! │  ┌────────────┐        ┌─────────────────┐   │
//! │  │  MemTable   │ flush │  SST segments   │   │
//! │  │  + WAL      │──────►│  (on disk)      │   │
//! │  └─────────────┘       └────────┬────────┘   │
//! │                                 │ compact_all │
//! │                        ┌────────▼────────┐    │
//! │                        │ merged segment  │    │
//! │                        └─────────────────┘    │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | Public entry point — open, put, get, delete, compact |
//! | [`memtable`] | In-memory write buffer, one live entry per key |
//! | [`wal`] | Append-only, newline-delimited write-ahead log |
//! | [`sstable`] | Immutable, sorted, on-disk segments with lazy key bounds |
//! | [`sync_policy`] | SYNC / BATCH / ADAPTIVE WAL-sync decision logic |
//! | [`compaction`] | The engine's single full-compaction routine |
//!
//! ## Key properties
//!
//! - **Write-ahead logging** — every mutation is appended to the WAL
//!   before the in-memory state is updated. `WriteMode` controls exactly
//!   when those appends are `fsync`ed.
//! - **Single version per key** — no MVCC, no sequence numbers; the latest
//!   write for a key always wins.
//! - **Tombstone deletes** — a delete overwrites a key with a reserved
//!   sentinel value rather than physically removing it, so the deletion
//!   survives a flush and can shadow older segments. Compaction is the
//!   only place tombstones are physically dropped.
//! - **Full compaction only** — there is no size-tiered or leveled
//!   compaction; `compact_all` always merges every segment into one.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use minikv::engine::{Engine, EngineConfig};
//!
//! let config = EngineConfig {
//!     data_dir: "/tmp/my_db".into(),
//!     ..EngineConfig::default()
//! };
//!
//! let mut engine = Engine::new(config);
//! engine.open().unwrap();
//!
//! engine.put("hello", "world").unwrap();
//! assert_eq!(engine.get("hello").unwrap().as_deref(), Some("world"));
//!
//! engine.delete("hello").unwrap();
//! assert_eq!(engine.get("hello").unwrap(), None);
//!
//! engine.compact_all().unwrap();
//! engine.close().unwrap();
//! ```

#![allow(dead_code)]

pub mod compaction;
pub mod engine;
pub mod memtable;
pub mod sstable;
pub mod sync_policy;
pub mod wal;
