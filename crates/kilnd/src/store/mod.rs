//! Write-serializing document store.
//!
//! The store persists one logical JSON document (the firing history) with
//! two guarantees:
//!
//! - A concurrent reader never observes a partially written file: content is
//!   written to a temporary path and published with an atomic rename.
//! - Disk I/O concurrency is bounded to one write per document: a single
//!   writer actor owns the file, and writes arriving while one is in flight
//!   coalesce last-write-wins into a single pending slot.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  WriteRequest   ┌──────────────────┐
//! │  DocumentStore   │ ───(mpsc)─────▶ │   AtomicWriter   │
//! │ (encode/decode)  │                 │  (single task)   │
//! └──────────────────┘ ◀──(oneshot)─── └──────────────────┘
//!                        shared outcome        │
//!                                              ▼
//!                                     tmp file + rename
//! ```

mod document;
mod writer;

pub use document::DocumentStore;
pub use writer::{spawn_writer, PendingWrite, WriterHandle, RENAME_ATTEMPTS};

use thiserror::Error;

/// Errors that can occur in store operations.
///
/// `Clone` because a single write outcome fans out to every caller that was
/// coalesced into that write.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Underlying filesystem failure
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    /// Persisted document did not decode; the read fails rather than
    /// silently resetting data
    #[error("malformed document: {0}")]
    Decode(String),

    /// Document could not be encoded
    #[error("failed to encode document: {0}")]
    Encode(String),

    /// Atomic rename kept failing after the retry budget
    #[error("rename failed after {attempts} attempts: {message}")]
    RenameFailed { attempts: u32, message: String },

    /// The writer actor has shut down
    #[error("writer channel closed")]
    ChannelClosed,
}
