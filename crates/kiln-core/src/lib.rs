//! Kiln Core - Shared domain types for the kiln bridge
//!
//! This crate provides the domain model shared between the wire protocol
//! (kiln-protocol) and the bridge daemon (kilnd): firing sessions, their
//! recorded events, the persisted history document, and the live status
//! snapshot shown to observers.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod session;
pub mod status;

// Re-exports for convenience
pub use error::{HistoryError, HistoryResult};
pub use session::{FiringSession, HistoryDocument, SessionEvent, SessionId, SessionStatus};
pub use status::{StatusSnapshot, UNKNOWN_STATE};
