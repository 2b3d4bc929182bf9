//! Kiln bridge daemon library.
//!
//! Bridges a hardware kiln controller (newline-delimited JSON over a serial
//! line) to observers, while durably recording every firing as a session
//! history.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────────┐     ┌───────────────────┐
//! │ HardwareLink │────▶│ SessionCoordinator │────▶│ SessionRepository │
//! │ (serial I/O) │     │  (lifecycle FSM)   │     │  (durable store)  │
//! └──────────────┘     └─────────┬──────────┘     └───────────────────┘
//!        ▲                       │
//!        │ commands              ▼
//! ┌──────┴───────┐     ┌────────────────────┐
//! │ KilnService  │     │ StatusBroadcaster  │
//! │ (request API)│◀────│  (live fan-out)    │
//! └──────────────┘     └────────────────────┘
//! ```
//!
//! A request layer (HTTP or otherwise) embeds this crate and talks to the
//! bridge exclusively through [`service::KilnService`].
//!
//! All production code follows the panic-free policy: no `.unwrap()`,
//! `.expect()`, `panic!()`, `unreachable!()`, `todo!()`.

pub mod broadcaster;
pub mod config;
pub mod coordinator;
pub mod lifecycle;
pub mod link;
pub mod repository;
pub mod service;
pub mod store;

pub use broadcaster::{StatusBroadcaster, StatusSubscription, SubscriberId};
pub use coordinator::SessionCoordinator;
pub use lifecycle::{FiringLifecycle, LifecycleAction, SessionPhase};
pub use link::{HardwareLink, LinkError};
pub use repository::SessionRepository;
pub use service::KilnService;
pub use store::{DocumentStore, StoreError};
