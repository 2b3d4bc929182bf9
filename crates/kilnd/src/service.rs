//! Request-layer facade over the bridge core.
//!
//! `KilnService` bundles the session repository, status broadcaster, and
//! hardware link into the transport-agnostic operation set an HTTP (or any
//! other) request layer consumes. The request layer itself is an external
//! collaborator; nothing here knows about routes or sockets.

use std::sync::Arc;

use kiln_core::{FiringSession, HistoryResult, SessionId, StatusSnapshot};

use crate::broadcaster::{StatusBroadcaster, StatusSubscription};
use crate::link::HardwareLink;
use crate::repository::SessionRepository;
use crate::store::StoreError;

/// The operations the bridge exposes to its request layer.
#[derive(Clone)]
pub struct KilnService {
    repository: Arc<SessionRepository>,
    broadcaster: Arc<StatusBroadcaster>,
    link: HardwareLink,
}

impl KilnService {
    /// Bundles the collaborators built at daemon startup.
    pub fn new(
        repository: Arc<SessionRepository>,
        broadcaster: Arc<StatusBroadcaster>,
        link: HardwareLink,
    ) -> Self {
        Self {
            repository,
            broadcaster,
            link,
        }
    }

    // --- History ---

    /// All recorded firing sessions, newest first.
    pub fn history(&self) -> Vec<FiringSession> {
        self.repository.list_sessions()
    }

    /// One session by id.
    ///
    /// # Errors
    ///
    /// - `HistoryError::SessionNotFound` if no session has this id
    pub fn session(&self, id: SessionId) -> HistoryResult<FiringSession> {
        self.repository.get_session(id)
    }

    /// Deletes all recorded history. Irreversible.
    pub async fn clear_history(&self) -> Result<(), StoreError> {
        self.repository.clear_history().await
    }

    // --- Live status ---

    /// Subscribes to live status snapshots; the current snapshot is
    /// delivered immediately.
    pub fn subscribe_status(&self) -> StatusSubscription {
        self.broadcaster.subscribe()
    }

    /// The latest known status snapshot.
    pub fn latest_status(&self) -> StatusSnapshot {
        self.broadcaster.latest()
    }

    // --- Commands (fire-and-forget) ---

    /// Start the configured firing profile.
    pub async fn send_start(&self) {
        self.link.start().await;
    }

    /// Stop the current firing.
    pub async fn send_stop(&self) {
        self.link.stop().await;
    }

    /// Update the firing profile.
    pub async fn send_profile(
        &self,
        target_temperature: f64,
        ramp_time: f64,
        soak_duration: f64,
        cool_time: f64,
    ) {
        self.link
            .set_profile(target_temperature, ramp_time, soak_duration, cool_time)
            .await;
    }

    /// Inject a simulated thermocouple reading.
    pub async fn send_test(
        &self,
        temperature: f64,
        duration: Option<f64>,
        set_point: Option<f64>,
    ) {
        self.link
            .set_test_input(temperature, duration, set_point)
            .await;
    }

    /// Ask the controller for an immediate status report.
    pub async fn send_status_request(&self) {
        self.link.request_status().await;
    }
}
