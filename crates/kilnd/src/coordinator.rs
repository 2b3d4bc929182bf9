//! Session coordinator - drives history and fan-out from hardware messages.
//!
//! The coordinator is the single consumer of the hardware link's message
//! channel. For every decoded message it:
//!
//! 1. Routes command acknowledgments to the command-response observer
//!    (acks bypass history, lifecycle, and the broadcaster entirely).
//! 2. Publishes the message to the status broadcaster.
//! 3. Feeds the message's `state` into the firing lifecycle and applies the
//!    resulting actions against the session repository.
//!
//! Store failures are logged but never stop the message loop: the in-memory
//! document stays authoritative and the next successful write re-mirrors it.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use kiln_core::SessionId;
use kiln_protocol::{InboundMessage, MessageKind};

use crate::broadcaster::StatusBroadcaster;
use crate::lifecycle::{FiringLifecycle, LifecycleAction};
use crate::repository::SessionRepository;

/// Coordinates the firing lifecycle against repository and broadcaster.
pub struct SessionCoordinator {
    repository: Arc<SessionRepository>,
    broadcaster: Arc<StatusBroadcaster>,
    lifecycle: FiringLifecycle,

    /// Id of the open session while the lifecycle is active.
    current_session: Option<SessionId>,

    /// Distinguished observer for command acknowledgments, if registered.
    ack_observer: Option<mpsc::Sender<InboundMessage>>,
}

impl SessionCoordinator {
    /// Creates a coordinator with no open session.
    pub fn new(repository: Arc<SessionRepository>, broadcaster: Arc<StatusBroadcaster>) -> Self {
        Self {
            repository,
            broadcaster,
            lifecycle: FiringLifecycle::new(),
            current_session: None,
            ack_observer: None,
        }
    }

    /// Registers the command-response observer.
    ///
    /// Acknowledgment messages are delivered here; without an observer they
    /// are only logged.
    pub fn set_ack_observer(&mut self, observer: mpsc::Sender<InboundMessage>) {
        self.ack_observer = Some(observer);
    }

    /// Id of the currently open session, if any.
    pub fn current_session(&self) -> Option<SessionId> {
        self.current_session
    }

    /// Consumes hardware messages until cancellation or channel close.
    pub async fn run(
        mut self,
        mut messages: mpsc::Receiver<InboundMessage>,
        cancel_token: CancellationToken,
    ) {
        info!("Session coordinator starting");

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    info!("Session coordinator shutting down");
                    break;
                }

                msg = messages.recv() => {
                    match msg {
                        Some(msg) => self.handle_message(msg).await,
                        None => {
                            warn!("Hardware message channel closed");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Processes one decoded hardware message.
    pub async fn handle_message(&mut self, msg: InboundMessage) {
        if msg.kind() == MessageKind::CommandAck {
            self.deliver_ack(msg);
            return;
        }

        self.log_message(&msg);

        // Every non-ack message reaches live observers, state field or not
        self.broadcaster.publish(msg.fields().clone());

        for action in self.lifecycle.observe(msg.state()) {
            match action {
                LifecycleAction::StartSession => {
                    match self.repository.create_session().await {
                        Ok(session) => {
                            info!(session_id = %session.id, "Firing session started");
                            self.current_session = Some(session.id);
                        }
                        Err(e) => {
                            // Lifecycle stays active but nothing can be
                            // recorded until the next session opens
                            error!(error = %e, "Failed to create session");
                        }
                    }
                }

                LifecycleAction::RecordEvent => {
                    if let Some(id) = self.current_session {
                        if let Err(e) = self
                            .repository
                            .add_session_event(id, msg.fields().clone())
                            .await
                        {
                            error!(session_id = %id, error = %e, "Failed to record event");
                        }
                    }
                }

                LifecycleAction::FinishSession(status) => {
                    if let Some(id) = self.current_session.take() {
                        info!(session_id = %id, status = %status, "Firing session ended");
                        if let Err(e) = self.repository.end_session(id, status).await {
                            error!(session_id = %id, error = %e, "Failed to finalize session");
                        }
                    }
                }
            }
        }
    }

    /// Routes a command acknowledgment to the observer, or logs it.
    fn deliver_ack(&self, msg: InboundMessage) {
        let outcome = msg.ack().unwrap_or("unknown");

        match &self.ack_observer {
            Some(observer) => {
                if observer.try_send(msg.clone()).is_err() {
                    warn!(outcome, "Command-response observer unavailable, ack dropped");
                }
            }
            None => {
                info!(outcome, "Command acknowledged");
            }
        }
    }

    /// Logs incoming traffic the way an operator reads it.
    fn log_message(&self, msg: &InboundMessage) {
        if let Some(state) = msg.state() {
            let input = msg.fields().get("input").and_then(Value::as_f64);
            let setpoint = msg.fields().get("setpoint").and_then(Value::as_f64);
            info!(state, ?input, ?setpoint, "Kiln status");
        } else if let Some(text) = msg.message_text() {
            info!(message = text, "Kiln message");
        } else {
            debug!(fields = ?msg.fields(), "Kiln data");
        }
    }
}
