//! Status broadcaster - live fan-out of the latest hardware status.
//!
//! Holds the process-wide current status snapshot and a set of subscriber
//! channels. Delivery is fire-and-forget per subscriber: a slow or
//! disconnected observer must never block publication to the others or back
//! up the hardware message path, so sends are non-blocking and a saturated
//! channel simply drops that update for that subscriber (the next publish
//! carries fresher data anyway).
//!
//! The broadcaster is constructed once at service start and passed to
//! collaborators by `Arc` - never a hidden global.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use kiln_core::StatusSnapshot;

/// Per-subscriber channel depth. Live viewers only care about the most
/// recent statuses, so this stays small.
const SUBSCRIBER_BUFFER: usize = 32;

/// Identifier for one subscriber registration.
///
/// Derived from the registration time in epoch milliseconds (bumped for
/// uniqueness) and used as the removal key on disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(i64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Subscriber {
    id: SubscriberId,
    sender: mpsc::Sender<StatusSnapshot>,
}

struct Inner {
    /// The current snapshot, overwritten atomically on each publish.
    snapshot: StatusSnapshot,

    /// Active subscribers, in registration order.
    subscribers: Vec<Subscriber>,

    /// Highest id handed out, for same-millisecond registrations.
    last_id: i64,
}

// ============================================================================
// Broadcaster
// ============================================================================

/// Fan-out point for live status updates.
pub struct StatusBroadcaster {
    inner: Mutex<Inner>,
}

impl StatusBroadcaster {
    /// Creates a broadcaster whose snapshot starts `UNKNOWN`.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                snapshot: StatusSnapshot::unknown(),
                subscribers: Vec::new(),
                last_id: 0,
            }),
        })
    }

    /// Registers a new subscriber.
    ///
    /// The current snapshot is delivered immediately so a late joiner sees
    /// the latest status without waiting for the next hardware message. The
    /// returned subscription unregisters itself when dropped.
    pub fn subscribe(self: &Arc<Self>) -> StatusSubscription {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_BUFFER);

        let id = {
            let mut inner = self.lock_inner();

            let now = Utc::now().timestamp_millis();
            let id = SubscriberId(now.max(inner.last_id + 1));
            inner.last_id = id.0;

            // Buffer is empty at this point, try_send cannot fail
            let _ = sender.try_send(inner.snapshot.clone());
            inner.subscribers.push(Subscriber { id, sender });

            debug!(subscriber_id = %id, total = inner.subscribers.len(), "Subscriber added");
            id
        };

        StatusSubscription {
            id,
            receiver,
            broadcaster: Arc::clone(self),
        }
    }

    /// Publishes a hardware message to every subscriber.
    ///
    /// Overwrites the snapshot (attaching a fresh receipt timestamp), then
    /// delivers it in registration order. A failing subscriber never
    /// prevents delivery to the rest; closed channels are pruned.
    pub fn publish(&self, fields: Map<String, Value>) {
        let snapshot = StatusSnapshot::new(fields, Utc::now());

        let mut inner = self.lock_inner();
        inner.snapshot = snapshot.clone();

        inner.subscribers.retain(|sub| {
            match sub.sender.try_send(snapshot.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    // Slow consumer: drop this update for it, keep it registered
                    warn!(subscriber_id = %sub.id, "Subscriber lagging, status update dropped");
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(subscriber_id = %sub.id, "Subscriber channel closed, pruning");
                    false
                }
            }
        });
    }

    /// Removes a subscriber. Idempotent.
    pub fn unsubscribe(&self, id: SubscriberId) {
        let mut inner = self.lock_inner();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|sub| sub.id != id);
        if inner.subscribers.len() < before {
            debug!(subscriber_id = %id, "Subscriber removed");
        }
    }

    /// Returns the current snapshot.
    pub fn latest(&self) -> StatusSnapshot {
        self.lock_inner().snapshot.clone()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.lock_inner().subscribers.len()
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// Subscription Handle
// ============================================================================

/// A live status subscription.
///
/// Receives every published snapshot, starting with the one current at
/// subscribe time. Dropping the subscription unregisters it.
pub struct StatusSubscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<StatusSnapshot>,
    broadcaster: Arc<StatusBroadcaster>,
}

impl StatusSubscription {
    /// This subscription's registration id.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Receives the next snapshot; `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<StatusSnapshot> {
        self.receiver.recv().await
    }

    /// Non-blocking receive, for callers polling on their own schedule.
    pub fn try_recv(&mut self) -> Option<StatusSnapshot> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for StatusSubscription {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(self.id);
    }
}
