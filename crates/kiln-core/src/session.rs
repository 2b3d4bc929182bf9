//! Firing session entities and the persisted history document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Unique identifier for a firing session.
///
/// Wraps the session's creation timestamp in milliseconds since the Unix
/// epoch. Because sessions are created one at a time by the coordinator,
/// ids are monotonically increasing and double as a creation ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SessionId(i64);

impl SessionId {
    /// Creates a SessionId from epoch milliseconds.
    pub fn new(millis: i64) -> Self {
        Self(millis)
    }

    /// Creates a SessionId from a timestamp.
    pub fn from_timestamp(ts: DateTime<Utc>) -> Self {
        Self(ts.timestamp_millis())
    }

    /// Returns the underlying epoch milliseconds.
    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// Returns the id immediately after this one.
    ///
    /// Used to keep ids strictly increasing when two sessions would
    /// otherwise be created within the same millisecond.
    #[must_use]
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SessionId {
    fn from(millis: i64) -> Self {
        Self(millis)
    }
}

// ============================================================================
// Session Status
// ============================================================================

/// Lifecycle status of a firing session.
///
/// A session starts `Running` and transitions at most once to one of the
/// terminal statuses. Serialized in the wire/document spelling
/// (`"RUNNING"`, `"EMERGENCY_STOP"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Firing in progress.
    Running,
    /// Firing ran to completion.
    Completed,
    /// Firing was stopped by an operator.
    Aborted,
    /// Firing was halted by the controller's safety logic.
    EmergencyStop,
}

impl SessionStatus {
    /// Returns true for statuses that end a session.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Maps a hardware `state` string to a terminal session status.
    ///
    /// Returns `None` for states that do not end a firing (STARTING,
    /// RUNNING, diagnostic states, ...).
    pub fn from_terminal_state(state: &str) -> Option<Self> {
        match state {
            "COMPLETED" => Some(Self::Completed),
            "ABORTED" => Some(Self::Aborted),
            "EMERGENCY_STOP" => Some(Self::EmergencyStop),
            _ => None,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Aborted => "ABORTED",
            Self::EmergencyStop => "EMERGENCY_STOP",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// Session Events
// ============================================================================

/// One recorded hardware status message within a session.
///
/// Carries the decoded message fields verbatim (flattened into the event
/// object) plus `elapsedTime`, the whole seconds since the session started.
/// Events are append-only and never mutated once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Original message fields, stored as received.
    #[serde(flatten)]
    pub data: Map<String, Value>,

    /// Seconds since session start, rounded to the nearest whole second.
    #[serde(rename = "elapsedTime")]
    pub elapsed_time: i64,
}

// ============================================================================
// Firing Session
// ============================================================================

/// One complete kiln firing cycle, from start trigger to terminal outcome.
///
/// # Invariants
///
/// - `end_time` is set if and only if `status != Running`.
/// - `status` transitions at most once, from `Running` to a terminal value.
///   [`FiringSession::finalize`] enforces this and is idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiringSession {
    /// Creation timestamp in epoch milliseconds, doubles as identity.
    pub id: SessionId,

    /// When the firing started.
    pub start_time: DateTime<Utc>,

    /// When the firing ended; `None` while still running.
    pub end_time: Option<DateTime<Utc>>,

    /// Current lifecycle status.
    pub status: SessionStatus,

    /// Recorded hardware events, in arrival order.
    pub events: Vec<SessionEvent>,
}

impl FiringSession {
    /// Creates a new running session starting at `started_at`.
    pub fn new(id: SessionId, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            start_time: started_at,
            end_time: None,
            status: SessionStatus::Running,
            events: Vec::new(),
        }
    }

    /// Returns true while the session has not reached a terminal status.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    /// Appends a hardware message as a recorded event.
    ///
    /// `elapsedTime` is computed from the session's start time, rounded to
    /// the nearest second.
    pub fn record_event(&mut self, data: Map<String, Value>, now: DateTime<Utc>) {
        let elapsed_ms = now
            .signed_duration_since(self.start_time)
            .num_milliseconds();
        let elapsed_time = ((elapsed_ms as f64) / 1000.0).round() as i64;

        self.events.push(SessionEvent { data, elapsed_time });
    }

    /// Transitions the session to a terminal status.
    ///
    /// Returns `true` if the transition applied. Calling this on an already
    /// finalized session is a no-op returning `false`, as is passing a
    /// non-terminal status.
    pub fn finalize(&mut self, status: SessionStatus, now: DateTime<Utc>) -> bool {
        if !self.is_running() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.end_time = Some(now);
        true
    }
}

// ============================================================================
// History Document
// ============================================================================

/// The root persisted structure: all recorded firing sessions.
///
/// Sessions are ordered newest-first; [`HistoryDocument::insert_front`]
/// maintains the invariant. The in-memory document held by the session
/// repository is the single writable copy; the file on disk is its durable
/// mirror.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryDocument {
    /// All sessions, newest first.
    pub sessions: Vec<FiringSession>,
}

impl HistoryDocument {
    /// Inserts a new session at the front (newest-first invariant).
    pub fn insert_front(&mut self, session: FiringSession) {
        self.sessions.insert(0, session);
    }

    /// Finds a session by id.
    pub fn find(&self, id: SessionId) -> Option<&FiringSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    /// Finds a session by id, mutably.
    pub fn find_mut(&mut self, id: SessionId) -> Option<&mut FiringSession> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    /// Removes all sessions. Irreversible once persisted.
    pub fn clear(&mut self) {
        self.sessions.clear();
    }
}
