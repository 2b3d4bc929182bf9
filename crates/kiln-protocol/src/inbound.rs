//! Decoding and classification of inbound serial lines.
//!
//! The controller emits CRLF-terminated lines. Most are JSON status reports,
//! but during boot it prints plain diagnostic text before the protocol is
//! ready, so non-JSON lines are a recoverable condition: the caller logs the
//! raw line and moves on.

use kiln_core::SessionStatus;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// The `state` value that opens a new firing session.
pub const STARTING_STATE: &str = "STARTING";

/// Classification of a decoded inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Periodic status report carrying a `state` field.
    StatusReport,
    /// Acknowledgment of a previously sent command (`status: "ok"|"error"`).
    CommandAck,
    /// Anything else: free-form `{message}` lines or arbitrary data.
    FreeForm,
}

/// A decoded message from the kiln controller, fields kept verbatim.
///
/// The controller's message set is open-ended, so the payload stays a raw
/// JSON object; accessors pull out the fields the bridge cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InboundMessage(Map<String, Value>);

impl InboundMessage {
    /// Wraps an already decoded JSON object.
    pub fn from_object(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Borrows the message fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consumes the message, returning its fields.
    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    /// The `state` field, if present.
    pub fn state(&self) -> Option<&str> {
        self.0.get("state").and_then(Value::as_str)
    }

    /// The acknowledgment outcome, if this is a command ack.
    ///
    /// Only `status: "ok"` and `status: "error"` count; any other `status`
    /// value is treated as ordinary data.
    pub fn ack(&self) -> Option<&str> {
        match self.0.get("status").and_then(Value::as_str) {
            Some(s @ ("ok" | "error")) => Some(s),
            _ => None,
        }
    }

    /// The free-form `message` text, if present (used for logging).
    pub fn message_text(&self) -> Option<&str> {
        self.0.get("message").and_then(Value::as_str)
    }

    /// Classifies the message for routing.
    ///
    /// Acks win over status reports: a `{status:"ok"}` reply never drives
    /// the session lifecycle even if the controller includes extra fields.
    pub fn kind(&self) -> MessageKind {
        if self.ack().is_some() {
            MessageKind::CommandAck
        } else if self.state().is_some() {
            MessageKind::StatusReport
        } else {
            MessageKind::FreeForm
        }
    }

    /// Maps the `state` field to a terminal session status, if it is one.
    pub fn terminal_status(&self) -> Option<SessionStatus> {
        self.state().and_then(SessionStatus::from_terminal_state)
    }
}

/// A serial line that did not decode as a JSON object.
///
/// Logged and discarded by the hardware link, never propagated.
#[derive(Debug, Error)]
pub enum MalformedLine {
    /// Line is not valid JSON (typical for boot-time diagnostic text)
    #[error("not valid JSON: {0}")]
    Json(String),

    /// Line parsed as JSON but is not an object
    #[error("not a JSON object")]
    NotAnObject,
}

/// Decodes one framed line into a message.
///
/// Empty and whitespace-only lines yield `Ok(None)` (the controller pads
/// its output with blank lines). Non-JSON lines yield [`MalformedLine`].
pub fn decode_line(line: &str) -> Result<Option<InboundMessage>, MalformedLine> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(fields)) => Ok(Some(InboundMessage::from_object(fields))),
        Ok(_) => Err(MalformedLine::NotAnObject),
        Err(e) => Err(MalformedLine::Json(e.to_string())),
    }
}
