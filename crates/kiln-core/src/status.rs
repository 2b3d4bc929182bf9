//! Live status snapshot exposed to observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The `state` value reported before any hardware message has arrived.
pub const UNKNOWN_STATE: &str = "UNKNOWN";

/// The most recently received hardware status, plus a receipt timestamp.
///
/// There is exactly one current snapshot per process, owned by the status
/// broadcaster and overwritten atomically on each hardware message. It has
/// no persistence: on restart the state begins `UNKNOWN` and is replaced by
/// the first received message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Decoded message fields, kept verbatim.
    #[serde(flatten)]
    pub data: Map<String, Value>,

    /// Receipt time in epoch milliseconds.
    pub timestamp: i64,
}

impl StatusSnapshot {
    /// The initial snapshot before any hardware message has been received.
    pub fn unknown() -> Self {
        let mut data = Map::new();
        data.insert(
            "state".to_string(),
            Value::String(UNKNOWN_STATE.to_string()),
        );
        Self { data, timestamp: 0 }
    }

    /// Builds a snapshot from decoded message fields and a receipt time.
    pub fn new(data: Map<String, Value>, received_at: DateTime<Utc>) -> Self {
        Self {
            data,
            timestamp: received_at.timestamp_millis(),
        }
    }

    /// The snapshot's `state` field, if present.
    pub fn state(&self) -> Option<&str> {
        self.data.get("state").and_then(Value::as_str)
    }
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self::unknown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_unknown_snapshot_shape() {
        let snapshot = StatusSnapshot::unknown();
        assert_eq!(snapshot.state(), Some(UNKNOWN_STATE));
        assert_eq!(snapshot.timestamp, 0);
    }

    #[test]
    fn test_snapshot_serializes_flattened() {
        let received = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single().unwrap();
        let mut data = Map::new();
        data.insert("state".to_string(), Value::String("RUNNING".into()));
        data.insert("input".to_string(), Value::from(100));

        let snapshot = StatusSnapshot::new(data, received);
        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json.get("state"), Some(&Value::String("RUNNING".into())));
        assert_eq!(json.get("input"), Some(&Value::from(100)));
        assert_eq!(
            json.get("timestamp"),
            Some(&Value::from(received.timestamp_millis()))
        );
    }
}
