//! Outbound command shapes for the kiln controller.

use serde::{Deserialize, Serialize};

/// A command sent to the kiln controller.
///
/// Each command serializes to a single JSON object tagged by its `command`
/// field, e.g. `{"command":"start"}` or
/// `{"command":"profile","targetTemperature":1050,...}`. Optional fields are
/// included only when provided.
///
/// Commands are fire-and-forget at this layer: the controller answers with a
/// `{"status":"ok"|"error"}` acknowledgment line, but no component awaits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Command {
    /// Begin the configured firing profile.
    Start,

    /// Stop the current firing.
    Stop,

    /// Ask the controller to report its current status immediately.
    Status,

    /// Configure the firing profile.
    #[serde(rename_all = "camelCase")]
    Profile {
        /// Target temperature in degrees Celsius.
        target_temperature: f64,
        /// Minutes to reach the target temperature.
        ramp_time: f64,
        /// Minutes to hold the target temperature.
        soak_duration: f64,
        /// Minutes to cool down (determines the cooling rate).
        cool_time: f64,
    },

    /// Inject a simulated thermocouple reading (bench testing).
    #[serde(rename_all = "camelCase")]
    TestInput {
        /// Simulated temperature in degrees Celsius.
        temperature: f64,
        /// How long the simulated reading holds, in seconds.
        #[serde(skip_serializing_if = "Option::is_none")]
        duration: Option<f64>,
        /// Optional setpoint override for the simulation.
        #[serde(skip_serializing_if = "Option::is_none")]
        set_point: Option<f64>,
    },
}

impl Command {
    /// Creates a profile command.
    pub fn profile(
        target_temperature: f64,
        ramp_time: f64,
        soak_duration: f64,
        cool_time: f64,
    ) -> Self {
        Self::Profile {
            target_temperature,
            ramp_time,
            soak_duration,
            cool_time,
        }
    }

    /// Creates a test-input command; `duration` and `set_point` are
    /// omitted from the wire when `None`.
    pub fn test_input(temperature: f64, duration: Option<f64>, set_point: Option<f64>) -> Self {
        Self::TestInput {
            temperature,
            duration,
            set_point,
        }
    }

    /// Serializes the command as one line-feed terminated JSON line.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
