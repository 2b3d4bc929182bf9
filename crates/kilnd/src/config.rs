//! Daemon configuration defaults.

use std::path::PathBuf;

/// Serial port the controller usually shows up on (Linux/Raspberry Pi).
pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyACM0";

/// Baud rate the controller firmware is built for.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default location of the firing history document.
///
/// `~/.local/share/kilnd/history.json` on Linux, with a `/tmp` fallback
/// when no data directory can be resolved.
pub fn default_history_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("kilnd")
        .join("history.json")
}
