//! Hardware link - owns the serial connection to the kiln controller.
//!
//! Exactly one serial connection exists per daemon, with exactly one reader:
//! a spawned task frames CRLF-terminated lines (buffering partial lines
//! across I/O chunks), decodes each as JSON, and forwards decoded messages
//! to the single registered consumer over an mpsc channel. Non-JSON lines
//! are logged and discarded - the controller prints plain diagnostic text
//! while booting, before the protocol is ready.
//!
//! Command sending is fire-and-forget: serialization or write failures are
//! logged, never surfaced, and no acknowledgment is awaited at this layer.
//! Concurrent senders are serialized by a mutex on the write half.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, error, info, warn};

use kiln_protocol::{decode_line, Command, InboundMessage};

/// Pause after opening the port before the link reports ready.
///
/// The controller auto-restarts when a serial connection is established and
/// needs time to stabilize before it will accept commands.
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Decoded-message channel depth between reader task and consumer.
const MESSAGE_BUFFER: usize = 64;

/// Errors opening the hardware link.
///
/// Fatal at startup: the daemon exits rather than running without its kiln.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("failed to open serial port {port}: {message}")]
    Open { port: String, message: String },
}

type SharedWriter = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// The serial link to the kiln controller.
///
/// Cheap to clone; all clones share the one underlying connection.
#[derive(Clone)]
pub struct HardwareLink {
    writer: SharedWriter,
}

impl HardwareLink {
    /// Opens the serial port and waits out the settle delay.
    ///
    /// Returns the link plus the channel of decoded inbound messages. The
    /// reader task is attached before the settle delay so nothing the
    /// controller says while rebooting is lost.
    ///
    /// # Errors
    ///
    /// - `LinkError::Open` if the port cannot be opened
    pub async fn connect(
        port: &str,
        baud: u32,
    ) -> Result<(Self, mpsc::Receiver<InboundMessage>), LinkError> {
        let stream = tokio_serial::new(port, baud)
            .open_native_async()
            .map_err(|e| LinkError::Open {
                port: port.to_string(),
                message: e.to_string(),
            })?;

        info!(port, baud, "Serial port opened, waiting for controller to settle");
        let (link, messages) = Self::from_stream(stream);
        tokio::time::sleep(SETTLE_DELAY).await;
        info!(port, "Kiln link ready");

        Ok((link, messages))
    }

    /// Builds a link over any byte stream.
    ///
    /// This is the seam the serial port plugs into; tests drive it with
    /// `tokio::io::duplex`.
    pub fn from_stream<S>(stream: S) -> (Self, mpsc::Receiver<InboundMessage>)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (tx, rx) = mpsc::channel(MESSAGE_BUFFER);

        tokio::spawn(read_loop(read_half, tx));

        let link = Self {
            writer: Arc::new(Mutex::new(Box::new(write_half))),
        };
        (link, rx)
    }

    /// Serializes a command as one JSON line and writes it to the port.
    ///
    /// Failures are logged and the command is dropped - commands are
    /// fire-and-forget, the controller's ack line is the only feedback.
    pub async fn send_command(&self, command: &Command) {
        let line = match command.to_line() {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "Failed to encode command, dropped");
                return;
            }
        };

        debug!(command = line.trim_end(), "Sending command");

        let mut writer = self.writer.lock().await;
        let result = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = result {
            error!(error = %e, command = line.trim_end(), "Command write failed, dropped");
        }
    }

    // --- High-level commands understood by the controller firmware ---

    /// Begin the configured firing profile.
    pub async fn start(&self) {
        self.send_command(&Command::Start).await;
    }

    /// Stop the current firing.
    pub async fn stop(&self) {
        self.send_command(&Command::Stop).await;
    }

    /// Configure the firing profile (temperature in Celsius, times in minutes).
    pub async fn set_profile(
        &self,
        target_temperature: f64,
        ramp_time: f64,
        soak_duration: f64,
        cool_time: f64,
    ) {
        self.send_command(&Command::profile(
            target_temperature,
            ramp_time,
            soak_duration,
            cool_time,
        ))
        .await;
    }

    /// Ask for an immediate status report.
    pub async fn request_status(&self) {
        self.send_command(&Command::Status).await;
    }

    /// Inject a simulated thermocouple reading for bench testing.
    pub async fn set_test_input(
        &self,
        temperature: f64,
        duration: Option<f64>,
        set_point: Option<f64>,
    ) {
        self.send_command(&Command::test_input(temperature, duration, set_point))
            .await;
    }
}

/// The single reader of serial input.
///
/// Runs until the stream closes, the consumer goes away, or an
/// unrecoverable read error occurs.
async fn read_loop<R>(read_half: R, tx: mpsc::Sender<InboundMessage>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                info!("Serial stream closed");
                break;
            }
            Ok(_) => match decode_line(&line) {
                Ok(Some(msg)) => {
                    if tx.send(msg).await.is_err() {
                        debug!("Message consumer gone, reader stopping");
                        break;
                    }
                }
                Ok(None) => {} // blank line
                Err(_) => {
                    // Boot-time diagnostic text, not a protocol failure
                    info!(raw = line.trim(), "Raw serial data");
                }
            },
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!("Discarded non-UTF-8 serial data");
            }
            Err(e) => {
                error!(error = %e, "Serial read error");
                break;
            }
        }
    }
}
