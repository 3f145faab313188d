//! Connection management
//!
//! Handles the connection lifecycle with the device:
//!
//! ```text
//! Closed -> Connecting -> Open -> Closed
//!              |           |
//!              +-> Faulted <+
//! ```
//!
//! `open` sends the handshake, starts one dedicated reader thread and blocks
//! on a one-shot signal until the reader sees the acknowledgement (or fails).
//! The reader is the only writer of the `Open` and `Faulted` states. Commands
//! are written synchronously from the caller's thread.

use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::response::{HandshakeResponse, ResponseParser};
use super::{
    open_port, CommandWriter, DacResolution, Opcode, ProtocolError, Transport,
    DEFAULT_HANDSHAKE_TIMEOUT_MS, DEFAULT_READ_TIMEOUT_MS, MAX_DATA_BYTES,
};

/// Largest batch pulled from the transport in one read
const READ_CHUNK_SIZE: usize = 4096;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No link, or link released
    Closed,
    /// Handshake in progress
    Connecting,
    /// Handshake acknowledged; commands may be sent
    Open,
    /// A protocol or transport error ended the connection
    Faulted,
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Serial port name
    pub port_name: String,
    /// Upper bound on a single blocking read in the reader loop
    pub read_timeout_ms: u64,
    /// Time allowed for the handshake acknowledgement
    pub handshake_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
        }
    }
}

impl ConnectionConfig {
    /// Defaults for the named port
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Self::default()
        }
    }
}

/// State shared between the connection and its reader thread
#[derive(Debug)]
struct LinkStatus {
    state: Mutex<ConnectionState>,
    fault: Mutex<Option<String>>,
}

impl LinkStatus {
    fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Closed),
            fault: Mutex::new(None),
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn fault(&self) -> Option<String> {
        self.fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Enter the Faulted state, remembering the first cause
    fn set_fault(&self, err: &ProtocolError) {
        let mut fault = self.fault.lock().unwrap_or_else(PoisonError::into_inner);
        if fault.is_none() {
            *fault = Some(err.to_string());
        }
        self.set_state(ConnectionState::Faulted);
    }
}

/// Write handle slot; emptied by whichever side shuts the link down first
type TransportSlot = Arc<Mutex<Option<Box<dyn Transport>>>>;

type HandshakeSignal = oneshot::Sender<Result<HandshakeResponse, ProtocolError>>;

/// Pulse Pal connection over a dedicated serial link
pub struct Connection {
    config: ConnectionConfig,
    /// Write handle; the reader owns a clone and empties this slot on exit
    transport: TransportSlot,
    status: Arc<LinkStatus>,
    handshake: Option<HandshakeResponse>,
    /// Reused by every command; single writer
    command_buffer: Vec<u8>,
    cancel: CancellationToken,
    reader: Option<JoinHandle<Result<(), ProtocolError>>>,
}

impl Connection {
    /// Create a new connection (not yet open)
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            transport: Arc::new(Mutex::new(None)),
            status: Arc::new(LinkStatus::new()),
            handshake: None,
            command_buffer: Vec::with_capacity(MAX_DATA_BYTES),
            cancel: CancellationToken::new(),
            reader: None,
        }
    }

    /// Get the connection configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.status.state()
    }

    /// True once the handshake has been acknowledged, until close or fault
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Firmware version reported during the handshake
    pub fn firmware_version(&self) -> Option<u32> {
        self.handshake.map(|h| h.firmware_version)
    }

    /// DAC resolution implied by the firmware version
    pub fn dac_resolution(&self) -> Option<DacResolution> {
        self.handshake.map(|h| h.dac)
    }

    /// Description of the error that faulted the connection, if any
    pub fn fault(&self) -> Option<String> {
        self.status.fault()
    }

    /// Open the serial port named in the configuration and perform the handshake.
    ///
    /// Blocks until the device acknowledges, an error occurs, or `cancel` is
    /// triggered. Must not be called from within an async runtime.
    pub fn open(&mut self, cancel: CancellationToken) -> Result<(), ProtocolError> {
        self.check_can_open()?;
        let read_timeout = Duration::from_millis(self.config.read_timeout_ms);
        let transport = match open_port(&self.config.port_name, read_timeout) {
            Ok(transport) => transport,
            Err(e) => {
                self.status.set_fault(&e);
                return Err(e);
            }
        };
        self.open_with_transport(Box::new(transport), cancel)
    }

    /// Perform the handshake over an already opened transport.
    ///
    /// The transport's reads should time out periodically so the reader loop
    /// can observe cancellation.
    pub fn open_with_transport(
        &mut self,
        transport: Box<dyn Transport>,
        cancel: CancellationToken,
    ) -> Result<(), ProtocolError> {
        self.check_can_open()?;
        self.status.set_state(ConnectionState::Connecting);
        self.handshake = None;
        self.cancel = cancel.child_token();

        match self.start(transport) {
            Ok(handshake) => {
                info!(
                    "Connected to Pulse Pal on {:?}: firmware v{}, {:?} DAC",
                    self.config.port_name, handshake.firmware_version, handshake.dac
                );
                self.handshake = Some(handshake);
                Ok(())
            }
            Err(e) => {
                if matches!(e, ProtocolError::Cancelled) {
                    debug!("Open cancelled");
                    self.status.set_state(ConnectionState::Closed);
                } else {
                    warn!("Open failed: {}", e);
                    self.status.set_fault(&e);
                }
                self.release();
                Err(e)
            }
        }
    }

    fn check_can_open(&self) -> Result<(), ProtocolError> {
        match self.state() {
            ConnectionState::Closed => Ok(()),
            ConnectionState::Connecting | ConnectionState::Open => {
                Err(ProtocolError::AlreadyConnected)
            }
            ConnectionState::Faulted => Err(ProtocolError::Faulted(
                self.fault().unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }

    /// Discard stale input, send the handshake, start the reader and wait
    fn start(&mut self, mut transport: Box<dyn Transport>) -> Result<HandshakeResponse, ProtocolError> {
        transport.clear_input_buffer()?;
        let reader_port = transport.try_clone()?;
        *self.lock_transport() = Some(transport);

        self.send_command(|writer| {
            writer.write_header(Opcode::Handshake);
            Ok(())
        })?;
        debug!("Handshake sent");

        let (ready, completion) = oneshot::channel();
        let reader = Reader {
            port: reader_port,
            link: Arc::clone(&self.transport),
            status: Arc::clone(&self.status),
            cancel: self.cancel.clone(),
            ready: Some(ready),
            handshake_deadline: Instant::now()
                + Duration::from_millis(self.config.handshake_timeout_ms),
        };
        let handle = std::thread::Builder::new()
            .name("pulsepal-reader".to_string())
            .spawn(move || reader.run())?;
        self.reader = Some(handle);

        match completion.blocking_recv() {
            Ok(result) => result,
            // The reader dropped the signal without resolving it: cancelled
            Err(_) => Err(ProtocolError::Cancelled),
        }
    }

    /// Run one command transaction: build the command, then write it whole.
    ///
    /// If `build` fails, nothing is sent. A failed write faults the connection
    /// and releases the link.
    pub fn transaction<F>(&mut self, build: F) -> Result<usize, ProtocolError>
    where
        F: FnOnce(&mut CommandWriter<'_>) -> Result<(), ProtocolError>,
    {
        match self.state() {
            ConnectionState::Open => {}
            ConnectionState::Faulted => {
                return Err(ProtocolError::Faulted(
                    self.fault().unwrap_or_else(|| "unknown error".to_string()),
                ))
            }
            _ => return Err(ProtocolError::NotConnected),
        }

        let result = self.send_command(build);
        if let Err(e) = &result {
            if !e.is_validation() {
                error!("Command write failed, connection faulted: {}", e);
                self.status.set_fault(e);
                self.release();
            }
        }
        result
    }

    fn send_command<F>(&mut self, build: F) -> Result<usize, ProtocolError>
    where
        F: FnOnce(&mut CommandWriter<'_>) -> Result<(), ProtocolError>,
    {
        let dac = self.dac_resolution().unwrap_or(DacResolution::EightBit);
        let mut slot = self.transport.lock().unwrap_or_else(PoisonError::into_inner);
        let transport = slot.as_mut().ok_or(ProtocolError::NotConnected)?;
        let mut writer = CommandWriter::new(&mut self.command_buffer, transport, dac);
        build(&mut writer)?;
        writer.commit()
    }

    /// Send the disconnect notice (if open) and release the link.
    ///
    /// Closing an already closed connection does nothing. A faulted
    /// connection stays `Faulted` after its resources are released.
    pub fn close(&mut self) -> Result<(), ProtocolError> {
        if self.lock_transport().is_none() && self.reader.is_none() {
            return Ok(());
        }

        let mut result = Ok(());
        if self.is_open() {
            debug!("Sending disconnect");
            if let Err(e) = self.send_command(|writer| {
                writer.write_header(Opcode::Disconnect);
                Ok(())
            }) {
                warn!("Failed to send disconnect: {}", e);
                result = Err(e);
            }
        }

        self.release();
        if self.state() != ConnectionState::Faulted {
            self.status.set_state(ConnectionState::Closed);
        }
        info!("Connection to {:?} closed", self.config.port_name);
        result
    }

    /// Stop the reader and drop the transport
    fn release(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.reader.take() {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Reader ended with error: {}", e),
                Err(_) => error!("Reader thread panicked"),
            }
        }
        self.lock_transport().take();
    }

    fn lock_transport(&self) -> MutexGuard<'_, Option<Box<dyn Transport>>> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// The dedicated reader: pulls bytes into the read buffer and feeds the parser
struct Reader {
    port: Box<dyn Transport>,
    link: TransportSlot,
    status: Arc<LinkStatus>,
    cancel: CancellationToken,
    ready: Option<HandshakeSignal>,
    handshake_deadline: Instant,
}

impl Reader {
    fn run(mut self) -> Result<(), ProtocolError> {
        debug!("Reader started");
        let result = self.read_loop();

        // Both handles are closed before the final state is published
        drop(self.port);
        self.link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match result {
            Ok(()) => {
                // Cancellation is a cooperative shutdown, not a fault
                if self.status.state() != ConnectionState::Faulted {
                    self.status.set_state(ConnectionState::Closed);
                }
                debug!("Reader stopped");
                Ok(())
            }
            Err(e) => {
                error!("Reader faulted: {}", e);
                self.status.set_fault(&e);
                match self.ready.take() {
                    Some(ready) => {
                        let message = e.to_string();
                        let _ = ready.send(Err(e));
                        Err(ProtocolError::Faulted(message))
                    }
                    None => Err(e),
                }
            }
        }
    }

    fn read_loop(&mut self) -> Result<(), ProtocolError> {
        let mut parser = ResponseParser::new();
        let mut read_buffer: Vec<u8> = Vec::with_capacity(READ_CHUNK_SIZE);
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        while !self.cancel.is_cancelled() {
            let available = match self.port.bytes_to_read() {
                Ok(n) => n as usize,
                Err(_) if self.cancel.is_cancelled() => break,
                Err(e) => return Err(e.into()),
            };

            // Block on a single byte when idle, otherwise take everything ready
            let to_read = available.clamp(1, chunk.len());
            match self.port.read(&mut chunk[..to_read]) {
                Ok(0) => {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    return Err(ProtocolError::ConnectionClosed);
                }
                Ok(n) => {
                    read_buffer.extend_from_slice(&chunk[..n]);
                    let parsed = parser.process(&read_buffer)?;
                    read_buffer.drain(..parsed.consumed);

                    if let Some(handshake) = parsed.handshake {
                        self.status.set_state(ConnectionState::Open);
                        if let Some(ready) = self.ready.take() {
                            let _ = ready.send(Ok(handshake));
                        }
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) => {}
                Err(_) if self.cancel.is_cancelled() => break,
                Err(e) => return Err(e.into()),
            }

            if self.ready.is_some() && Instant::now() >= self.handshake_deadline {
                return Err(ProtocolError::Timeout);
            }
        }

        Ok(())
    }
}
