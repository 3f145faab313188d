//! Serial Protocol Communication
//!
//! Implements the Pulse Pal binary command protocol: a raw, unsynchronized
//! byte stream with a single handshake response frame.
//!
//! Every command starts with the [`OP_MENU`] byte followed by an opcode.
//! Multi-byte integers are little-endian.

/// Opcodes and parameter codes
pub mod commands;
/// Atomic command encoding
pub mod command_writer;
mod connection;
mod error;
/// Time and voltage quantization
pub mod quantize;
/// Handshake response decoding
pub mod response;
/// Serial port discovery and setup
pub mod serial;
/// Byte transport trait
pub mod transport;

pub use command_writer::CommandWriter;
pub use commands::{Opcode, ParameterCode, ParameterType, ParameterValue};
pub use connection::{Connection, ConnectionConfig, ConnectionState};
pub use error::ProtocolError;
pub use quantize::DacResolution;
pub use response::{HandshakeResponse, Parsed, ResponseParser};
pub use serial::{list_ports, open_port, PortInfo};
pub use transport::{SerialTransport, Transport};

/// Command prefix byte that selects the opcode menu
pub const OP_MENU: u8 = 213;

/// Separator between the two rows of display text
pub const LINE_BREAK: u8 = 254;

/// Fixed link baud rate
pub const BAUD_RATE: u32 = 12_000_000;

/// Outgoing buffer capacity, and the upper bound on a single command
pub const MAX_DATA_BYTES: usize = 8192;

/// Default timeout for a single blocking read in the reader loop, in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 100;

/// Default time allowed for the device to acknowledge the handshake, in milliseconds
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 5000;

/// Device cycle frequency in Hz
pub const CYCLE_FREQUENCY: u32 = 20_000;

/// Largest representable time value, in cycles
pub const MAX_CYCLES: u32 = 3600 * CYCLE_FREQUENCY;

/// Maximum number of pulses in a custom train
pub const MAX_PULSES: usize = 1000;

/// Shortest time period accepted by the device, in seconds
pub const MIN_TIME_PERIOD: f64 = 0.0001;

/// Longest time period accepted by the device, in seconds
pub const MAX_TIME_PERIOD: f64 = 3600.0;

/// Lowest output voltage
pub const MIN_VOLTAGE: f64 = -10.0;

/// Highest output voltage
pub const MAX_VOLTAGE: f64 = 10.0;
