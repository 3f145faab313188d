//! Response parsing
//!
//! The device sends exactly one frame: the handshake acknowledgement.
//!
//! Frame format:
//! - 1 byte: acknowledge marker (75)
//! - 4 bytes: firmware version (little-endian)
//!
//! After the handshake the device raises no further frames, so everything
//! that arrives is drained without interpretation.

use byteorder::{ByteOrder, LittleEndian};

use super::commands::ACKNOWLEDGE;
use super::{DacResolution, ProtocolError};

/// Length of the handshake acknowledgement frame
pub const HANDSHAKE_RESPONSE_LEN: usize = 5;

/// Decoded handshake acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// Firmware version reported by the device
    pub firmware_version: u32,
    /// DAC resolution implied by the firmware
    pub dac: DacResolution,
}

impl HandshakeResponse {
    /// Decode a handshake frame from the start of `data`.
    ///
    /// Returns `Ok(None)` while fewer than five bytes are available.
    pub fn from_bytes(data: &[u8]) -> Result<Option<Self>, ProtocolError> {
        if data.len() < HANDSHAKE_RESPONSE_LEN {
            return Ok(None);
        }

        if data[0] != ACKNOWLEDGE {
            return Err(ProtocolError::UnexpectedResponse(data[0]));
        }

        let firmware_version = LittleEndian::read_u32(&data[1..HANDSHAKE_RESPONSE_LEN]);
        let dac = DacResolution::from_firmware(firmware_version)?;
        Ok(Some(Self {
            firmware_version,
            dac,
        }))
    }
}

/// Result of feeding the read buffer to the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parsed {
    /// Number of leading bytes consumed
    pub consumed: usize,
    /// Set on the call that completed the handshake
    pub handshake: Option<HandshakeResponse>,
}

/// Incremental framing of the inbound byte stream
#[derive(Debug, Default)]
pub struct ResponseParser {
    handshake: Option<HandshakeResponse>,
}

impl ResponseParser {
    /// A parser waiting for the handshake
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the handshake acknowledgement has been seen
    pub fn is_initialized(&self) -> bool {
        self.handshake.is_some()
    }

    /// The handshake, once received
    pub fn handshake(&self) -> Option<HandshakeResponse> {
        self.handshake
    }

    /// Parse the valid bytes of the read buffer.
    ///
    /// The handshake is reported exactly once. Errors are fatal for the
    /// connection.
    pub fn process(&mut self, buffer: &[u8]) -> Result<Parsed, ProtocolError> {
        if self.handshake.is_some() {
            return Ok(Parsed {
                consumed: buffer.len(),
                handshake: None,
            });
        }

        match HandshakeResponse::from_bytes(buffer)? {
            Some(response) => {
                self.handshake = Some(response);
                Ok(Parsed {
                    consumed: HANDSHAKE_RESPONSE_LEN,
                    handshake: Some(response),
                })
            }
            None => Ok(Parsed {
                consumed: 0,
                handshake: None,
            }),
        }
    }
}
