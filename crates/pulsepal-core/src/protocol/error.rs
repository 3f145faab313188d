//! Protocol errors

use thiserror::Error;

/// Errors that can occur while talking to a Pulse Pal
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The serial port could not be opened or configured
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// Transport read or write failure
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A command was issued while the connection is not open
    #[error("Not connected to Pulse Pal")]
    NotConnected,

    /// `open` was called on a connection that is connecting or open
    #[error("Already connected")]
    AlreadyConnected,

    /// The transport reached end of stream
    #[error("Connection closed by the device")]
    ConnectionClosed,

    /// The open was cancelled before the handshake completed
    #[error("Connection attempt was cancelled")]
    Cancelled,

    /// The connection failed earlier; carries the first cause
    #[error("Connection faulted: {0}")]
    Faulted(String),

    /// No handshake acknowledgement within the configured window
    #[error("Timed out waiting for handshake acknowledgement")]
    Timeout,

    /// The handshake reply did not start with the acknowledge byte
    #[error("Unexpected return value from Pulse Pal: {0:#04x}")]
    UnexpectedResponse(u8),

    /// Firmware version with no known DAC resolution
    #[error("Unknown Pulse Pal firmware version {0}")]
    UnsupportedFirmware(u32),

    /// Voltage outside [-10, 10] V
    #[error("Voltage {0} V is outside the range [-10, 10] V")]
    VoltageOutOfRange(f64),

    /// Time outside [0.0001, 3600] s, or not representable in cycles
    #[error("Time {0} s is outside the range allowed by the device")]
    TimeOutOfRange(f64),

    /// Pulse onsets closer than 0.0001 s, equal, or decreasing
    #[error("Pulse times must be monotonically increasing: {current} s follows {previous} s")]
    NonMonotonicTime { previous: f64, current: f64 },

    /// More than 1000 pulses in a custom train
    #[error("Exceeded the maximum allowed pulse length: {0} pulses")]
    TooManyPulses(usize),

    /// Time and voltage arrays differ in length
    #[error("Array of pulse voltages ({voltages}) must be of same length as array of pulse times ({times})")]
    LengthMismatch { times: usize, voltages: usize },

    /// A pulse train table without exactly two rows
    #[error("Pulse train table must have exactly two rows, got {0}")]
    InvalidTableShape(usize),

    /// Channel id outside the device range
    #[error("Invalid channel id {0}")]
    InvalidChannel(u8),

    /// Custom train slot other than 1 or 2
    #[error("Invalid pulse train id {0}")]
    InvalidTrainId(u8),

    /// Payload type does not match the parameter code
    #[error("Parameter {code:?} expects a {expected:?} value")]
    ParameterTypeMismatch {
        code: super::ParameterCode,
        expected: super::ParameterType,
    },
}

impl ProtocolError {
    /// Whether this error was raised by local validation, before any byte
    /// was sent to the device
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ProtocolError::VoltageOutOfRange(_)
                | ProtocolError::TimeOutOfRange(_)
                | ProtocolError::NonMonotonicTime { .. }
                | ProtocolError::TooManyPulses(_)
                | ProtocolError::LengthMismatch { .. }
                | ProtocolError::InvalidTableShape(_)
                | ProtocolError::InvalidChannel(_)
                | ProtocolError::InvalidTrainId(_)
                | ProtocolError::ParameterTypeMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        assert!(ProtocolError::VoltageOutOfRange(11.0).is_validation());
        assert!(ProtocolError::InvalidChannel(0).is_validation());
        assert!(!ProtocolError::Timeout.is_validation());
        assert!(!ProtocolError::UnsupportedFirmware(40).is_validation());
    }

    #[test]
    fn test_error_display() {
        let err = ProtocolError::UnexpectedResponse(0x4B);
        assert_eq!(err.to_string(), "Unexpected return value from Pulse Pal: 0x4b");
    }
}
