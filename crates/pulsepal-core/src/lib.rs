//! # Pulse Pal Core Library
//!
//! Driver for the Pulse Pal open-source pulse stimulator.
//!
//! This library provides:
//! - The serial link: handshake, background reader and connection lifecycle
//! - Command encoding with exact time and voltage quantization
//! - Output channel parameters, trigger modes and custom pulse trains
//! - JSON device configuration files
//!
//! ## Example
//!
//! ```rust,no_run
//! use pulsepal_core::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! # fn main() -> Result<(), ProtocolError> {
//! let mut device = PulsePal::new("/dev/ttyACM0");
//! device.open(CancellationToken::new())?;
//!
//! device.set_phase1_voltage(OutputChannel::Channel1, 5.0)?;
//! device.set_phase1_duration(OutputChannel::Channel1, 0.001)?;
//! device.trigger_output_channels(OutputChannel::Channel1.into())?;
//!
//! device.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod device;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ConfigError, DeviceConfiguration};
    pub use crate::device::{
        ChannelTriggers, CustomTrainId, CustomTrainTarget, OutputChannel, ParameterSetting,
        PulseOnset, PulsePal, TriggerChannel, TriggerMode,
    };
    pub use crate::protocol::{ConnectionConfig, ConnectionState, ProtocolError};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
