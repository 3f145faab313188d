//! Device configuration files
//!
//! A [`DeviceConfiguration`] describes the serial link plus the parameters
//! to program on each output and trigger channel. It is stored as JSON:
//!
//! ```json
//! {
//!   "connection": { "port_name": "/dev/ttyACM0" },
//!   "output_channels": [
//!     {
//!       "channel": "Channel1",
//!       "settings": [
//!         { "parameter": "Phase1Voltage", "value": 5.0 },
//!         { "parameter": "Phase1Duration", "value": 0.001 }
//!       ]
//!     }
//!   ],
//!   "trigger_channels": [
//!     { "channel": "Channel1", "mode": "Toggle" }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::device::{OutputChannel, ParameterSetting, PulsePal, TriggerChannel, TriggerMode};
use crate::protocol::{ConnectionConfig, ProtocolError};

/// Errors raised while loading or applying a configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read or written
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed JSON or unknown fields and values
    #[error("Invalid configuration file: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A channel appears twice in the same list
    #[error("{channel} is configured more than once")]
    DuplicateChannel {
        /// Which channel
        channel: String,
    },

    /// A setting outside the device limits
    #[error("Invalid setting on output {channel:?}: {source}")]
    InvalidSetting {
        /// Channel carrying the setting
        channel: OutputChannel,
        /// Validation failure
        #[source]
        source: ProtocolError,
    },

    /// The device rejected or failed a command
    #[error("Device error: {0}")]
    Device(#[from] ProtocolError),
}

/// Parameters for one output channel, programmed in order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputChannelConfiguration {
    /// Channel to program
    pub channel: OutputChannel,
    /// Settings, programmed in order
    #[serde(default)]
    pub settings: Vec<ParameterSetting>,
}

/// Trigger mode for one trigger channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerChannelConfiguration {
    /// Trigger input
    pub channel: TriggerChannel,
    /// Mode to set
    #[serde(default)]
    pub mode: TriggerMode,
}

/// Complete device setup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfiguration {
    /// Serial link settings
    pub connection: ConnectionConfig,
    /// Output channel parameters
    pub output_channels: Vec<OutputChannelConfiguration>,
    /// Trigger channel modes
    pub trigger_channels: Vec<TriggerChannelConfiguration>,
}

impl DeviceConfiguration {
    /// Parse and validate a configuration from JSON text
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: DeviceConfiguration = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Loading device configuration from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Pretty-printed JSON
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the configuration to a JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// Check every setting against the device limits.
    ///
    /// Each channel may appear at most once per list.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for output in &self.output_channels {
            if !seen.insert(output.channel) {
                return Err(ConfigError::DuplicateChannel {
                    channel: format!("output {:?}", output.channel),
                });
            }
            for setting in &output.settings {
                setting
                    .validate()
                    .map_err(|source| ConfigError::InvalidSetting {
                        channel: output.channel,
                        source,
                    })?;
            }
        }

        let mut seen = HashSet::new();
        for trigger in &self.trigger_channels {
            if !seen.insert(trigger.channel) {
                return Err(ConfigError::DuplicateChannel {
                    channel: format!("trigger {:?}", trigger.channel),
                });
            }
        }
        Ok(())
    }

    /// Link settings for opening a device
    pub fn connection_config(&self) -> ConnectionConfig {
        self.connection.clone()
    }

    /// Program every setting on an open device.
    ///
    /// Output channels are programmed first, in file order, then trigger
    /// channels. Stops at the first failure.
    pub fn apply(&self, device: &mut PulsePal) -> Result<(), ConfigError> {
        self.validate()?;

        for output in &self.output_channels {
            for setting in &output.settings {
                device.apply_setting(output.channel, *setting)?;
            }
        }
        for trigger in &self.trigger_channels {
            device.set_trigger_mode(trigger.channel, trigger.mode)?;
        }

        info!(
            "Applied configuration: {} output channel(s), {} trigger channel(s)",
            self.output_channels.len(),
            self.trigger_channels.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "connection": { "port_name": "/dev/ttyACM0" },
        "output_channels": [
            {
                "channel": "Channel2",
                "settings": [
                    { "parameter": "Biphasic", "value": true },
                    { "parameter": "Phase1Voltage", "value": 5.0 },
                    { "parameter": "BurstDuration", "value": 0.0 },
                    { "parameter": "CustomTrainIdentity", "value": "Train1" }
                ]
            }
        ],
        "trigger_channels": [
            { "channel": "Channel1", "mode": "Toggle" }
        ]
    }"#;

    #[test]
    fn test_parse_sample() {
        let config = DeviceConfiguration::from_json_str(SAMPLE).unwrap();
        assert_eq!(config.connection.port_name, "/dev/ttyACM0");
        assert_eq!(config.connection.read_timeout_ms, 100);
        assert_eq!(config.output_channels.len(), 1);
        assert_eq!(config.output_channels[0].channel, OutputChannel::Channel2);
        assert_eq!(
            config.output_channels[0].settings[1],
            ParameterSetting::Phase1Voltage(5.0)
        );
        assert_eq!(config.trigger_channels[0].mode, TriggerMode::Toggle);
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = DeviceConfiguration::from_json_str("{}").unwrap();
        assert_eq!(config, DeviceConfiguration::default());
    }

    #[test]
    fn test_out_of_range_setting_rejected() {
        let json = r#"{
            "output_channels": [
                { "channel": "Channel1", "settings": [
                    { "parameter": "RestingVoltage", "value": 12.5 }
                ] }
            ]
        }"#;
        match DeviceConfiguration::from_json_str(json) {
            Err(ConfigError::InvalidSetting { channel, source }) => {
                assert_eq!(channel, OutputChannel::Channel1);
                assert!(matches!(source, ProtocolError::VoltageOutOfRange(_)));
            }
            other => panic!("expected invalid setting, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_channel_rejected() {
        let json = r#"{
            "trigger_channels": [
                { "channel": "Channel2", "mode": "Normal" },
                { "channel": "Channel2", "mode": "PulseGated" }
            ]
        }"#;
        assert!(matches!(
            DeviceConfiguration::from_json_str(json),
            Err(ConfigError::DuplicateChannel { .. })
        ));
    }

    #[test]
    fn test_unknown_parameter_rejected() {
        let json = r#"{
            "output_channels": [
                { "channel": "Channel1", "settings": [
                    { "parameter": "Frequency", "value": 10 }
                ] }
            ]
        }"#;
        assert!(matches!(
            DeviceConfiguration::from_json_str(json),
            Err(ConfigError::JsonError(_))
        ));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stimulus.json");

        let config = DeviceConfiguration::from_json_str(SAMPLE).unwrap();
        config.save(&path).unwrap();

        let loaded = DeviceConfiguration::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = DeviceConfiguration::from_file(dir.path().join("missing.json"));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_apply_requires_open_device() {
        let config = DeviceConfiguration::from_json_str(SAMPLE).unwrap();
        let mut device = PulsePal::with_config(config.connection_config());
        assert!(matches!(
            config.apply(&mut device),
            Err(ConfigError::Device(ProtocolError::NotConnected))
        ));
    }
}
