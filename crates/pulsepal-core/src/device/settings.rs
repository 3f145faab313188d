//! Parameter settings
//!
//! [`ParameterSetting`] is the closed set of values that can be programmed on
//! an output channel. Each variant carries its value and maps to exactly one
//! [`ParameterCode`]; applying a setting is a match over the variant.

use serde::{Deserialize, Serialize};

use super::types::{CustomTrainId, CustomTrainTarget};
use crate::protocol::commands::ParameterValue;
use crate::protocol::{
    ParameterCode, ProtocolError, MAX_TIME_PERIOD, MAX_VOLTAGE, MIN_TIME_PERIOD, MIN_VOLTAGE,
};

/// A value for one output-channel parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "parameter", content = "value")]
pub enum ParameterSetting {
    /// Biphasic (true) or monophasic (false) pulses
    Biphasic(bool),
    /// Volts
    Phase1Voltage(f64),
    /// Volts
    Phase2Voltage(f64),
    /// Seconds
    Phase1Duration(f64),
    /// Seconds between the two phases of a biphasic pulse
    InterPhaseInterval(f64),
    /// Seconds
    Phase2Duration(f64),
    /// Seconds
    InterPulseInterval(f64),
    /// Seconds; zero disables burst mode
    BurstDuration(f64),
    /// Seconds
    InterBurstInterval(f64),
    /// Seconds
    PulseTrainDuration(f64),
    /// Seconds between the trigger and the start of the train
    PulseTrainDelay(f64),
    /// Start the train when trigger channel 1 fires
    TriggerOnChannel1(bool),
    /// Start the train when trigger channel 2 fires
    TriggerOnChannel2(bool),
    /// `None` plays the channel's regular pulse parameters
    CustomTrainIdentity(Option<CustomTrainId>),
    /// How custom train times are interpreted
    CustomTrainTarget(CustomTrainTarget),
    /// Repeat the custom train for the train duration
    CustomTrainLoop(bool),
    /// Volts between phases, pulses and trains
    RestingVoltage(f64),
}

impl ParameterSetting {
    /// Parameter code programmed by this setting
    pub fn code(&self) -> ParameterCode {
        match self {
            ParameterSetting::Biphasic(_) => ParameterCode::Biphasic,
            ParameterSetting::Phase1Voltage(_) => ParameterCode::Phase1Voltage,
            ParameterSetting::Phase2Voltage(_) => ParameterCode::Phase2Voltage,
            ParameterSetting::Phase1Duration(_) => ParameterCode::Phase1Duration,
            ParameterSetting::InterPhaseInterval(_) => ParameterCode::InterPhaseInterval,
            ParameterSetting::Phase2Duration(_) => ParameterCode::Phase2Duration,
            ParameterSetting::InterPulseInterval(_) => ParameterCode::InterPulseInterval,
            ParameterSetting::BurstDuration(_) => ParameterCode::BurstDuration,
            ParameterSetting::InterBurstInterval(_) => ParameterCode::InterBurstInterval,
            ParameterSetting::PulseTrainDuration(_) => ParameterCode::PulseTrainDuration,
            ParameterSetting::PulseTrainDelay(_) => ParameterCode::PulseTrainDelay,
            ParameterSetting::TriggerOnChannel1(_) => ParameterCode::TriggerOnChannel1,
            ParameterSetting::TriggerOnChannel2(_) => ParameterCode::TriggerOnChannel2,
            ParameterSetting::CustomTrainIdentity(_) => ParameterCode::CustomTrainIdentity,
            ParameterSetting::CustomTrainTarget(_) => ParameterCode::CustomTrainTarget,
            ParameterSetting::CustomTrainLoop(_) => ParameterCode::CustomTrainLoop,
            ParameterSetting::RestingVoltage(_) => ParameterCode::RestingVoltage,
        }
    }

    /// Wire payload of this setting
    pub fn value(&self) -> ParameterValue {
        match *self {
            ParameterSetting::Biphasic(on)
            | ParameterSetting::TriggerOnChannel1(on)
            | ParameterSetting::TriggerOnChannel2(on)
            | ParameterSetting::CustomTrainLoop(on) => ParameterValue::Boolean(on),
            ParameterSetting::Phase1Voltage(volts)
            | ParameterSetting::Phase2Voltage(volts)
            | ParameterSetting::RestingVoltage(volts) => ParameterValue::Voltage(volts),
            ParameterSetting::Phase1Duration(seconds)
            | ParameterSetting::InterPhaseInterval(seconds)
            | ParameterSetting::Phase2Duration(seconds)
            | ParameterSetting::InterPulseInterval(seconds)
            | ParameterSetting::BurstDuration(seconds)
            | ParameterSetting::InterBurstInterval(seconds)
            | ParameterSetting::PulseTrainDuration(seconds)
            | ParameterSetting::PulseTrainDelay(seconds) => ParameterValue::Time(seconds),
            ParameterSetting::CustomTrainIdentity(id) => {
                ParameterValue::Byte(id.map_or(0, CustomTrainId::id))
            }
            ParameterSetting::CustomTrainTarget(target) => ParameterValue::Byte(target as u8),
        }
    }

    /// Check the value range without touching a device
    pub fn validate(&self) -> Result<(), ProtocolError> {
        validate_value(self.code(), self.value())
    }
}

/// Range check a parameter payload against the device limits
pub(crate) fn validate_value(
    code: ParameterCode,
    value: ParameterValue,
) -> Result<(), ProtocolError> {
    let expected = code.value_type();
    if value.value_type() != expected {
        return Err(ProtocolError::ParameterTypeMismatch { code, expected });
    }

    match value {
        ParameterValue::Voltage(volts) if !(MIN_VOLTAGE..=MAX_VOLTAGE).contains(&volts) => {
            Err(ProtocolError::VoltageOutOfRange(volts))
        }
        ParameterValue::Time(seconds) if is_burst_disable(code, seconds) => Ok(()),
        ParameterValue::Time(seconds) if !(MIN_TIME_PERIOD..=MAX_TIME_PERIOD).contains(&seconds) => {
            Err(ProtocolError::TimeOutOfRange(seconds))
        }
        _ => Ok(()),
    }
}

/// A burst duration of exactly zero switches burst mode off
pub(crate) fn is_burst_disable(code: ParameterCode, seconds: f64) -> bool {
    code == ParameterCode::BurstDuration && seconds == 0.0
}
