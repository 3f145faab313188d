//! Protocol commands
//!
//! Opcodes and parameter codes understood by the Pulse Pal firmware.

use serde::{Deserialize, Serialize};

/// Opcodes that follow the menu-select byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Request the acknowledgement and firmware version
    Handshake,
    /// Program one parameter on one channel
    ProgramParameter,
    /// Program custom pulse train 1
    ProgramTrain1,
    /// Program custom pulse train 2
    ProgramTrain2,
    /// Start pulse trains on a set of output channels
    Trigger,
    /// Write text to the oLED display
    UpdateDisplay,
    /// Hold a fixed voltage on an output channel
    SetVoltage,
    /// Stop all running pulse trains
    Abort,
    /// Notify the device that the host is going away
    Disconnect,
    /// Enable or disable continuous loop mode on a channel
    SetLoop,
    /// Set the 6-character client name shown in the device menu
    SetClientId,
}

impl Opcode {
    /// Wire value of the opcode
    pub fn byte(self) -> u8 {
        match self {
            Opcode::Handshake => 72,
            Opcode::ProgramParameter => 74,
            Opcode::ProgramTrain1 => 75,
            Opcode::ProgramTrain2 => 76,
            Opcode::Trigger => 77,
            Opcode::UpdateDisplay => 78,
            Opcode::SetVoltage => 79,
            Opcode::Abort => 80,
            Opcode::Disconnect => 81,
            Opcode::SetLoop => 82,
            Opcode::SetClientId => 89,
        }
    }
}

/// Marker byte that opens the handshake response frame
pub const ACKNOWLEDGE: u8 = 75;

/// How a parameter value is encoded after the program header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    /// One byte, 0 or 1
    Boolean,
    /// One raw byte
    Byte,
    /// Four-byte cycle count
    Time,
    /// One or two DAC steps, depending on firmware
    Voltage,
}

/// Parameter identifiers for the program-parameter opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterCode {
    /// Monophasic or biphasic pulses
    Biphasic,
    /// Voltage of the first phase
    Phase1Voltage,
    /// Voltage of the second phase
    Phase2Voltage,
    /// Duration of the first phase
    Phase1Duration,
    /// Gap between the two phases
    InterPhaseInterval,
    /// Duration of the second phase
    Phase2Duration,
    /// Gap between pulses
    InterPulseInterval,
    /// Duration of a burst; zero disables bursts
    BurstDuration,
    /// Gap between bursts
    InterBurstInterval,
    /// Duration of the whole train
    PulseTrainDuration,
    /// Delay from trigger to first pulse
    PulseTrainDelay,
    /// Link to trigger channel 1
    TriggerOnChannel1,
    /// Link to trigger channel 2
    TriggerOnChannel2,
    /// Custom train slot played by the channel, or 0
    CustomTrainIdentity,
    /// Pulse or burst onsets
    CustomTrainTarget,
    /// Loop the custom train
    CustomTrainLoop,
    /// Voltage between pulses
    RestingVoltage,
    /// Trigger channel behavior
    TriggerMode,
}

impl ParameterCode {
    /// Wire value of the parameter code
    pub fn byte(self) -> u8 {
        match self {
            ParameterCode::Biphasic => 1,
            ParameterCode::Phase1Voltage => 2,
            ParameterCode::Phase2Voltage => 3,
            ParameterCode::Phase1Duration => 4,
            ParameterCode::InterPhaseInterval => 5,
            ParameterCode::Phase2Duration => 6,
            ParameterCode::InterPulseInterval => 7,
            ParameterCode::BurstDuration => 8,
            ParameterCode::InterBurstInterval => 9,
            ParameterCode::PulseTrainDuration => 10,
            ParameterCode::PulseTrainDelay => 11,
            ParameterCode::TriggerOnChannel1 => 12,
            ParameterCode::TriggerOnChannel2 => 13,
            ParameterCode::CustomTrainIdentity => 14,
            ParameterCode::CustomTrainTarget => 15,
            ParameterCode::CustomTrainLoop => 16,
            ParameterCode::RestingVoltage => 17,
            ParameterCode::TriggerMode => 128,
        }
    }

    /// Declared payload type of the parameter
    pub fn value_type(self) -> ParameterType {
        match self {
            ParameterCode::Biphasic
            | ParameterCode::TriggerOnChannel1
            | ParameterCode::TriggerOnChannel2
            | ParameterCode::CustomTrainLoop => ParameterType::Boolean,
            ParameterCode::Phase1Voltage
            | ParameterCode::Phase2Voltage
            | ParameterCode::RestingVoltage => ParameterType::Voltage,
            ParameterCode::Phase1Duration
            | ParameterCode::InterPhaseInterval
            | ParameterCode::Phase2Duration
            | ParameterCode::InterPulseInterval
            | ParameterCode::BurstDuration
            | ParameterCode::InterBurstInterval
            | ParameterCode::PulseTrainDuration
            | ParameterCode::PulseTrainDelay => ParameterType::Time,
            ParameterCode::CustomTrainIdentity
            | ParameterCode::CustomTrainTarget
            | ParameterCode::TriggerMode => ParameterType::Byte,
        }
    }
}

/// A typed parameter payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterValue {
    /// One byte, 0 or 1
    Boolean(bool),
    /// Raw byte
    Byte(u8),
    /// Seconds
    Time(f64),
    /// Volts
    Voltage(f64),
}

impl ParameterValue {
    /// Wire type this payload is encoded as
    pub fn value_type(&self) -> ParameterType {
        match self {
            ParameterValue::Boolean(_) => ParameterType::Boolean,
            ParameterValue::Byte(_) => ParameterType::Byte,
            ParameterValue::Time(_) => ParameterType::Time,
            ParameterValue::Voltage(_) => ParameterType::Voltage,
        }
    }
}
