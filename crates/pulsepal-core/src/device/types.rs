//! Channel and train identifiers

use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};

use crate::protocol::{Opcode, ProtocolError};

/// Number of physical output channels
pub const OUTPUT_CHANNEL_COUNT: u8 = 4;

/// One of the device's analog stimulation outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputChannel {
    /// Output channel 1
    Channel1 = 1,
    /// Output channel 2
    Channel2 = 2,
    /// Output channel 3
    Channel3 = 3,
    /// Output channel 4
    Channel4 = 4,
}

impl OutputChannel {
    /// Every output channel, in order
    pub const ALL: [OutputChannel; 4] = [
        OutputChannel::Channel1,
        OutputChannel::Channel2,
        OutputChannel::Channel3,
        OutputChannel::Channel4,
    ];

    /// Wire id of the channel
    pub fn id(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for OutputChannel {
    type Error = ProtocolError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            1 => Ok(OutputChannel::Channel1),
            2 => Ok(OutputChannel::Channel2),
            3 => Ok(OutputChannel::Channel3),
            4 => Ok(OutputChannel::Channel4),
            _ => Err(ProtocolError::InvalidChannel(id)),
        }
    }
}

/// A trigger input that starts pulse trains on linked output channels.
///
/// Trigger channels are programmed with the same opcode as output channels.
/// Their wire ids follow the output channel ids: trigger channel `n` is sent
/// as `OUTPUT_CHANNEL_COUNT + n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerChannel {
    /// Trigger channel 1
    Channel1 = 1,
    /// Trigger channel 2
    Channel2 = 2,
}

impl TriggerChannel {
    /// Channel number as labelled on the device
    pub fn number(self) -> u8 {
        self as u8
    }

    /// Wire id used in the program-parameter header
    pub fn id(self) -> u8 {
        OUTPUT_CHANNEL_COUNT + self.number()
    }
}

impl TryFrom<u8> for TriggerChannel {
    type Error = ProtocolError;

    fn try_from(number: u8) -> Result<Self, Self::Error> {
        match number {
            1 => Ok(TriggerChannel::Channel1),
            2 => Ok(TriggerChannel::Channel2),
            _ => Err(ProtocolError::InvalidChannel(number)),
        }
    }
}

/// Bitmask of output channels to start; channel `n` is bit `n - 1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelTriggers(u8);

impl ChannelTriggers {
    /// No channels
    pub const NONE: ChannelTriggers = ChannelTriggers(0);
    /// All four output channels
    pub const ALL: ChannelTriggers = ChannelTriggers(0x0F);

    /// Build from raw bits; bits above channel 4 are dropped
    pub fn from_bits(bits: u8) -> Self {
        ChannelTriggers(bits & Self::ALL.0)
    }

    /// Raw mask sent on the wire
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Whether `channel` is selected
    pub fn contains(self, channel: OutputChannel) -> bool {
        self.0 & Self::from(channel).0 != 0
    }

    /// Whether no channel is selected
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl From<OutputChannel> for ChannelTriggers {
    fn from(channel: OutputChannel) -> Self {
        ChannelTriggers(1 << (channel.id() - 1))
    }
}

impl BitOr for ChannelTriggers {
    type Output = ChannelTriggers;

    fn bitor(self, rhs: Self) -> Self::Output {
        ChannelTriggers(self.0 | rhs.0)
    }
}

impl BitOr<OutputChannel> for ChannelTriggers {
    type Output = ChannelTriggers;

    fn bitor(self, rhs: OutputChannel) -> Self::Output {
        self | ChannelTriggers::from(rhs)
    }
}

impl BitOr for OutputChannel {
    type Output = ChannelTriggers;

    fn bitor(self, rhs: Self) -> Self::Output {
        ChannelTriggers::from(self) | rhs
    }
}

impl BitOrAssign for ChannelTriggers {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl FromIterator<OutputChannel> for ChannelTriggers {
    fn from_iter<I: IntoIterator<Item = OutputChannel>>(iter: I) -> Self {
        iter.into_iter()
            .fold(ChannelTriggers::NONE, |mask, channel| mask | channel)
    }
}

/// One of the two device-resident custom pulse train slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CustomTrainId {
    /// Slot 1
    Train1 = 1,
    /// Slot 2
    Train2 = 2,
}

impl CustomTrainId {
    /// Slot number
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Opcode that programs this slot
    pub fn opcode(self) -> Opcode {
        match self {
            CustomTrainId::Train1 => Opcode::ProgramTrain1,
            CustomTrainId::Train2 => Opcode::ProgramTrain2,
        }
    }
}

impl TryFrom<u8> for CustomTrainId {
    type Error = ProtocolError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            1 => Ok(CustomTrainId::Train1),
            2 => Ok(CustomTrainId::Train2),
            _ => Err(ProtocolError::InvalidTrainId(id)),
        }
    }
}

/// How the times of a custom train are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CustomTrainTarget {
    /// Times are pulse onsets
    #[default]
    PulseOnsets = 0,
    /// Times are burst onsets; pulses within a burst follow the channel's
    /// pulse parameters
    BurstOnsets = 1,
}

/// Behavior of a trigger channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TriggerMode {
    /// A low-to-high transition starts the linked trains
    #[default]
    Normal = 0,
    /// Each transition toggles the linked trains on and off
    Toggle = 1,
    /// Trains play only while the trigger is held high
    PulseGated = 2,
}

/// Onset time and voltage of one pulse in a custom train
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PulseOnset {
    /// Seconds from the start of the train
    pub time: f64,
    /// Volts
    pub voltage: f64,
}

impl PulseOnset {
    /// Pulse starting at `time` seconds with `voltage` volts
    pub fn new(time: f64, voltage: f64) -> Self {
        Self { time, voltage }
    }
}
