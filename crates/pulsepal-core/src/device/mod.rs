//! Pulse Pal device operations
//!
//! [`PulsePal`] wraps a [`Connection`] and exposes every device command.
//! Each operation validates and quantizes its inputs inside one command
//! transaction and performs a single write; a validation failure sends
//! nothing.
//!
//! Operations take `&mut self`, so only one command is ever in flight on a
//! device. Share a device between threads behind a `Mutex`.
//!
//! Device-side behavior worth knowing:
//! - continuous or overlapping pulses merge
//! - on a biphasic channel the second phase uses the negated voltage of the first

mod pulse_train;
mod settings;
mod types;

pub use settings::ParameterSetting;
pub use types::{
    ChannelTriggers, CustomTrainId, CustomTrainTarget, OutputChannel, PulseOnset, TriggerChannel,
    TriggerMode, OUTPUT_CHANNEL_COUNT,
};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::protocol::{
    Connection, ConnectionConfig, ConnectionState, Opcode, ParameterCode, ParameterValue,
    ProtocolError, Transport, LINE_BREAK,
};

/// Characters per row of the oLED display
pub const MAX_DISPLAY_CHARACTERS: usize = 16;

/// Length of the client identifier shown in the device menu
pub const CLIENT_ID_LENGTH: usize = 6;

/// A Pulse Pal pulse stimulator
pub struct PulsePal {
    connection: Connection,
}

impl PulsePal {
    /// Create a device handle for a serial port (not yet open)
    pub fn new(port_name: impl Into<String>) -> Self {
        Self::with_config(ConnectionConfig::new(port_name))
    }

    /// Create a device handle with explicit link settings
    pub fn with_config(config: ConnectionConfig) -> Self {
        Self {
            connection: Connection::new(config),
        }
    }

    /// Open the serial port and wait for the handshake
    pub fn open(&mut self, cancel: CancellationToken) -> Result<(), ProtocolError> {
        self.connection.open(cancel)
    }

    /// Perform the handshake over an already opened transport
    pub fn open_with_transport(
        &mut self,
        transport: Box<dyn Transport>,
        cancel: CancellationToken,
    ) -> Result<(), ProtocolError> {
        self.connection.open_with_transport(transport, cancel)
    }

    /// Send the disconnect notice and release the port
    pub fn close(&mut self) -> Result<(), ProtocolError> {
        self.connection.close()
    }

    /// True once the handshake has been acknowledged
    pub fn is_open(&self) -> bool {
        self.connection.is_open()
    }

    /// Firmware version reported by the device, once open
    pub fn firmware_version(&self) -> Option<u32> {
        self.connection.firmware_version()
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// The underlying connection
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Program one parameter on a channel id.
    ///
    /// The payload encoding follows the parameter's declared type. Channel
    /// id 0 and mismatched payload types are rejected.
    pub fn program_parameter(
        &mut self,
        channel: u8,
        code: ParameterCode,
        value: ParameterValue,
    ) -> Result<(), ProtocolError> {
        settings::validate_value(code, value)?;

        debug!("Programming {:?} = {:?} on channel {}", code, value, channel);
        self.connection.transaction(|writer| {
            writer.write_program_header(channel, code)?;
            match value {
                ParameterValue::Boolean(on) => writer.write_bool(on),
                ParameterValue::Byte(byte) => writer.write_u8(byte),
                ParameterValue::Time(seconds) if settings::is_burst_disable(code, seconds) => {
                    writer.write_u32(0)
                }
                ParameterValue::Time(seconds) => writer.write_time(seconds)?,
                ParameterValue::Voltage(volts) => writer.write_voltage(volts)?,
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Program one setting on an output channel
    pub fn apply_setting(
        &mut self,
        channel: OutputChannel,
        setting: ParameterSetting,
    ) -> Result<(), ProtocolError> {
        self.program_parameter(channel.id(), setting.code(), setting.value())
    }

    /// Select monophasic or biphasic square pulses
    pub fn set_biphasic(
        &mut self,
        channel: OutputChannel,
        biphasic: bool,
    ) -> Result<(), ProtocolError> {
        self.apply_setting(channel, ParameterSetting::Biphasic(biphasic))
    }

    /// Voltage of the first phase of each pulse, in [-10, 10] V
    pub fn set_phase1_voltage(
        &mut self,
        channel: OutputChannel,
        volts: f64,
    ) -> Result<(), ProtocolError> {
        self.apply_setting(channel, ParameterSetting::Phase1Voltage(volts))
    }

    /// Voltage of the second phase of each pulse, in [-10, 10] V
    pub fn set_phase2_voltage(
        &mut self,
        channel: OutputChannel,
        volts: f64,
    ) -> Result<(), ProtocolError> {
        self.apply_setting(channel, ParameterSetting::Phase2Voltage(volts))
    }

    /// Duration of the first phase, in [0.0001, 3600] s
    pub fn set_phase1_duration(
        &mut self,
        channel: OutputChannel,
        seconds: f64,
    ) -> Result<(), ProtocolError> {
        self.apply_setting(channel, ParameterSetting::Phase1Duration(seconds))
    }

    /// Interval between the phases of a biphasic pulse, in [0.0001, 3600] s
    pub fn set_inter_phase_interval(
        &mut self,
        channel: OutputChannel,
        seconds: f64,
    ) -> Result<(), ProtocolError> {
        self.apply_setting(channel, ParameterSetting::InterPhaseInterval(seconds))
    }

    /// Duration of the second phase, in [0.0001, 3600] s
    pub fn set_phase2_duration(
        &mut self,
        channel: OutputChannel,
        seconds: f64,
    ) -> Result<(), ProtocolError> {
        self.apply_setting(channel, ParameterSetting::Phase2Duration(seconds))
    }

    /// Interval between pulses, in [0.0001, 3600] s
    pub fn set_inter_pulse_interval(
        &mut self,
        channel: OutputChannel,
        seconds: f64,
    ) -> Result<(), ProtocolError> {
        self.apply_setting(channel, ParameterSetting::InterPulseInterval(seconds))
    }

    /// Duration of a pulse burst, in [0.0001, 3600] s. Zero disables burst mode.
    pub fn set_burst_duration(
        &mut self,
        channel: OutputChannel,
        seconds: f64,
    ) -> Result<(), ProtocolError> {
        self.apply_setting(channel, ParameterSetting::BurstDuration(seconds))
    }

    /// Off-time between bursts, in [0.0001, 3600] s
    pub fn set_inter_burst_interval(
        &mut self,
        channel: OutputChannel,
        seconds: f64,
    ) -> Result<(), ProtocolError> {
        self.apply_setting(channel, ParameterSetting::InterBurstInterval(seconds))
    }

    /// Duration of the whole pulse train, in [0.0001, 3600] s
    pub fn set_pulse_train_duration(
        &mut self,
        channel: OutputChannel,
        seconds: f64,
    ) -> Result<(), ProtocolError> {
        self.apply_setting(channel, ParameterSetting::PulseTrainDuration(seconds))
    }

    /// Delay between a trigger and the start of the train, in [0.0001, 3600] s
    pub fn set_pulse_train_delay(
        &mut self,
        channel: OutputChannel,
        seconds: f64,
    ) -> Result<(), ProtocolError> {
        self.apply_setting(channel, ParameterSetting::PulseTrainDelay(seconds))
    }

    /// Link or unlink an output channel to trigger channel 1
    pub fn set_trigger_on_channel1(
        &mut self,
        channel: OutputChannel,
        enabled: bool,
    ) -> Result<(), ProtocolError> {
        self.apply_setting(channel, ParameterSetting::TriggerOnChannel1(enabled))
    }

    /// Link or unlink an output channel to trigger channel 2
    pub fn set_trigger_on_channel2(
        &mut self,
        channel: OutputChannel,
        enabled: bool,
    ) -> Result<(), ProtocolError> {
        self.apply_setting(channel, ParameterSetting::TriggerOnChannel2(enabled))
    }

    /// Select which custom train (if any) the channel plays
    pub fn set_custom_train_identity(
        &mut self,
        channel: OutputChannel,
        train: Option<CustomTrainId>,
    ) -> Result<(), ProtocolError> {
        self.apply_setting(channel, ParameterSetting::CustomTrainIdentity(train))
    }

    /// Interpret custom train times as pulse or burst onsets
    pub fn set_custom_train_target(
        &mut self,
        channel: OutputChannel,
        target: CustomTrainTarget,
    ) -> Result<(), ProtocolError> {
        self.apply_setting(channel, ParameterSetting::CustomTrainTarget(target))
    }

    /// Loop the custom train for the pulse train duration
    pub fn set_custom_train_loop(
        &mut self,
        channel: OutputChannel,
        enabled: bool,
    ) -> Result<(), ProtocolError> {
        self.apply_setting(channel, ParameterSetting::CustomTrainLoop(enabled))
    }

    /// Voltage between phases, pulses and trains, in [-10, 10] V
    pub fn set_resting_voltage(
        &mut self,
        channel: OutputChannel,
        volts: f64,
    ) -> Result<(), ProtocolError> {
        self.apply_setting(channel, ParameterSetting::RestingVoltage(volts))
    }

    /// Set the behavior of a trigger channel
    pub fn set_trigger_mode(
        &mut self,
        channel: TriggerChannel,
        mode: TriggerMode,
    ) -> Result<(), ProtocolError> {
        self.program_parameter(
            channel.id(),
            ParameterCode::TriggerMode,
            ParameterValue::Byte(mode as u8),
        )
    }

    /// Program a custom train from parallel arrays of onset times (s) and voltages (V)
    pub fn send_custom_pulse_train(
        &mut self,
        id: CustomTrainId,
        times: &[f64],
        voltages: &[f64],
    ) -> Result<(), ProtocolError> {
        pulse_train::check_arrays(times, voltages)?;
        self.connection.transaction(|writer| {
            pulse_train::write_pulse_train(
                writer,
                id,
                times.len(),
                times.iter().copied(),
                voltages.iter().copied(),
            )
        })?;
        Ok(())
    }

    /// Program a custom train from a list of pulse onsets
    pub fn send_custom_pulse_train_onsets(
        &mut self,
        id: CustomTrainId,
        onsets: &[PulseOnset],
    ) -> Result<(), ProtocolError> {
        pulse_train::check_pulse_count(onsets.len())?;
        let (times, voltages) = pulse_train::onset_columns(onsets);
        self.connection.transaction(|writer| {
            pulse_train::write_pulse_train(writer, id, onsets.len(), times, voltages)
        })?;
        Ok(())
    }

    /// Program a custom train from a 2xN table: row 0 holds onset times (s),
    /// row 1 the matching voltages (V)
    pub fn send_custom_pulse_train_table<R: AsRef<[f64]>>(
        &mut self,
        id: CustomTrainId,
        table: &[R],
    ) -> Result<(), ProtocolError> {
        let (times, voltages) = pulse_train::table_rows(table)?;
        self.send_custom_pulse_train(id, times, voltages)
    }

    /// Program a train of continuous monophasic pulses, one every
    /// `sampling_period` seconds, with the given voltages
    pub fn send_custom_waveform(
        &mut self,
        id: CustomTrainId,
        sampling_period: f64,
        voltages: &[f64],
    ) -> Result<(), ProtocolError> {
        let cycles = pulse_train::waveform_cycles(sampling_period, voltages.len())?;
        self.connection.transaction(|writer| {
            writer.write_header(id.opcode());
            writer.write_u32(cycles.len() as u32);
            for &time in &cycles {
                writer.write_u32(time);
            }
            for &volts in voltages {
                writer.write_voltage(volts)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Start the pulse trains on the selected output channels
    pub fn trigger_output_channels(
        &mut self,
        channels: ChannelTriggers,
    ) -> Result<(), ProtocolError> {
        self.connection.transaction(|writer| {
            writer.write_header(Opcode::Trigger);
            writer.write_u8(channels.bits());
            Ok(())
        })?;
        Ok(())
    }

    /// Write one row of text to the display
    pub fn update_display(&mut self, text: &str) -> Result<(), ProtocolError> {
        self.update_display_rows(text, "")
    }

    /// Write two rows of text to the display. Each row is truncated to
    /// 16 characters; an empty second row is omitted.
    pub fn update_display_rows(&mut self, row1: &str, row2: &str) -> Result<(), ProtocolError> {
        let row1_len = displayed_chars(row1, MAX_DISPLAY_CHARACTERS);
        let row2_len = displayed_chars(row2, MAX_DISPLAY_CHARACTERS);
        let length = match row2_len {
            0 => row1_len,
            _ => row1_len + 1 + row2_len,
        };

        self.connection.transaction(|writer| {
            writer.write_header(Opcode::UpdateDisplay);
            writer.write_u8(length as u8);
            writer.write_text(row1, MAX_DISPLAY_CHARACTERS);
            if row2_len > 0 {
                writer.write_u8(LINE_BREAK);
                writer.write_text(row2, MAX_DISPLAY_CHARACTERS);
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Hold a constant voltage on an output channel, in [-10, 10] V
    pub fn set_fixed_voltage(
        &mut self,
        channel: OutputChannel,
        volts: f64,
    ) -> Result<(), ProtocolError> {
        self.connection.transaction(|writer| {
            writer.write_header(Opcode::SetVoltage);
            writer.write_u8(channel.id());
            writer.write_voltage(volts)
        })?;
        Ok(())
    }

    /// Stop every pulse train currently playing
    pub fn abort_pulse_trains(&mut self) -> Result<(), ProtocolError> {
        self.connection.transaction(|writer| {
            writer.write_header(Opcode::Abort);
            Ok(())
        })?;
        Ok(())
    }

    /// Play the channel's train indefinitely once triggered
    pub fn set_continuous_loop(
        &mut self,
        channel: OutputChannel,
        enabled: bool,
    ) -> Result<(), ProtocolError> {
        self.connection.transaction(|writer| {
            writer.write_header(Opcode::SetLoop);
            writer.write_u8(channel.id());
            writer.write_bool(enabled);
            Ok(())
        })?;
        Ok(())
    }

    /// Name the connected application in the device menu.
    /// Padded with spaces or truncated to exactly 6 characters.
    pub fn set_client_id(&mut self, id: &str) -> Result<(), ProtocolError> {
        let padding = CLIENT_ID_LENGTH - displayed_chars(id, CLIENT_ID_LENGTH);

        self.connection.transaction(|writer| {
            writer.write_header(Opcode::SetClientId);
            writer.write_text(id, CLIENT_ID_LENGTH);
            writer.write_bytes(&[b' '; CLIENT_ID_LENGTH][..padding]);
            Ok(())
        })?;
        Ok(())
    }
}

/// Characters of `text` that fit in a field of `max_chars`
fn displayed_chars(text: &str, max_chars: usize) -> usize {
    text.chars().take(max_chars).count()
}
