//! Command Writer
//!
//! Accumulates one outgoing command in a reusable buffer and sends it with a
//! single write. A command is either transmitted whole by [`CommandWriter::commit`]
//! or not at all: any failed field resets the buffer, and dropping an
//! uncommitted writer discards whatever was accumulated.
//!
//! Field encodings:
//! - integers are little-endian
//! - time values are cycle counts (`u32`)
//! - voltages are DAC steps, one or two bytes depending on [`DacResolution`]
//! - text is ASCII, truncated at a maximum length, never padded

use byteorder::{ByteOrder, LittleEndian};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::io::Write;
use tracing::{trace, warn};

use super::quantize::{decimal_to_cycles, to_decimal, volts_to_steps, DacResolution};
use super::{Opcode, ParameterCode, ProtocolError, MAX_TIME_PERIOD, MIN_TIME_PERIOD, OP_MENU};

/// Minimum spacing between pulse onsets, as an exact decimal (0.0001 s)
fn min_period() -> Decimal {
    Decimal::new(1, 4)
}

/// Builds a single command and writes it atomically to a sink
pub struct CommandWriter<'a> {
    buffer: &'a mut Vec<u8>,
    sink: &'a mut dyn Write,
    dac: DacResolution,
    /// Last onset written by `write_monotonic_time`
    previous_time: Decimal,
    failed: bool,
}

impl<'a> CommandWriter<'a> {
    /// Begin a command transaction. The buffer is cleared first.
    pub fn new(buffer: &'a mut Vec<u8>, sink: &'a mut dyn Write, dac: DacResolution) -> Self {
        buffer.clear();
        Self {
            buffer,
            sink,
            dac,
            // One period below zero, so an onset at time zero is legal
            previous_time: -min_period(),
            failed: false,
        }
    }

    /// Number of bytes accumulated so far
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True until the first field is written
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Bytes accumulated so far
    pub fn as_bytes(&self) -> &[u8] {
        self.buffer
    }

    /// Reset the buffer and hand back the error
    fn fail(&mut self, err: ProtocolError) -> Result<(), ProtocolError> {
        self.buffer.clear();
        self.failed = true;
        Err(err)
    }

    /// Append one byte
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Append a boolean as 0 or 1
    pub fn write_bool(&mut self, value: bool) {
        self.buffer.push(value as u8);
    }

    /// Append a little-endian `u16`
    pub fn write_u16(&mut self, value: u16) {
        let mut bytes = [0u8; 2];
        LittleEndian::write_u16(&mut bytes, value);
        self.buffer.extend_from_slice(&bytes);
    }

    /// Append a little-endian `u32`
    pub fn write_u32(&mut self, value: u32) {
        let mut bytes = [0u8; 4];
        LittleEndian::write_u32(&mut bytes, value);
        self.buffer.extend_from_slice(&bytes);
    }

    /// Append raw bytes
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Write up to `max_chars` characters of ASCII text.
    /// Characters outside ASCII are replaced with `?`.
    pub fn write_text(&mut self, text: &str, max_chars: usize) {
        for c in text.chars().take(max_chars) {
            self.buffer.push(if c.is_ascii() { c as u8 } else { b'?' });
        }
    }

    /// Write `[menu-select, opcode]`
    pub fn write_header(&mut self, opcode: Opcode) {
        self.write_u8(OP_MENU);
        self.write_u8(opcode.byte());
    }

    /// Write the program-parameter header for a channel id.
    ///
    /// Channel id 0 is rejected before anything is written.
    pub fn write_program_header(
        &mut self,
        channel: u8,
        parameter: ParameterCode,
    ) -> Result<(), ProtocolError> {
        if channel == 0 {
            return self.fail(ProtocolError::InvalidChannel(channel));
        }

        self.write_header(Opcode::ProgramParameter);
        self.write_u8(parameter.byte());
        self.write_u8(channel);
        Ok(())
    }

    /// Write a time period in [0.0001, 3600] seconds as cycles
    pub fn write_time(&mut self, seconds: f64) -> Result<(), ProtocolError> {
        if !(MIN_TIME_PERIOD..=MAX_TIME_PERIOD).contains(&seconds) {
            return self.fail(ProtocolError::TimeOutOfRange(seconds));
        }
        match to_decimal(seconds).and_then(decimal_to_cycles) {
            Some(cycles) => {
                self.write_u32(cycles);
                Ok(())
            }
            None => self.fail(ProtocolError::TimeOutOfRange(seconds)),
        }
    }

    /// Write a pulse onset time in [0, 3600] seconds as cycles.
    ///
    /// Each onset must follow the previous one in this command by at least
    /// the minimum time period.
    pub fn write_monotonic_time(&mut self, seconds: f64) -> Result<(), ProtocolError> {
        let Some(exact) = to_decimal(seconds) else {
            return self.fail(ProtocolError::TimeOutOfRange(seconds));
        };

        if exact - self.previous_time < min_period() {
            let previous = self.previous_time.to_f64().unwrap_or_default();
            return self.fail(ProtocolError::NonMonotonicTime {
                previous,
                current: seconds,
            });
        }

        if seconds > MAX_TIME_PERIOD {
            return self.fail(ProtocolError::TimeOutOfRange(seconds));
        }
        match decimal_to_cycles(exact) {
            Some(cycles) => {
                self.write_u32(cycles);
                self.previous_time = exact;
                Ok(())
            }
            None => self.fail(ProtocolError::TimeOutOfRange(seconds)),
        }
    }

    /// Write a voltage in [-10, 10] V as DAC steps
    pub fn write_voltage(&mut self, volts: f64) -> Result<(), ProtocolError> {
        let steps = match volts_to_steps(volts, self.dac) {
            Ok(steps) => steps,
            Err(e) => return self.fail(e),
        };

        match self.dac {
            DacResolution::EightBit => self.write_u8(steps as u8),
            DacResolution::SixteenBit => self.write_u16(steps),
        }
        Ok(())
    }

    /// Send the accumulated command with a single write.
    ///
    /// Returns the number of bytes sent. A writer whose command failed
    /// validation sends nothing.
    pub fn commit(mut self) -> Result<usize, ProtocolError> {
        if self.failed {
            warn!("Discarding command that failed validation");
            return Ok(0);
        }
        if self.buffer.is_empty() {
            return Ok(0);
        }

        trace!("Sending {} bytes: {:02x?}", self.buffer.len(), self.buffer);
        self.sink.write_all(&self.buffer[..])?;
        let sent = self.buffer.len();
        self.buffer.clear();
        Ok(sent)
    }
}

impl Drop for CommandWriter<'_> {
    fn drop(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_writes_once() {
        let mut buffer = Vec::new();
        let mut sink = Vec::new();
        let mut writer = CommandWriter::new(&mut buffer, &mut sink, DacResolution::SixteenBit);
        writer.write_header(Opcode::Abort);
        assert_eq!(writer.commit().unwrap(), 2);
        assert_eq!(sink, vec![213, 80]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_integer_fields_little_endian() {
        let mut buffer = Vec::new();
        let mut sink = Vec::new();
        let mut writer = CommandWriter::new(&mut buffer, &mut sink, DacResolution::EightBit);
        writer.write_u16(0x1234);
        writer.write_u32(0xAABBCCDD);
        writer.write_bool(true);
        writer.commit().unwrap();
        assert_eq!(sink, vec![0x34, 0x12, 0xDD, 0xCC, 0xBB, 0xAA, 1]);
    }

    #[test]
    fn test_text_is_truncated_not_padded() {
        let mut buffer = Vec::new();
        let mut sink = Vec::new();
        let mut writer = CommandWriter::new(&mut buffer, &mut sink, DacResolution::EightBit);
        writer.write_text("abcdef", 4);
        writer.write_text("xy", 4);
        writer.commit().unwrap();
        assert_eq!(sink, b"abcdxy".to_vec());
    }

    #[test]
    fn test_invalid_voltage_resets_buffer() {
        let mut buffer = Vec::new();
        let mut sink = Vec::new();
        let mut writer = CommandWriter::new(&mut buffer, &mut sink, DacResolution::SixteenBit);
        writer.write_program_header(1, ParameterCode::RestingVoltage).unwrap();
        assert!(writer.write_voltage(10.5).is_err());
        assert!(writer.is_empty());
        assert_eq!(writer.commit().unwrap(), 0);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_dropped_writer_sends_nothing() {
        let mut buffer = Vec::new();
        let mut sink = Vec::new();
        {
            let mut writer = CommandWriter::new(&mut buffer, &mut sink, DacResolution::SixteenBit);
            writer.write_header(Opcode::Trigger);
        }
        assert!(buffer.is_empty());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_channel_zero_rejected_before_header() {
        let mut buffer = Vec::new();
        let mut sink = Vec::new();
        let mut writer = CommandWriter::new(&mut buffer, &mut sink, DacResolution::SixteenBit);
        let err = writer
            .write_program_header(0, ParameterCode::Biphasic)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidChannel(0)));
        assert!(writer.is_empty());
    }

    #[test]
    fn test_time_zero_is_first_legal_onset() {
        let mut buffer = Vec::new();
        let mut sink = Vec::new();
        let mut writer = CommandWriter::new(&mut buffer, &mut sink, DacResolution::SixteenBit);
        writer.write_monotonic_time(0.0).unwrap();
        writer.write_monotonic_time(0.0001).unwrap();
        writer.write_monotonic_time(0.0002).unwrap();
        writer.write_monotonic_time(0.0003).unwrap();
        assert_eq!(writer.as_bytes(), &[0, 0, 0, 0, 2, 0, 0, 0, 4, 0, 0, 0, 6, 0, 0, 0]);
    }

    #[test]
    fn test_sub_minimum_gap_rejected() {
        let mut buffer = Vec::new();
        let mut sink = Vec::new();
        let mut writer = CommandWriter::new(&mut buffer, &mut sink, DacResolution::SixteenBit);
        writer.write_monotonic_time(0.5).unwrap();
        let err = writer.write_monotonic_time(0.50005).unwrap_err();
        assert!(matches!(err, ProtocolError::NonMonotonicTime { .. }));
        assert!(writer.is_empty());
    }

    #[test]
    fn test_parameter_time_range() {
        let mut buffer = Vec::new();
        let mut sink = Vec::new();
        let mut writer = CommandWriter::new(&mut buffer, &mut sink, DacResolution::SixteenBit);
        writer.write_time(0.0001).unwrap();
        writer.write_time(3600.0).unwrap();
        assert_eq!(writer.as_bytes(), &[2, 0, 0, 0, 0x00, 0xA2, 0x4A, 0x04]);
        assert!(writer.write_time(0.0).is_err());
        assert!(writer.is_empty());
    }
}
