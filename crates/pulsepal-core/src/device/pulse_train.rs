//! Custom pulse train encoding
//!
//! Every input shape is reduced to a pulse count plus two sequences, then
//! encoded the same way:
//!
//! ```text
//! [213, 75|76] count:u32 time_0..time_n:u32 voltage_0..voltage_n:u8|u16
//! ```
//!
//! Times are grouped before voltages; they are not interleaved.

use rust_decimal::Decimal;

use super::types::{CustomTrainId, PulseOnset};
use crate::protocol::quantize::{decimal_to_cycles, to_decimal};
use crate::protocol::{CommandWriter, ProtocolError, MAX_PULSES, MAX_TIME_PERIOD, MIN_TIME_PERIOD};

pub(crate) fn check_pulse_count(count: usize) -> Result<(), ProtocolError> {
    if count > MAX_PULSES {
        return Err(ProtocolError::TooManyPulses(count));
    }
    Ok(())
}

/// Encode a train whose onset times still need the monotonicity check
pub(crate) fn write_pulse_train<T, V>(
    writer: &mut CommandWriter<'_>,
    id: CustomTrainId,
    count: usize,
    times: T,
    voltages: V,
) -> Result<(), ProtocolError>
where
    T: IntoIterator<Item = f64>,
    V: IntoIterator<Item = f64>,
{
    check_pulse_count(count)?;
    writer.write_header(id.opcode());
    writer.write_u32(count as u32);
    for time in times {
        writer.write_monotonic_time(time)?;
    }
    for volts in voltages {
        writer.write_voltage(volts)?;
    }
    Ok(())
}

/// Validate parallel time and voltage arrays
pub(crate) fn check_arrays(times: &[f64], voltages: &[f64]) -> Result<(), ProtocolError> {
    check_pulse_count(times.len())?;
    if times.len() != voltages.len() {
        return Err(ProtocolError::LengthMismatch {
            times: times.len(),
            voltages: voltages.len(),
        });
    }
    Ok(())
}

/// Split a 2xN table into its time and voltage rows
pub(crate) fn table_rows<R: AsRef<[f64]>>(table: &[R]) -> Result<(&[f64], &[f64]), ProtocolError> {
    let [times, voltages] = table else {
        return Err(ProtocolError::InvalidTableShape(table.len()));
    };
    let (times, voltages) = (times.as_ref(), voltages.as_ref());
    check_pulse_count(times.len())?;
    if times.len() != voltages.len() {
        return Err(ProtocolError::LengthMismatch {
            times: times.len(),
            voltages: voltages.len(),
        });
    }
    Ok((times, voltages))
}

/// Onset times of the waveform pulses, in cycles.
///
/// Times are `i * period`, computed exactly, so they are evenly spaced and
/// strictly increasing by construction.
pub(crate) fn waveform_cycles(period: f64, count: usize) -> Result<Vec<u32>, ProtocolError> {
    if !(MIN_TIME_PERIOD..=MAX_TIME_PERIOD).contains(&period) {
        return Err(ProtocolError::TimeOutOfRange(period));
    }
    check_pulse_count(count)?;

    let exact = to_decimal(period).ok_or(ProtocolError::TimeOutOfRange(period))?;
    (0..count)
        .map(|i| {
            let time = exact * Decimal::from(i as u32);
            decimal_to_cycles(time).ok_or(ProtocolError::TimeOutOfRange(period * i as f64))
        })
        .collect()
}

/// Times and voltages of an onset list
pub(crate) fn onset_columns(
    onsets: &[PulseOnset],
) -> (
    impl Iterator<Item = f64> + '_,
    impl Iterator<Item = f64> + '_,
) {
    (
        onsets.iter().map(|onset| onset.time),
        onsets.iter().map(|onset| onset.voltage),
    )
}
