//! Unit quantization
//!
//! Converts physical units into device integer units:
//! - Time: seconds -> cycles at [`CYCLE_FREQUENCY`]
//! - Voltage: volts -> DAC steps at the firmware's DAC resolution
//!
//! Both conversions go through [`Decimal`] so that boundary values such as
//! exactly 3600 s or exactly 10 V land on integer endpoints. A float is
//! converted to its shortest decimal representation before scaling, which is
//! how the value was written by the caller.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::{ProtocolError, CYCLE_FREQUENCY, MAX_CYCLES, MAX_VOLTAGE, MIN_VOLTAGE};

/// Firmware versions below this use an 8-bit DAC
const FIRMWARE_16BIT: u32 = 20;

/// First firmware version this driver does not understand
const FIRMWARE_UNSUPPORTED: u32 = 40;

/// Resolution of the output DAC, as determined by firmware version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DacResolution {
    /// Steps 0..=255, encoded as one byte
    EightBit,
    /// Steps 0..=65535, encoded as two little-endian bytes
    SixteenBit,
}

impl DacResolution {
    /// Select the DAC resolution reported by a firmware version
    pub fn from_firmware(version: u32) -> Result<Self, ProtocolError> {
        match version {
            v if v < FIRMWARE_16BIT => Ok(DacResolution::EightBit),
            v if v < FIRMWARE_UNSUPPORTED => Ok(DacResolution::SixteenBit),
            v => Err(ProtocolError::UnsupportedFirmware(v)),
        }
    }

    /// Highest DAC step
    pub fn max_value(self) -> u16 {
        match self {
            DacResolution::EightBit => u8::MAX as u16,
            DacResolution::SixteenBit => u16::MAX,
        }
    }

    /// Encoded width of one voltage value, in bytes
    pub fn width(self) -> usize {
        match self {
            DacResolution::EightBit => 1,
            DacResolution::SixteenBit => 2,
        }
    }
}

/// Exact decimal value of a float as the caller wrote it
pub(crate) fn to_decimal(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    // Display prints the shortest string that round-trips, never in exponent form
    value
        .to_string()
        .parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_f64(value))
}

/// Convert seconds to device cycles, rounding to the nearest cycle.
///
/// Negative, non-finite, or over-range values are rejected.
pub fn seconds_to_cycles(seconds: f64) -> Result<u32, ProtocolError> {
    let exact = to_decimal(seconds).ok_or(ProtocolError::TimeOutOfRange(seconds))?;
    decimal_to_cycles(exact).ok_or(ProtocolError::TimeOutOfRange(seconds))
}

/// Cycle count of an exact time value, if representable
pub(crate) fn decimal_to_cycles(seconds: Decimal) -> Option<u32> {
    if seconds.is_sign_negative() && !seconds.is_zero() {
        return None;
    }
    let cycles = seconds
        .checked_mul(Decimal::from(CYCLE_FREQUENCY))?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u32()?;
    (cycles <= MAX_CYCLES).then_some(cycles)
}

/// Convert cycles back to seconds
pub fn cycles_to_seconds(cycles: u32) -> f64 {
    cycles as f64 / CYCLE_FREQUENCY as f64
}

/// Convert volts to DAC steps: `ceil((volts + 10) / 20 * max)`.
///
/// Values outside [-10, 10] V are rejected.
pub fn volts_to_steps(volts: f64, dac: DacResolution) -> Result<u16, ProtocolError> {
    if !(MIN_VOLTAGE..=MAX_VOLTAGE).contains(&volts) {
        return Err(ProtocolError::VoltageOutOfRange(volts));
    }
    let exact = to_decimal(volts).ok_or(ProtocolError::VoltageOutOfRange(volts))?;

    // Multiply before dividing; dividing by 20 always terminates
    let steps = ((exact + Decimal::from(10)) * Decimal::from(dac.max_value()) / Decimal::from(20))
        .ceil()
        .to_u16()
        .ok_or(ProtocolError::VoltageOutOfRange(volts))?;
    Ok(steps.min(dac.max_value()))
}

/// Nominal output voltage of a DAC step
pub fn steps_to_volts(steps: u16, dac: DacResolution) -> f64 {
    steps as f64 * 20.0 / dac.max_value() as f64 - 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dac_resolution_from_firmware() {
        assert_eq!(DacResolution::from_firmware(0).unwrap(), DacResolution::EightBit);
        assert_eq!(DacResolution::from_firmware(19).unwrap(), DacResolution::EightBit);
        assert_eq!(DacResolution::from_firmware(20).unwrap(), DacResolution::SixteenBit);
        assert_eq!(DacResolution::from_firmware(39).unwrap(), DacResolution::SixteenBit);
        assert!(matches!(
            DacResolution::from_firmware(40),
            Err(ProtocolError::UnsupportedFirmware(40))
        ));
    }

    #[test]
    fn test_seconds_to_cycles_boundaries() {
        assert_eq!(seconds_to_cycles(0.0).unwrap(), 0);
        assert_eq!(seconds_to_cycles(0.0001).unwrap(), 2);
        assert_eq!(seconds_to_cycles(3600.0).unwrap(), MAX_CYCLES);
        assert!(seconds_to_cycles(3600.0001).is_err());
        assert!(seconds_to_cycles(-0.0001).is_err());
        assert!(seconds_to_cycles(f64::NAN).is_err());
    }

    #[test]
    fn test_huge_times_rejected_without_overflow() {
        for seconds in [1e20, 1e27, 7.9e28, f64::MAX] {
            assert!(matches!(
                seconds_to_cycles(seconds),
                Err(ProtocolError::TimeOutOfRange(_))
            ));
        }
    }

    #[test]
    fn test_seconds_to_cycles_rounds_to_nearest() {
        // 0.3 s is not exact in binary floating point
        assert_eq!(seconds_to_cycles(0.3).unwrap(), 6000);
        assert_eq!(seconds_to_cycles(0.000074).unwrap(), 1);
        assert_eq!(seconds_to_cycles(0.000076).unwrap(), 2);
    }

    #[test]
    fn test_volts_to_steps_endpoints() {
        for dac in [DacResolution::EightBit, DacResolution::SixteenBit] {
            assert_eq!(volts_to_steps(-10.0, dac).unwrap(), 0);
            assert_eq!(volts_to_steps(10.0, dac).unwrap(), dac.max_value());
        }
        assert_eq!(volts_to_steps(0.0, DacResolution::SixteenBit).unwrap(), 32768);
        assert_eq!(volts_to_steps(0.0, DacResolution::EightBit).unwrap(), 128);
    }

    #[test]
    fn test_volts_to_steps_exact_multiple() {
        // (4 / 20) * 255 = 51 exactly; naive float math gives 51.000000000000007
        assert_eq!(volts_to_steps(-6.0, DacResolution::EightBit).unwrap(), 51);
    }

    #[test]
    fn test_volts_out_of_range() {
        assert!(volts_to_steps(10.0001, DacResolution::SixteenBit).is_err());
        assert!(volts_to_steps(-10.5, DacResolution::EightBit).is_err());
        assert!(volts_to_steps(f64::NAN, DacResolution::EightBit).is_err());
    }

    #[test]
    fn test_cycles_to_seconds() {
        assert_eq!(cycles_to_seconds(20_000), 1.0);
        assert_eq!(cycles_to_seconds(MAX_CYCLES), 3600.0);
    }
}
