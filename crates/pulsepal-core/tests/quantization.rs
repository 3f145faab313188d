//! Properties of the time and voltage quantization

use pretty_assertions::assert_eq;
use pulsepal_core::protocol::quantize::{
    cycles_to_seconds, seconds_to_cycles, steps_to_volts, volts_to_steps,
};
use pulsepal_core::protocol::{DacResolution, ProtocolError, MAX_CYCLES};

const EPSILON: f64 = 1e-9;

fn voltage_sweep() -> impl Iterator<Item = f64> {
    (-1000..=1000).map(|i| i as f64 / 100.0)
}

#[test]
fn test_voltage_steps_are_monotonic() {
    for dac in [DacResolution::EightBit, DacResolution::SixteenBit] {
        let mut previous = 0;
        for volts in voltage_sweep() {
            let steps = volts_to_steps(volts, dac).unwrap();
            assert!(steps >= previous, "{} V went backwards on {:?}", volts, dac);
            previous = steps;
        }
        assert_eq!(volts_to_steps(-10.0, dac).unwrap(), 0);
        assert_eq!(volts_to_steps(10.0, dac).unwrap(), dac.max_value());
    }
}

#[test]
fn test_voltage_step_is_never_below_request() {
    for dac in [DacResolution::EightBit, DacResolution::SixteenBit] {
        let step_size = 20.0 / dac.max_value() as f64;
        for volts in voltage_sweep() {
            let actual = steps_to_volts(volts_to_steps(volts, dac).unwrap(), dac);
            assert!(actual >= volts - EPSILON, "{} V -> {} V", volts, actual);
            assert!(actual < volts + step_size + EPSILON, "{} V -> {} V", volts, actual);
        }
    }
}

#[test]
fn test_voltage_limits() {
    for volts in [-10.0001, 10.0001, f64::NAN, f64::INFINITY] {
        assert!(matches!(
            volts_to_steps(volts, DacResolution::SixteenBit),
            Err(ProtocolError::VoltageOutOfRange(_))
        ));
    }
}

#[test]
fn test_times_land_on_nearest_cycle() {
    assert_eq!(seconds_to_cycles(0.0001).unwrap(), 2);
    assert_eq!(seconds_to_cycles(0.5).unwrap(), 10_000);
    assert_eq!(seconds_to_cycles(0.00011).unwrap(), 2);
    assert_eq!(seconds_to_cycles(0.000125).unwrap(), 3);
    assert_eq!(seconds_to_cycles(3600.0).unwrap(), MAX_CYCLES);

    let mut previous = 0;
    for i in 1..=2000 {
        let cycles = seconds_to_cycles(i as f64 * 0.0001).unwrap();
        assert!(cycles > previous);
        assert_eq!(cycles, 2 * i);
        previous = cycles;
    }
}

#[test]
fn test_time_round_trip_within_half_cycle() {
    for seconds in [0.0001, 0.00123, 0.75, 12.3456, 3599.99997] {
        let back = cycles_to_seconds(seconds_to_cycles(seconds).unwrap());
        assert!((back - seconds).abs() <= 0.5 / 20_000.0 + EPSILON);
    }
}
