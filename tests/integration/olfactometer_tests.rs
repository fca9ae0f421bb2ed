//! Integration tests for the register bank → drivers → hardware pipeline.
//!
//! Every test owns its own `IsrShared` block, so latched ADC frames and
//! input edges never leak between tests running in parallel.

use crate::mock_hw::{LogSink, MockHardware, PwmCall};

use olfactometer::app::events::AppEvent;
use olfactometer::app::ports::Line;
use olfactometer::app::service::Olfactometer;
use olfactometer::calibration::{FlowRange, DEFAULT_LOW_RANGE};
use olfactometer::config::DeviceConfig;
use olfactometer::drivers::pwm::{PwmDriver, CHANNELS};
use olfactometer::drivers::valves::{Valve, ValvePhase};
use olfactometer::error::{Error, ProtocolError, Result, ValidationError};
use olfactometer::isr::IsrShared;
use olfactometer::registers::{self, RegType};

// ── Register addresses used below ─────────────────────────────

const ENABLE_FLOW: u8 = 32;
const FLOWMETER: u8 = 33;
const DI0_STATE: u8 = 34;
const USER_CAL_0: u8 = 35;
const ENABLE_USER_CAL: u8 = 41;
const TARGET_0: u8 = 42;
const TARGET_3: u8 = 45;
const TARGET_4: u8 = 46;
const CHANNELS_TARGET: u8 = 47;
const ACTUAL_0: u8 = 48;
const FREQUENCY_0: u8 = 53;
const DUTY_0: u8 = 58;
const OUTPUT_SET: u8 = 63;
const OUTPUT_STATE: u8 = 66;
const ENABLE_PULSE: u8 = 67;
const VALVE_SET: u8 = 68;
const VALVE_STATE: u8 = 71;
const PULSE_VALVE0: u8 = 75;
const PULSE_CHECK0: u8 = 79;
const DO0_SYNC: u8 = 85;
const DI0_TRIGGER: u8 = 87;
const MIMIC_VALVE0: u8 = 88;
const EXTERNAL_CONTROL: u8 = 98;
const CHANNEL3_RANGE: u8 = 99;
const CHECK_SYNC: u8 = 100;
const TEMPERATURE: u8 = 101;
const ENABLE_TEMP_CAL: u8 = 102;
const TEMP_REFERENCE: u8 = 103;
const ENABLE_EVENTS: u8 = 104;

/// Ticks for the default scheduler to serve all five channels once.
const FULL_ROTATION: usize = 50;

// ── Helpers ───────────────────────────────────────────────────

fn booted(isr: &IsrShared, config: DeviceConfig) -> (Olfactometer<'_>, MockHardware, LogSink) {
    let mut app = Olfactometer::new(config, isr);
    let mut hw = MockHardware::new();
    let mut sink = LogSink::new();
    app.boot(&mut hw, &mut sink);
    (app, hw, sink)
}

fn write_u8(app: &mut Olfactometer<'_>, hw: &mut MockHardware, address: u8, v: u8) -> Result<()> {
    app.write(hw, address, RegType::U8, &[v], 1)
}

fn write_u16(app: &mut Olfactometer<'_>, hw: &mut MockHardware, address: u8, v: u16) -> Result<()> {
    app.write(hw, address, RegType::U16, &v.to_le_bytes(), 1)
}

fn write_f32(app: &mut Olfactometer<'_>, hw: &mut MockHardware, address: u8, v: f32) -> Result<()> {
    app.write(hw, address, RegType::Float, &v.to_le_bytes(), 1)
}

fn tick_n(app: &mut Olfactometer<'_>, hw: &mut MockHardware, sink: &mut LogSink, n: usize) {
    for _ in 0..n {
        app.tick(hw, sink);
    }
}

/// ADC frame with `code` on channel 0 and zero elsewhere.
fn frame_with_channel0(code: i16) -> [u8; 10] {
    let mut frame = [0_u8; 10];
    frame[..2].copy_from_slice(&code.to_be_bytes());
    frame
}

// ── Boot / reset ──────────────────────────────────────────────

#[test]
fn boot_configures_every_channel_stopped_and_closes_valves() {
    let isr = IsrShared::new();
    let (app, hw, sink) = booted(&isr, DeviceConfig::default());

    assert_eq!(sink.events, vec![AppEvent::Booted]);
    for ch in 0..CHANNELS {
        assert!(!app.pwm().is_running(ch));
        assert!(hw.pwm_calls.iter().any(
            |c| matches!(c, PwmCall::Configure { channel, .. } if *channel == ch)
        ));
    }
    assert!(!hw.pwm_calls.iter().any(|c| matches!(c, PwmCall::Start(_))));
    assert_eq!(app.pwm().timing(0).period, 12_800);
    assert!(Valve::ALL.iter().all(|v| !hw.level(Line::Valve(*v))));
    assert_eq!(app.target(0), 50.0);
    assert_eq!(app.frequency(2), 1500);
    assert_eq!(app.duty(4), 1.0);
}

#[test]
fn reset_restores_defaults_but_keeps_running_pwm() {
    let isr = IsrShared::new();
    let (mut app, mut hw, mut sink) = booted(&isr, DeviceConfig::default());

    write_u8(&mut app, &mut hw, ENABLE_FLOW, 1).unwrap();
    tick_n(&mut app, &mut hw, &mut sink, FULL_ROTATION);
    assert!(app.pwm().is_running(0));
    write_f32(&mut app, &mut hw, TARGET_0, 80.0).unwrap();
    write_u8(&mut app, &mut hw, ENABLE_EVENTS, 0).unwrap();

    app.reset_registers(&hw);

    assert_eq!(app.target(0), 50.0);
    assert_eq!(app.duty(0), 1.0);
    assert!(!app.flow_enabled());
    assert_eq!(app.read(&hw, ENABLE_EVENTS, RegType::U8).unwrap().as_slice(), &[0b111]);
    assert!(app.pwm().is_running(0));
}

#[test]
fn temperature_reference_comes_from_calibration_image() {
    let isr = IsrShared::new();
    let config = DeviceConfig::default();
    let mut app = Olfactometer::new(config.clone(), &isr);
    let mut hw = MockHardware::new();
    let mut sink = LogSink::new();
    hw.eeprom.insert(config.temperature_reference_address(), 22);
    app.boot(&mut hw, &mut sink);

    let payload = app.read(&hw, TEMP_REFERENCE, RegType::U8).unwrap();
    assert_eq!(payload.as_slice(), &[22]);
}

// ── Protocol errors ───────────────────────────────────────────

#[test]
fn malformed_accesses_are_protocol_errors() {
    let isr = IsrShared::new();
    let (mut app, mut hw, _sink) = booted(&isr, DeviceConfig::default());

    assert_eq!(
        app.write(&mut hw, 20, RegType::U8, &[0], 1),
        Err(Error::Protocol(ProtocolError::AddressOutOfRange(20)))
    );
    assert_eq!(
        app.write(&mut hw, TARGET_0, RegType::U8, &[0], 1),
        Err(Error::Protocol(ProtocolError::TypeMismatch))
    );
    assert_eq!(
        app.write(&mut hw, CHANNELS_TARGET, RegType::Float, &[0; 4], 1),
        Err(Error::Protocol(ProtocolError::ElementCount))
    );
    assert_eq!(
        app.write(&mut hw, ENABLE_FLOW, RegType::U8, &[1, 0], 1),
        Err(Error::Protocol(ProtocolError::ElementCount))
    );
    assert_eq!(
        app.read(&hw, TARGET_0, RegType::U16),
        Err(Error::Protocol(ProtocolError::TypeMismatch))
    );
    assert!(!app.flow_enabled());
}

#[test]
fn read_only_registers_reject_writes() {
    let isr = IsrShared::new();
    let (mut app, mut hw, _sink) = booted(&isr, DeviceConfig::default());

    assert_eq!(
        write_f32(&mut app, &mut hw, ACTUAL_0, 10.0),
        Err(Error::Validation(ValidationError::ReadOnly))
    );
    assert_eq!(
        write_u8(&mut app, &mut hw, TEMPERATURE, 30),
        Err(Error::Validation(ValidationError::ReadOnly))
    );
    assert_eq!(
        write_u8(&mut app, &mut hw, DI0_STATE, 1),
        Err(Error::Validation(ValidationError::ReadOnly))
    );
}

#[test]
fn unknown_enum_values_are_rejected() {
    let isr = IsrShared::new();
    let (mut app, mut hw, _sink) = booted(&isr, DeviceConfig::default());

    assert_eq!(
        write_u8(&mut app, &mut hw, DO0_SYNC, 2),
        Err(Error::Validation(ValidationError::InvalidEnum))
    );
    assert_eq!(
        write_u8(&mut app, &mut hw, CHANNEL3_RANGE, 7),
        Err(Error::Validation(ValidationError::InvalidEnum))
    );
    assert_eq!(app.channel3_range(), FlowRange::Low);
}

// ── Targets ───────────────────────────────────────────────────

#[test]
fn target_above_ceiling_is_clamped() {
    let isr = IsrShared::new();
    let (mut app, mut hw, _sink) = booted(&isr, DeviceConfig::default());

    write_f32(&mut app, &mut hw, TARGET_0, 150.0).unwrap();
    assert_eq!(app.target(0), 110.0);
    write_f32(&mut app, &mut hw, TARGET_4, 1500.0).unwrap();
    assert_eq!(app.target(4), 1100.0);

    let payload = app.read(&hw, TARGET_0, RegType::Float).unwrap();
    assert_eq!(payload, registers::encode_f32s(&[110.0]));
}

#[test]
fn negative_or_nan_target_is_rejected() {
    let isr = IsrShared::new();
    let (mut app, mut hw, _sink) = booted(&isr, DeviceConfig::default());

    for bad in [-1.0, f32::NAN, f32::INFINITY] {
        assert_eq!(
            write_f32(&mut app, &mut hw, TARGET_0, bad),
            Err(Error::Validation(ValidationError::InvalidTarget))
        );
    }
    assert_eq!(app.target(0), 50.0);
}

#[test]
fn bulk_targets_clamp_per_channel_and_reject_as_a_whole() {
    let isr = IsrShared::new();
    let (mut app, mut hw, _sink) = booted(&isr, DeviceConfig::default());

    let data: Vec<u8> = [10.0_f32, 20.0, 30.0, 40.0, 2000.0]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    app.write(&mut hw, CHANNELS_TARGET, RegType::Float, &data, 5).unwrap();
    assert_eq!(
        (0..CHANNELS).map(|ch| app.target(ch)).collect::<Vec<_>>(),
        vec![10.0, 20.0, 30.0, 40.0, 1100.0]
    );

    let bad: Vec<u8> = [1.0_f32, 2.0, -3.0, 4.0, 5.0]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    assert_eq!(
        app.write(&mut hw, CHANNELS_TARGET, RegType::Float, &bad, 5),
        Err(Error::Validation(ValidationError::InvalidTarget))
    );
    assert_eq!(app.target(0), 10.0);
}

#[test]
fn identical_writes_are_idempotent() {
    let isr = IsrShared::new();
    let (mut app, mut hw, _sink) = booted(&isr, DeviceConfig::default());

    write_f32(&mut app, &mut hw, TARGET_0, 60.0).unwrap();
    write_u16(&mut app, &mut hw, VALVE_SET, 0x0003).unwrap();
    let target = app.read(&hw, TARGET_0, RegType::Float).unwrap();
    let valves = app.read(&hw, VALVE_STATE, RegType::U16).unwrap();

    write_f32(&mut app, &mut hw, TARGET_0, 60.0).unwrap();
    write_u16(&mut app, &mut hw, VALVE_SET, 0x0003).unwrap();
    assert_eq!(app.read(&hw, TARGET_0, RegType::Float).unwrap(), target);
    assert_eq!(app.read(&hw, VALVE_STATE, RegType::U16).unwrap(), valves);
    assert_eq!(valves, registers::encode_u16s(&[0x0003]));
}

// ── Channel 3 range ───────────────────────────────────────────

#[test]
fn range_switch_reclamps_channel3_target() {
    let isr = IsrShared::new();
    let (mut app, mut hw, _sink) = booted(&isr, DeviceConfig::default());

    write_u8(&mut app, &mut hw, CHANNEL3_RANGE, 1).unwrap();
    write_f32(&mut app, &mut hw, TARGET_3, 1000.0).unwrap();
    assert_eq!(app.target(3), 1000.0);

    write_u8(&mut app, &mut hw, CHANNEL3_RANGE, 0).unwrap();
    assert_eq!(app.channel3_range(), FlowRange::Low);
    assert_eq!(app.target(3), 110.0);
}

#[test]
fn range_switch_reloads_only_channel3_calibration() {
    let isr = IsrShared::new();
    let config = DeviceConfig::default();
    let (mut app, mut hw, _sink) = booted(&isr, config.clone());

    let custom = [4000, 5000, 6000, 7000, 8000, 9000, 10000, 11000, 12000, 13000, 14000];
    hw.store_table(config.calibration_address(3, true), &custom);
    hw.store_table(config.calibration_address(0, false), &custom);

    write_u8(&mut app, &mut hw, CHANNEL3_RANGE, 1).unwrap();
    assert_eq!(app.factory().channel3_high, custom);
    assert_eq!(app.factory().channels[0], DEFAULT_LOW_RANGE);
    assert_eq!(app.table(3).codes, custom);
    assert_eq!(app.table(3).range, FlowRange::High);
}

// ── Frequency / duty ──────────────────────────────────────────

#[test]
fn frequency_out_of_range_keeps_previous_value() {
    let isr = IsrShared::new();
    let (mut app, mut hw, _sink) = booted(&isr, DeviceConfig::default());

    assert_eq!(
        write_u16(&mut app, &mut hw, FREQUENCY_0, 50),
        Err(Error::Validation(ValidationError::FrequencyOutOfRange))
    );
    assert_eq!(app.frequency(0), 2500);

    write_u16(&mut app, &mut hw, FREQUENCY_0, 1000).unwrap();
    assert_eq!(app.frequency(0), 1000);
    assert_eq!(app.pwm().timing(0).period, 32_000);
}

#[test]
fn duty_outside_open_interval_is_rejected() {
    let isr = IsrShared::new();
    let (mut app, mut hw, _sink) = booted(&isr, DeviceConfig::default());

    for bad in [0.05, 0.1, 99.9, 120.0] {
        assert_eq!(
            write_f32(&mut app, &mut hw, DUTY_0, bad),
            Err(Error::Validation(ValidationError::DutyOutOfRange))
        );
    }
    write_f32(&mut app, &mut hw, DUTY_0, 50.0).unwrap();
    assert_eq!(app.duty(0), 50.0);
    // Channel stopped: compare goes straight to the timer.
    assert_eq!(hw.last_compare(0), Some(6400));
    assert!(!app.pwm().is_running(0));
}

// ── Controller ────────────────────────────────────────────────

#[test]
fn controller_step_moves_duty_toward_target() {
    let isr = IsrShared::new();
    let (mut app, mut hw, mut sink) = booted(&isr, DeviceConfig::default());

    write_f32(&mut app, &mut hw, TARGET_0, 60.0).unwrap();
    write_u8(&mut app, &mut hw, ENABLE_FLOW, 1).unwrap();
    isr.adc.store_frame(&frame_with_channel0(5284));

    // Channels 1 to 4 are served first; channel 0 closes the rotation.
    tick_n(&mut app, &mut hw, &mut sink, FULL_ROTATION - 1);
    assert_eq!(app.duty(0), 1.0);

    app.tick(&mut hw, &mut sink);
    assert_eq!(app.actual_flow(0), 50.0);
    assert_eq!(app.duty(0), 1.3125);
    assert!(app.pwm().is_running(0));
    assert_eq!(hw.last_compare(0), Some(168));
    assert_eq!(hw.convst_pulses, 25);

    assert_eq!(
        sink.register_events(FLOWMETER),
        vec![registers::encode_i16s(&[5284, 0, 0, 0, 0])]
    );
    assert_eq!(
        sink.register_events(ACTUAL_0),
        vec![registers::encode_f32s(&[50.0])]
    );
}

#[test]
fn controller_skips_when_flow_disabled() {
    let isr = IsrShared::new();
    let (mut app, mut hw, mut sink) = booted(&isr, DeviceConfig::default());

    isr.adc.store_frame(&frame_with_channel0(5284));
    tick_n(&mut app, &mut hw, &mut sink, FULL_ROTATION);

    assert_eq!(app.duty(0), 1.0);
    assert_eq!(hw.convst_pulses, 0);
    assert!(sink.register_events(FLOWMETER).is_empty());
    assert!(sink.register_events(ACTUAL_0).is_empty());
}

#[test]
fn acquisition_restarts_with_channel_one_after_enable() {
    let isr = IsrShared::new();
    let (mut app, mut hw, mut sink) = booted(&isr, DeviceConfig::default());

    write_u8(&mut app, &mut hw, ENABLE_FLOW, 1).unwrap();
    tick_n(&mut app, &mut hw, &mut sink, 7);
    write_u8(&mut app, &mut hw, ENABLE_FLOW, 0).unwrap();
    tick_n(&mut app, &mut hw, &mut sink, 20);
    assert_eq!(hw.convst_pulses, 3);

    write_u8(&mut app, &mut hw, ENABLE_FLOW, 1).unwrap();
    tick_n(&mut app, &mut hw, &mut sink, 10);
    assert_eq!(hw.convst_pulses, 8);
    assert!(app.pwm().is_running(1));
    assert!(!app.pwm().is_running(0));
}

#[test]
fn duty_change_on_running_channel_waits_for_rollover() {
    let isr = IsrShared::new();
    let (mut app, mut hw, mut sink) = booted(&isr, DeviceConfig::default());

    write_u8(&mut app, &mut hw, ENABLE_FLOW, 1).unwrap();
    tick_n(&mut app, &mut hw, &mut sink, FULL_ROTATION);
    assert!(app.pwm().is_running(0));
    let before = hw.last_compare(0);

    write_f32(&mut app, &mut hw, DUTY_0, 50.0).unwrap();
    assert!(isr.duty.is_pending(0));
    assert_eq!(hw.last_compare(0), before);

    PwmDriver::on_rollover(0, &isr.duty, &mut hw);
    assert_eq!(hw.last_compare(0), Some(6400));
    assert!(!isr.duty.is_pending(0));
}

#[test]
fn staged_duty_does_not_survive_flow_restart() {
    let isr = IsrShared::new();
    let (mut app, mut hw, mut sink) = booted(&isr, DeviceConfig::default());
    // Actual flow equals the default target, so the controller holds 1 %.
    isr.adc.store_frame(&frame_with_channel0(5284));

    write_u8(&mut app, &mut hw, ENABLE_FLOW, 1).unwrap();
    tick_n(&mut app, &mut hw, &mut sink, FULL_ROTATION);
    assert!(app.pwm().is_running(0));
    write_f32(&mut app, &mut hw, DUTY_0, 50.0).unwrap();
    assert!(isr.duty.is_pending(0));

    write_u8(&mut app, &mut hw, ENABLE_FLOW, 0).unwrap();
    assert!(!isr.duty.is_pending(0));

    write_u8(&mut app, &mut hw, ENABLE_FLOW, 1).unwrap();
    tick_n(&mut app, &mut hw, &mut sink, FULL_ROTATION);
    assert!(app.pwm().is_running(0));
    PwmDriver::on_rollover(0, &isr.duty, &mut hw);

    assert_eq!(app.duty(0), 1.0);
    assert_eq!(hw.last_compare(0), Some(128));
}

#[test]
fn disabling_flow_stops_pwm_and_closes_odor_and_end_valves() {
    let isr = IsrShared::new();
    let (mut app, mut hw, mut sink) = booted(&isr, DeviceConfig::default());

    write_u8(&mut app, &mut hw, ENABLE_FLOW, 1).unwrap();
    tick_n(&mut app, &mut hw, &mut sink, FULL_ROTATION);
    assert!(app.pwm().is_running(0));
    let mask = Valve::Valve0.mask() | Valve::EndValve0.mask() | Valve::CheckValve0.mask();
    write_u16(&mut app, &mut hw, VALVE_SET, mask).unwrap();

    write_u8(&mut app, &mut hw, ENABLE_FLOW, 0).unwrap();

    assert!(!app.flow_enabled());
    assert!((0..CHANNELS).all(|ch| !app.pwm().is_running(ch)));
    assert!((0..CHANNELS).all(|ch| app.duty(ch) == 1.0));
    assert!(!hw.level(Line::Valve(Valve::Valve0)));
    assert!(!hw.level(Line::Valve(Valve::EndValve0)));
    assert!(hw.level(Line::Valve(Valve::CheckValve0)));
}

#[test]
fn start_synced_output_follows_enable_flow() {
    let isr = IsrShared::new();
    let (mut app, mut hw, _sink) = booted(&isr, DeviceConfig::default());

    write_u8(&mut app, &mut hw, DO0_SYNC, 1).unwrap();
    write_u8(&mut app, &mut hw, ENABLE_FLOW, 1).unwrap();
    assert!(hw.level(Line::Out0));

    // Software writes don't touch a Start-synced output.
    write_u8(&mut app, &mut hw, OUTPUT_SET, 0b11).unwrap();
    assert!(hw.level(Line::Out1));
    app.standby(&mut hw);
    assert!(!hw.level(Line::Out0));
    assert!(hw.level(Line::Out1));

    let state = app.read(&hw, OUTPUT_STATE, RegType::U8).unwrap();
    assert_eq!(state.as_slice(), &[0b10]);
}

// ── Valves ────────────────────────────────────────────────────

#[test]
fn pulsed_valve_closes_after_duration_plus_one_ticks() {
    let isr = IsrShared::new();
    let (mut app, mut hw, mut sink) = booted(&isr, DeviceConfig::default());

    write_u16(&mut app, &mut hw, ENABLE_PULSE, Valve::Valve0.mask()).unwrap();
    write_u16(&mut app, &mut hw, PULSE_VALVE0, 3).unwrap();
    write_u16(&mut app, &mut hw, VALVE_SET, Valve::Valve0.mask()).unwrap();
    assert_eq!(app.valves().phase(Valve::Valve0), ValvePhase::Pulsing(4));

    tick_n(&mut app, &mut hw, &mut sink, 3);
    assert!(hw.level(Line::Valve(Valve::Valve0)));
    assert_eq!(app.valves().countdown(Valve::Valve0), 1);

    app.tick(&mut hw, &mut sink);
    assert!(!hw.level(Line::Valve(Valve::Valve0)));
    assert_eq!(app.valves().countdown(Valve::Valve0), 0);
}

#[test]
fn zero_duration_is_rejected() {
    let isr = IsrShared::new();
    let (mut app, mut hw, _sink) = booted(&isr, DeviceConfig::default());

    write_u16(&mut app, &mut hw, PULSE_VALVE0, 20).unwrap();
    assert_eq!(
        write_u16(&mut app, &mut hw, PULSE_VALVE0, 0),
        Err(Error::Validation(ValidationError::ZeroDuration))
    );
    assert_eq!(app.valves().duration(Valve::Valve0), 20);
}

#[test]
fn synced_check_valve_follows_odor_valve_after_delay() {
    let isr = IsrShared::new();
    let (mut app, mut hw, mut sink) = booted(&isr, DeviceConfig::default());

    write_u8(&mut app, &mut hw, CHECK_SYNC, 0b0001).unwrap();
    write_u16(&mut app, &mut hw, PULSE_CHECK0, 2).unwrap();
    write_u16(&mut app, &mut hw, VALVE_SET, Valve::Valve0.mask()).unwrap();

    tick_n(&mut app, &mut hw, &mut sink, 2);
    assert!(!hw.level(Line::Valve(Valve::CheckValve0)));
    app.tick(&mut hw, &mut sink);
    assert!(hw.level(Line::Valve(Valve::CheckValve0)));
}

#[test]
fn mimic_drives_digital_output_with_valve() {
    let isr = IsrShared::new();
    let (mut app, mut hw, _sink) = booted(&isr, DeviceConfig::default());

    write_u8(&mut app, &mut hw, MIMIC_VALVE0, 2).unwrap();
    write_u16(&mut app, &mut hw, VALVE_SET, Valve::Valve0.mask()).unwrap();
    assert!(hw.level(Line::Out1));
}

#[test]
fn fault_shutdown_forces_everything_low() {
    let isr = IsrShared::new();
    let (mut app, mut hw, mut sink) = booted(&isr, DeviceConfig::default());

    write_u8(&mut app, &mut hw, ENABLE_FLOW, 1).unwrap();
    tick_n(&mut app, &mut hw, &mut sink, FULL_ROTATION);
    write_u16(&mut app, &mut hw, VALVE_SET, 0x0F3F).unwrap();
    write_u8(&mut app, &mut hw, OUTPUT_SET, 0b11).unwrap();

    app.fault_shutdown(&mut hw, &mut sink);

    assert!(!app.flow_enabled());
    assert!((0..CHANNELS).all(|ch| !app.pwm().is_running(ch)));
    assert!(Valve::ALL.iter().all(|v| !hw.level(Line::Valve(*v))));
    assert!(!hw.level(Line::Out0) && !hw.level(Line::Out1));
    assert_eq!(sink.events.last(), Some(&AppEvent::FaultShutdown));
}

// ── Inputs ────────────────────────────────────────────────────

#[test]
fn di0_edges_start_and_stop_flow() {
    let isr = IsrShared::new();
    let (mut app, mut hw, mut sink) = booted(&isr, DeviceConfig::default());

    write_u8(&mut app, &mut hw, DI0_TRIGGER, 1).unwrap();
    isr.inputs.record_di0(true);
    app.tick(&mut hw, &mut sink);
    assert!(app.flow_enabled());

    isr.inputs.record_di0(false);
    app.tick(&mut hw, &mut sink);
    assert!(!app.flow_enabled());

    assert_eq!(
        sink.register_events(DI0_STATE),
        vec![registers::encode_u8(1), registers::encode_u8(0)]
    );
}

#[test]
fn di0_valve_toggle_drives_end_valves() {
    let isr = IsrShared::new();
    let (mut app, mut hw, mut sink) = booted(&isr, DeviceConfig::default());

    write_u8(&mut app, &mut hw, DI0_TRIGGER, 2).unwrap();
    isr.inputs.record_di0(true);
    app.tick(&mut hw, &mut sink);
    assert!(hw.level(Line::Valve(Valve::EndValve0)));
    assert!(hw.level(Line::Valve(Valve::EndValve1)));

    isr.inputs.record_di0(false);
    app.tick(&mut hw, &mut sink);
    assert!(!hw.level(Line::Valve(Valve::EndValve0)));
}

#[test]
fn external_control_applies_pin_mask_only_when_enabled() {
    let isr = IsrShared::new();
    let (mut app, mut hw, mut sink) = booted(&isr, DeviceConfig::default());

    isr.inputs.record_external(0b01_0001);
    app.tick(&mut hw, &mut sink);
    assert!(!hw.level(Line::Valve(Valve::Valve0)));

    write_u8(&mut app, &mut hw, EXTERNAL_CONTROL, 1).unwrap();
    isr.inputs.record_external(0b01_0001);
    app.tick(&mut hw, &mut sink);
    assert!(hw.level(Line::Valve(Valve::Valve0)));
    assert!(hw.level(Line::Valve(Valve::EndValve0)));
    assert!(!hw.level(Line::Valve(Valve::Valve1)));
}

#[test]
fn disabled_events_are_not_emitted() {
    let isr = IsrShared::new();
    let (mut app, mut hw, mut sink) = booted(&isr, DeviceConfig::default());

    write_u8(&mut app, &mut hw, ENABLE_EVENTS, 0).unwrap();
    isr.adc.store_frame(&frame_with_channel0(1000));
    isr.inputs.record_di0(true);
    app.tick(&mut hw, &mut sink);

    assert_eq!(sink.events, vec![AppEvent::Booted]);
}

// ── Calibration ───────────────────────────────────────────────

#[test]
fn user_calibration_must_be_monotonic() {
    let isr = IsrShared::new();
    let (mut app, mut hw, _sink) = booted(&isr, DeviceConfig::default());

    let mut codes = [1000_u16, 2000, 3000, 4000, 5000, 6000, 7000, 8000, 9000, 10000, 11000];
    let data: Vec<u8> = codes.iter().flat_map(|c| c.to_le_bytes()).collect();
    app.write(&mut hw, USER_CAL_0, RegType::U16, &data, 11).unwrap();
    write_u8(&mut app, &mut hw, ENABLE_USER_CAL, 1).unwrap();
    assert_eq!(app.table(0).codes, codes);
    assert_eq!(app.flow_for(0, 5000), 50.0);

    codes[3] = 500;
    let data: Vec<u8> = codes.iter().flat_map(|c| c.to_le_bytes()).collect();
    assert_eq!(
        app.write(&mut hw, USER_CAL_0, RegType::U16, &data, 11),
        Err(Error::Validation(ValidationError::NonMonotonicCalibration))
    );
    assert_eq!(app.table(0).codes[3], 4000);
}

#[test]
fn temperature_correction_shifts_lookup() {
    let isr = IsrShared::new();
    let (mut app, mut hw, _sink) = booted(&isr, DeviceConfig::default());

    app.update_temperature(30);
    assert_eq!(app.flow_for(0, 5284), 50.0);

    write_u8(&mut app, &mut hw, ENABLE_TEMP_CAL, 1).unwrap();
    let corrected = app.flow_for(0, 5284);
    assert!(corrected > 50.0 && corrected < 51.0, "got {corrected}");

    let payload = app.read(&hw, TEMPERATURE, RegType::U8).unwrap();
    assert_eq!(payload.as_slice(), &[30]);
}

// ── MFC link ──────────────────────────────────────────────────

#[test]
fn target_changes_send_mfc_frames_when_linked() {
    let isr = IsrShared::new();
    let config = DeviceConfig {
        mfc_link: true,
        ..DeviceConfig::default()
    };
    let (mut app, mut hw, _sink) = booted(&isr, config);
    assert!(hw.mfc_frames.is_empty());

    write_f32(&mut app, &mut hw, TARGET_0, 40.0).unwrap();
    write_f32(&mut app, &mut hw, TARGET_4, 500.0).unwrap();
    assert_eq!(hw.mfc_frames, vec!["AS 040.0\r", "ES 000.500\r"]);
}

#[test]
fn unchanged_target_sends_no_mfc_frame() {
    let isr = IsrShared::new();
    let config = DeviceConfig {
        mfc_link: true,
        ..DeviceConfig::default()
    };
    let (mut app, mut hw, _sink) = booted(&isr, config);

    write_f32(&mut app, &mut hw, TARGET_0, 40.0).unwrap();
    write_f32(&mut app, &mut hw, TARGET_0, 40.0).unwrap();
    // Clamps to the same ceiling as the first write.
    write_f32(&mut app, &mut hw, TARGET_3, 900.0).unwrap();
    write_f32(&mut app, &mut hw, TARGET_3, 700.0).unwrap();
    assert_eq!(hw.mfc_frames.len(), 2);

    // A range switch resends channel 3 in the new format.
    write_u8(&mut app, &mut hw, CHANNEL3_RANGE, 1).unwrap();
    assert_eq!(hw.mfc_frames.len(), 3);
}

#[test]
fn no_mfc_frames_without_link() {
    let isr = IsrShared::new();
    let (mut app, mut hw, _sink) = booted(&isr, DeviceConfig::default());

    write_f32(&mut app, &mut hw, TARGET_0, 50.0).unwrap();
    assert!(hw.mfc_frames.is_empty());
}
