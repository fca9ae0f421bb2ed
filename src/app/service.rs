//! Application service — the register bank and everything behind it.
//!
//! [`Olfactometer`] owns every register value, the PWM and valve
//! drivers, the flow scheduler and the calibration tables.  Host reads
//! and writes arrive through [`read`](Olfactometer::read) and
//! [`write`](Olfactometer::write); the 1 ms timer drives
//! [`tick`](Olfactometer::tick).  All I/O flows through port traits
//! injected at call sites, so the whole service runs against mocks.
//!
//! ```text
//!   host ──▶ read / write ──┐
//!                           ▼
//!   1 ms ──▶ tick ──▶ ┌──────────────────────────┐ ──▶ EventSink
//!                     │       Olfactometer       │
//!   IsrShared ──────▶ │ registers · PWM · valves │ ──▶ Hardware
//!                     │ scheduler · calibration  │
//!                     └──────────────────────────┘
//! ```

use log::{debug, error, info, warn};

use crate::calibration::{
    self, CalibrationTable, FactoryCalibration, FlowRange, DEFAULT_HIGH_RANGE, DEFAULT_LOW_RANGE,
};
use crate::config::DeviceConfig;
use crate::control::flow::{next_duty, FlowScheduler};
use crate::drivers::digital_io::{Di0Trigger, DoSync, MimicTarget, DO0, DO1};
use crate::drivers::pwm::{PwmDriver, CHANNELS};
use crate::drivers::valves::{Valve, ValveBank, CHECK_MASK, END_MASK, ODOR_MASK, VALVE_MASK};
use crate::error::{ProtocolError, Result, ValidationError};
use crate::isr::IsrShared;
use crate::mfc;
use crate::registers::{self, Payload, RegType, Register};

use super::events::AppEvent;
use super::ports::{EepromPort, EventSink, Hardware, Line, LinePort};

/// EnableEvents bit: FlowmeterAnalogOutputs on every ADC frame.
pub const EVENT_FLOWMETER: u8 = 0b001;
/// EnableEvents bit: Di0State on every DI0 edge.
pub const EVENT_DI0: u8 = 0b010;
/// EnableEvents bit: ActualFlow on every controller step.
pub const EVENT_ACTUAL_FLOW: u8 = 0b100;

const DEFAULT_TARGET: f32 = 50.0;
const DEFAULT_FREQUENCIES: [u16; CHANNELS] = [2500, 2500, 1500, 1500, 1500];
const DEFAULT_DUTY: f32 = 1.0;

/// Digital outputs with their register bit and sync slot.
const OUTPUTS: [(u8, Line, usize); 2] = [(DO0, Line::Out0, 0), (DO1, Line::Out1, 1)];

// ───────────────────────────────────────────────────────────────
// Olfactometer
// ───────────────────────────────────────────────────────────────

pub struct Olfactometer<'a> {
    config: DeviceConfig,
    isr: &'a IsrShared,

    // ── Flow channels ──
    targets: [f32; CHANNELS],
    actual: [f32; CHANNELS],
    frequency: [u16; CHANNELS],
    duty: [f32; CHANNELS],
    flow_enabled: bool,

    // ── Calibration ──
    user_tables: [[u16; calibration::BREAKPOINTS]; CHANNELS],
    user_aux: [u16; calibration::BREAKPOINTS],
    user_calibration: bool,
    factory: FactoryCalibration,
    channel3_range: FlowRange,

    // ── Drivers ──
    pwm: PwmDriver,
    valves: ValveBank,
    scheduler: FlowScheduler,

    // ── Digital I/O ──
    do_sync: [DoSync; 2],
    output_set: u8,
    output_clear: u8,
    output_toggle: u8,
    di0_trigger: Di0Trigger,
    di0_level: bool,
    external_control: bool,

    // Last values written to the valve command registers.
    valve_set: u16,
    valve_clear: u16,
    valve_toggle: u16,

    // ── Temperature ──
    temperature: Option<u8>,
    temperature_calibration: bool,
    temperature_reference: u8,

    events: u8,
}

impl<'a> Olfactometer<'a> {
    /// Build the service with every register at its default.
    ///
    /// Does **not** touch hardware; call [`boot`](Self::boot) next.
    pub fn new(config: DeviceConfig, isr: &'a IsrShared) -> Self {
        let factory = FactoryCalibration::default();
        Self {
            pwm: PwmDriver::new(config.system_clock_hz),
            scheduler: FlowScheduler::new(config.sampling_divider, config.control_period_cycles),
            temperature_reference: factory.temperature_reference,
            config,
            isr,
            targets: [DEFAULT_TARGET; CHANNELS],
            actual: [0.0; CHANNELS],
            frequency: DEFAULT_FREQUENCIES,
            duty: [DEFAULT_DUTY; CHANNELS],
            flow_enabled: false,
            user_tables: [
                DEFAULT_LOW_RANGE,
                DEFAULT_LOW_RANGE,
                DEFAULT_LOW_RANGE,
                DEFAULT_LOW_RANGE,
                DEFAULT_HIGH_RANGE,
            ],
            user_aux: DEFAULT_HIGH_RANGE,
            user_calibration: false,
            factory,
            channel3_range: FlowRange::Low,
            valves: ValveBank::new(),
            do_sync: [DoSync::Software; 2],
            output_set: 0,
            output_clear: 0,
            output_toggle: 0,
            di0_trigger: Di0Trigger::Sync,
            di0_level: false,
            external_control: false,
            valve_set: 0,
            valve_clear: 0,
            valve_toggle: 0,
            temperature: None,
            temperature_calibration: false,
            events: EVENT_FLOWMETER | EVENT_DI0 | EVENT_ACTUAL_FLOW,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Reset every register, load calibration and bring the outputs to
    /// their idle state.
    pub fn boot(&mut self, hw: &mut impl Hardware, sink: &mut impl EventSink) {
        self.reset_registers(&*hw);
        self.registers_reinitialized(hw);
        sink.emit(&AppEvent::Booted);
        info!("olfactometer: booted");
    }

    /// Restore register defaults and reload factory calibration.
    ///
    /// PWM run state and the last temperature reading survive; the lines
    /// are left alone until [`registers_reinitialized`](Self::registers_reinitialized).
    pub fn reset_registers(&mut self, eeprom: &impl EepromPort) {
        let pwm = core::mem::replace(&mut self.pwm, PwmDriver::new(self.config.system_clock_hz));
        let temperature = self.temperature;
        *self = Self::new(self.config.clone(), self.isr);
        self.pwm = pwm;
        self.temperature = temperature;

        self.factory = FactoryCalibration::load(eeprom, &self.config);
        self.temperature_reference = self.factory.temperature_reference;
    }

    /// Push the current register values out to the hardware: recompute
    /// every PWM period, leave all channels stopped, close every valve and
    /// re-apply outputs and the channel 3 range.
    pub fn registers_reinitialized(&mut self, hw: &mut impl Hardware) {
        for ch in 0..CHANNELS {
            let (hz, duty) = (self.frequency[ch], self.duty[ch]);
            if let Err(e) = self.pwm.set_frequency(ch, hz, duty, hw, &self.isr.duty) {
                warn!("olfactometer: channel {} frequency {}: {}", ch, hz, e);
            }
        }
        self.pwm.stop_all(hw, &self.isr.duty);

        self.valves.close_all(hw);
        for (_, line, slot) in OUTPUTS {
            let level = self.do_sync[slot] == DoSync::Start && self.flow_enabled;
            hw.set_line(line, level);
        }
        hw.set_line(Line::AdcConvst, false);

        self.factory.reload_channel3(&*hw, &self.config, self.channel3_range);
        self.scheduler.reset();
    }

    /// Stop every timer and drive every valve and output low.
    pub fn fault_shutdown(&mut self, hw: &mut impl Hardware, sink: &mut impl EventSink) {
        self.flow_enabled = false;
        self.pwm.stop_all(hw, &self.isr.duty);
        self.valves.close_all(hw);
        hw.set_line(Line::Out0, false);
        hw.set_line(Line::Out1, false);
        self.scheduler.reset();
        sink.emit(&AppEvent::FaultShutdown);
        error!("olfactometer: fault shutdown, all outputs low");
    }

    /// Disable flow as if the host had written EnableFlow = 0.
    pub fn standby(&mut self, hw: &mut impl Hardware) {
        self.set_enable_flow(0, hw);
    }

    /// Latest reading from the temperature sensor (°C).
    pub fn update_temperature(&mut self, celsius: u8) {
        self.temperature = Some(celsius);
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// One 1 ms step: service latched inputs and advance the valve
    /// countdowns.  With flow enabled, also trigger conversions and run a
    /// controller step when due.
    pub fn tick(&mut self, hw: &mut impl Hardware, sink: &mut impl EventSink) {
        if let Some(level) = self.isr.inputs.take_di0() {
            self.on_di0(level, hw, sink);
        }

        if let Some(pins) = self.isr.inputs.take_external() {
            if self.external_control {
                self.valves.apply_state(u16::from(pins), ODOR_MASK | END_MASK, hw);
            }
        }

        let fresh = self.isr.adc.take_fresh();
        if fresh && self.flow_enabled && self.events & EVENT_FLOWMETER != 0 {
            emit_register(
                sink,
                Register::FlowmeterAnalogOutputs,
                registers::encode_i16s(&self.isr.adc.codes()),
            );
        }

        self.valves.tick(hw);

        // Acquisition and control only run while flow is enabled.
        if !self.flow_enabled {
            return;
        }
        let step = self.scheduler.tick();
        if step.convert {
            hw.set_line(Line::AdcConvst, true);
            hw.set_line(Line::AdcConvst, false);
        }
        if let Some(ch) = step.control {
            self.control_step(ch, hw, sink);
        }
    }

    fn on_di0(&mut self, level: bool, hw: &mut impl Hardware, sink: &mut impl EventSink) {
        self.di0_level = level;
        if self.events & EVENT_DI0 != 0 {
            emit_register(sink, Register::Di0State, registers::encode_u8(u8::from(level)));
        }
        match self.di0_trigger {
            Di0Trigger::Sync => {}
            Di0Trigger::RiseStartFallStop => self.set_enable_flow(u8::from(level), hw),
            Di0Trigger::ValveToggle => {
                for valve in [Valve::EndValve0, Valve::EndValve1] {
                    if level {
                        self.valves.set(valve, hw);
                    } else {
                        self.valves.clear(valve, hw);
                    }
                }
            }
        }
    }

    fn control_step(&mut self, ch: usize, hw: &mut impl Hardware, sink: &mut impl EventSink) {
        if !self.flow_enabled || self.targets[ch] == 0.0 {
            return;
        }
        let raw = i32::from(self.isr.adc.code(ch));
        let actual = self.flow_for(ch, raw);
        self.actual[ch] = actual;
        if self.events & EVENT_ACTUAL_FLOW != 0 {
            emit_register(sink, Register::ActualFlow(ch), registers::encode_f32s(&[actual]));
        }

        let duty = next_duty(
            self.duty[ch],
            self.targets[ch],
            actual,
            self.config.gains[ch],
            self.config.duty_floor,
            self.config.duty_ceiling,
        );
        self.apply_duty(ch, duty, hw);
    }

    // ── Register access ───────────────────────────────────────

    /// Format a register for the host.
    pub fn read(&self, hw: &impl LinePort, address: u8, ty: RegType) -> Result<Payload> {
        let reg = Register::from_address(address)?;
        if reg.reg_type() != ty {
            return Err(ProtocolError::TypeMismatch.into());
        }

        let levels = self.valves.levels(hw);
        let payload = match reg {
            Register::EnableFlow => registers::encode_u8(u8::from(self.flow_enabled)),
            Register::FlowmeterAnalogOutputs => registers::encode_i16s(&self.isr.adc.codes()),
            Register::Di0State => registers::encode_u8(u8::from(self.di0_level)),
            Register::UserCalibration(ch) => registers::encode_u16s(&self.user_tables[ch]),
            Register::UserCalibrationAux => registers::encode_u16s(&self.user_aux),
            Register::EnableUserCalibration => registers::encode_u8(u8::from(self.user_calibration)),
            Register::TargetFlow(ch) => registers::encode_f32s(&[self.targets[ch]]),
            Register::ChannelsTargetFlow => registers::encode_f32s(&self.targets),
            Register::ActualFlow(ch) => registers::encode_f32s(&[self.actual[ch]]),
            Register::Frequency(ch) => registers::encode_u16s(&[self.frequency[ch]]),
            Register::DutyCycle(ch) => registers::encode_f32s(&[self.duty[ch]]),
            Register::OutputSet => registers::encode_u8(self.output_set),
            Register::OutputClear => registers::encode_u8(self.output_clear),
            Register::OutputToggle => registers::encode_u8(self.output_toggle),
            Register::OutputState => registers::encode_u8(output_levels(hw)),
            Register::EnableValvePulse => registers::encode_u16s(&[self.valves.pulse_mask()]),
            Register::ValveSet => registers::encode_u16s(&[self.valve_set]),
            Register::ValveClear => registers::encode_u16s(&[self.valve_clear]),
            Register::ValveToggle => registers::encode_u16s(&[self.valve_toggle]),
            Register::ValveState => registers::encode_u16s(&[levels]),
            Register::OdorValveState => registers::encode_u8((levels & ODOR_MASK) as u8),
            Register::EndValveState => registers::encode_u8(((levels & END_MASK) >> 4) as u8),
            Register::CheckValveState => registers::encode_u8(((levels & CHECK_MASK) >> 8) as u8),
            Register::PulseDuration(valve) => registers::encode_u16s(&[self.valves.duration(valve)]),
            Register::DoSync(n) => registers::encode_u8(self.do_sync[n] as u8),
            Register::Di0Trigger => registers::encode_u8(self.di0_trigger as u8),
            Register::Mimic(valve) => registers::encode_u8(self.valves.mimic(valve) as u8),
            Register::EnableValveExternalControl => {
                registers::encode_u8(u8::from(self.external_control))
            }
            Register::Channel3Range => registers::encode_u8(self.channel3_range as u8),
            Register::EnableCheckValveSync => registers::encode_u8(self.valves.sync_mask()),
            Register::TemperatureValue => registers::encode_u8(self.temperature.unwrap_or(0)),
            Register::EnableTemperatureCalibration => {
                registers::encode_u8(u8::from(self.temperature_calibration))
            }
            Register::TemperatureCalibrationValue => {
                registers::encode_u8(self.temperature_reference)
            }
            Register::EnableEvents => registers::encode_u8(self.events),
        };
        Ok(payload)
    }

    /// Validate and apply a host write.
    ///
    /// Protocol errors are raised before any handler runs; a validation
    /// error leaves every register as it was.
    pub fn write(
        &mut self,
        hw: &mut impl Hardware,
        address: u8,
        ty: RegType,
        data: &[u8],
        count: usize,
    ) -> Result<()> {
        let reg = Register::resolve(address, ty, count)?;
        if data.len() != reg.payload_len() {
            return Err(ProtocolError::ElementCount.into());
        }
        if reg.is_read_only() {
            return Err(ValidationError::ReadOnly.into());
        }

        let result = self.apply(reg, data, hw);
        match &result {
            Ok(()) => debug!("olfactometer: wrote {:?}", reg),
            Err(e) => warn!("olfactometer: write {:?} rejected: {}", reg, e),
        }
        result
    }

    fn apply(&mut self, reg: Register, data: &[u8], hw: &mut impl Hardware) -> Result<()> {
        let byte = data[0];
        match reg {
            Register::EnableFlow => self.set_enable_flow(byte, hw),
            Register::UserCalibration(ch) => {
                let codes = registers::decode_u16s::<{ calibration::BREAKPOINTS }>(data);
                calibration::validate_codes(&codes)?;
                self.user_tables[ch] = codes;
            }
            Register::UserCalibrationAux => {
                let codes = registers::decode_u16s::<{ calibration::BREAKPOINTS }>(data);
                calibration::validate_codes(&codes)?;
                self.user_aux = codes;
            }
            Register::EnableUserCalibration => self.user_calibration = flag(byte)?,
            Register::TargetFlow(ch) => {
                let [target] = registers::decode_f32s::<1>(data);
                self.set_target(ch, target, hw)?;
            }
            Register::ChannelsTargetFlow => {
                let targets = registers::decode_f32s::<CHANNELS>(data);
                for (ch, &target) in targets.iter().enumerate() {
                    self.clamp_target(ch, target)?;
                }
                for (ch, target) in targets.into_iter().enumerate() {
                    self.set_target(ch, target, hw)?;
                }
            }
            Register::Frequency(ch) => {
                let [hz] = registers::decode_u16s::<1>(data);
                self.set_frequency(ch, hz, hw)?;
            }
            Register::DutyCycle(ch) => {
                let [duty] = registers::decode_f32s::<1>(data);
                if !(duty > 0.1 && duty < 99.9) {
                    return Err(ValidationError::DutyOutOfRange.into());
                }
                self.apply_duty(ch, duty, hw);
            }
            Register::OutputSet => {
                self.output_set = byte;
                self.drive_outputs(byte, hw, |_| true);
            }
            Register::OutputClear => {
                self.output_clear = byte;
                self.drive_outputs(byte, hw, |_| false);
            }
            Register::OutputToggle => {
                self.output_toggle = byte;
                self.drive_outputs(byte, hw, |level| !level);
            }
            Register::OutputState => {
                for (bit, line, slot) in OUTPUTS {
                    if self.do_sync[slot] == DoSync::Software {
                        hw.set_line(line, byte & bit != 0);
                    }
                }
            }
            Register::EnableValvePulse => {
                let [mask] = registers::decode_u16s::<1>(data);
                self.valves.set_pulse_mask(mask);
            }
            Register::ValveSet => {
                let [mask] = registers::decode_u16s::<1>(data);
                self.valve_set = mask;
                for valve in selected(mask) {
                    self.valves.set(valve, hw);
                }
            }
            Register::ValveClear => {
                let [mask] = registers::decode_u16s::<1>(data);
                self.valve_clear = mask;
                for valve in selected(mask) {
                    self.valves.clear(valve, hw);
                }
            }
            Register::ValveToggle => {
                let [mask] = registers::decode_u16s::<1>(data);
                self.valve_toggle = mask;
                for valve in selected(mask) {
                    self.valves.toggle(valve, hw);
                }
            }
            Register::ValveState => {
                let [mask] = registers::decode_u16s::<1>(data);
                self.valves.apply_state(mask, VALVE_MASK, hw);
            }
            Register::OdorValveState => {
                self.valves.apply_state(u16::from(byte), ODOR_MASK, hw);
            }
            Register::EndValveState => {
                self.valves.apply_state(u16::from(byte) << 4, END_MASK, hw);
            }
            Register::CheckValveState => {
                self.valves.apply_state(u16::from(byte) << 8, CHECK_MASK, hw);
            }
            Register::PulseDuration(valve) => {
                let [ms] = registers::decode_u16s::<1>(data);
                self.valves.set_duration(valve, ms)?;
            }
            Register::DoSync(n) => self.do_sync[n] = DoSync::try_from(byte)?,
            Register::Di0Trigger => self.di0_trigger = Di0Trigger::try_from(byte)?,
            Register::Mimic(valve) => self.valves.set_mimic(valve, MimicTarget::try_from(byte)?),
            Register::EnableValveExternalControl => self.external_control = flag(byte)?,
            Register::Channel3Range => self.set_channel3_range(byte, hw)?,
            Register::EnableCheckValveSync => self.valves.set_sync_mask(byte),
            Register::EnableTemperatureCalibration => self.temperature_calibration = flag(byte)?,
            Register::TemperatureCalibrationValue => self.temperature_reference = byte,
            Register::EnableEvents => {
                self.events = byte & (EVENT_FLOWMETER | EVENT_DI0 | EVENT_ACTUAL_FLOW);
            }
            Register::FlowmeterAnalogOutputs
            | Register::Di0State
            | Register::ActualFlow(_)
            | Register::TemperatureValue => return Err(ValidationError::ReadOnly.into()),
        }
        Ok(())
    }

    // ── Register handlers ─────────────────────────────────────

    fn set_enable_flow(&mut self, value: u8, hw: &mut impl Hardware) {
        let enable = value & 1 != 0;
        for (_, line, slot) in OUTPUTS {
            if self.do_sync[slot] == DoSync::Start {
                hw.set_line(line, enable);
            }
        }

        if enable {
            if !self.flow_enabled {
                self.scheduler.reset();
                info!("olfactometer: flow enabled");
            }
            self.flow_enabled = true;
            return;
        }

        // Cleared first so the duty writes below do not restart channels.
        self.flow_enabled = false;
        self.pwm.stop_all(hw, &self.isr.duty);
        for ch in 0..CHANNELS {
            self.apply_duty(ch, DEFAULT_DUTY, hw);
        }
        for valve in Valve::ALL.into_iter().filter(|v| !v.is_check()) {
            self.valves.clear(valve, hw);
        }
        self.scheduler.reset();
        info!("olfactometer: flow disabled");
    }

    /// Reject targets that are negative or not finite; clamp the rest to
    /// the channel's ceiling.
    fn clamp_target(&self, ch: usize, target: f32) -> core::result::Result<f32, ValidationError> {
        if !target.is_finite() || target < 0.0 {
            return Err(ValidationError::InvalidTarget);
        }
        Ok(target.min(self.range(ch).ceiling()))
    }

    /// Store a clamped target; an unchanged value sends no MFC frame.
    fn set_target(&mut self, ch: usize, target: f32, hw: &mut impl Hardware) -> Result<()> {
        let target = self.clamp_target(ch, target)?;
        if target != self.targets[ch] {
            self.targets[ch] = target;
            self.send_setpoint(ch, hw);
        }
        Ok(())
    }

    fn send_setpoint(&self, ch: usize, hw: &mut impl Hardware) {
        if !self.config.mfc_link {
            return;
        }
        if let Some(frame) = mfc::setpoint_frame(ch, self.targets[ch], self.range(ch)) {
            hw.send(frame.as_bytes());
        }
    }

    fn set_frequency(&mut self, ch: usize, hz: u16, hw: &mut impl Hardware) -> Result<()> {
        if !(self.config.min_frequency_hz..=self.config.max_frequency_hz).contains(&hz) {
            return Err(ValidationError::FrequencyOutOfRange.into());
        }
        self.pwm.set_frequency(ch, hz, self.duty[ch], hw, &self.isr.duty)?;
        self.frequency[ch] = hz;
        Ok(())
    }

    /// Store a duty, hand it to the timer and start the channel when flow
    /// is enabled.
    fn apply_duty(&mut self, ch: usize, duty: f32, hw: &mut impl Hardware) {
        self.duty[ch] = duty;
        self.pwm.set_duty(ch, duty, hw, &self.isr.duty);
        if self.flow_enabled && !self.pwm.is_running(ch) {
            self.pwm.start(ch, hw);
        }
    }

    fn set_channel3_range(&mut self, value: u8, hw: &mut impl Hardware) -> Result<()> {
        let range = FlowRange::try_from(value)?;
        self.channel3_range = range;
        self.targets[3] = self.clamp_target(3, self.targets[3])?;
        self.send_setpoint(3, hw);
        self.factory.reload_channel3(&*hw, &self.config, range);
        info!("olfactometer: channel 3 range {:?}", range);
        Ok(())
    }

    /// Apply `level` to every software-mode output selected in `mask`.
    fn drive_outputs(&self, mask: u8, hw: &mut impl Hardware, level: impl Fn(bool) -> bool) {
        for (bit, line, slot) in OUTPUTS {
            if mask & bit != 0 && self.do_sync[slot] == DoSync::Software {
                let next = level(hw.line_level(line));
                hw.set_line(line, next);
            }
        }
    }

    // ── Calibration ───────────────────────────────────────────

    /// Full-scale range of a channel.  Only channel 3 is switchable.
    pub fn range(&self, ch: usize) -> FlowRange {
        match ch {
            0..=2 => FlowRange::Low,
            3 => self.channel3_range,
            _ => FlowRange::High,
        }
    }

    /// Table the controller uses for `ch`: user or factory codes under
    /// the channel's current range.
    pub fn table(&self, ch: usize) -> CalibrationTable {
        let range = self.range(ch);
        if !self.user_calibration {
            return self.factory.table(ch, self.channel3_range);
        }
        let codes = if ch == 3 && range == FlowRange::High {
            self.user_aux
        } else {
            self.user_tables[ch]
        };
        CalibrationTable::new(codes, range)
    }

    /// Flow for a raw code, temperature-corrected when enabled and a
    /// reading is available.
    pub fn flow_for(&self, ch: usize, raw: i32) -> f32 {
        let table = self.table(ch);
        match (self.temperature_calibration, self.temperature) {
            (true, Some(sensor)) => {
                let scale = match table.range {
                    FlowRange::Low => self.config.temperature_scale_low_range,
                    FlowRange::High => self.config.temperature_scale_high_range,
                };
                let offset =
                    calibration::temperature_offset(sensor, self.temperature_reference, scale);
                table.lookup_corrected(raw, offset)
            }
            _ => table.lookup(raw),
        }
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn target(&self, ch: usize) -> f32 {
        self.targets[ch]
    }

    pub fn actual_flow(&self, ch: usize) -> f32 {
        self.actual[ch]
    }

    pub fn duty(&self, ch: usize) -> f32 {
        self.duty[ch]
    }

    pub fn frequency(&self, ch: usize) -> u16 {
        self.frequency[ch]
    }

    pub fn flow_enabled(&self) -> bool {
        self.flow_enabled
    }

    pub fn channel3_range(&self) -> FlowRange {
        self.channel3_range
    }

    pub fn factory(&self) -> &FactoryCalibration {
        &self.factory
    }

    pub fn valves(&self) -> &ValveBank {
        &self.valves
    }

    pub fn pwm(&self) -> &PwmDriver {
        &self.pwm
    }
}

// ───────────────────────────────────────────────────────────────
// Helpers
// ───────────────────────────────────────────────────────────────

fn emit_register(sink: &mut impl EventSink, reg: Register, payload: Payload) {
    sink.emit(&AppEvent::Register {
        address: reg.address(),
        payload,
    });
}

/// Boolean register: 0 or 1.
fn flag(byte: u8) -> core::result::Result<bool, ValidationError> {
    match byte {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(ValidationError::InvalidEnum),
    }
}

fn selected(mask: u16) -> impl Iterator<Item = Valve> {
    Valve::ALL.into_iter().filter(move |v| mask & v.mask() != 0)
}

fn output_levels(lines: &impl LinePort) -> u8 {
    OUTPUTS
        .iter()
        .filter(|(_, line, _)| lines.line_level(*line))
        .fold(0, |acc, (bit, _, _)| acc | bit)
}
