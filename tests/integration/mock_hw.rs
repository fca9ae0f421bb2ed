//! Mock hardware adapter for integration tests.
//!
//! Records every PWM call, line level, CONVST pulse and MFC frame so tests
//! can assert on the full command history without touching real GPIO/PWM
//! registers.

use olfactometer::app::events::AppEvent;
use olfactometer::app::ports::{EepromPort, EventSink, Line, LinePort, MfcPort, PwmPort};
use olfactometer::drivers::pwm::PwmTiming;
use olfactometer::registers::Payload;
use std::collections::HashMap;

// ── PWM call record ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PwmCall {
    Configure { channel: usize, timing: PwmTiming },
    Start(usize),
    Stop(usize),
    LoadCompare { channel: usize, compare: u16 },
}

// ── MockHardware ──────────────────────────────────────────────

pub struct MockHardware {
    pub pwm_calls: Vec<PwmCall>,
    levels: [bool; 13],
    pub convst_pulses: usize,
    pub eeprom: HashMap<u16, u8>,
    pub mfc_frames: Vec<String>,
}

fn line_index(line: Line) -> usize {
    match line {
        Line::Valve(valve) => valve.slot(),
        Line::Out0 => 10,
        Line::Out1 => 11,
        Line::AdcConvst => 12,
    }
}

#[allow(dead_code)]
impl MockHardware {
    pub fn new() -> Self {
        Self {
            pwm_calls: Vec::new(),
            levels: [false; 13],
            convst_pulses: 0,
            eeprom: HashMap::new(),
            mfc_frames: Vec::new(),
        }
    }

    pub fn level(&self, line: Line) -> bool {
        self.levels[line_index(line)]
    }

    /// Store an 11-entry factory table big-endian at `base`.
    pub fn store_table(&mut self, base: u16, codes: &[u16; 11]) {
        for (i, code) in codes.iter().enumerate() {
            let [hi, lo] = code.to_be_bytes();
            let addr = base + 2 * i as u16;
            self.eeprom.insert(addr, hi);
            self.eeprom.insert(addr + 1, lo);
        }
    }

    pub fn last_compare(&self, channel: usize) -> Option<u16> {
        self.pwm_calls.iter().rev().find_map(|c| match c {
            PwmCall::LoadCompare { channel: ch, compare } if *ch == channel => Some(*compare),
            _ => None,
        })
    }

    pub fn clear_calls(&mut self) {
        self.pwm_calls.clear();
        self.mfc_frames.clear();
    }
}

impl Default for MockHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl PwmPort for MockHardware {
    fn configure(&mut self, channel: usize, timing: PwmTiming) {
        self.pwm_calls.push(PwmCall::Configure { channel, timing });
    }

    fn start(&mut self, channel: usize) {
        self.pwm_calls.push(PwmCall::Start(channel));
    }

    fn stop(&mut self, channel: usize) {
        self.pwm_calls.push(PwmCall::Stop(channel));
    }

    fn load_compare(&mut self, channel: usize, compare: u16) {
        self.pwm_calls.push(PwmCall::LoadCompare { channel, compare });
    }
}

impl LinePort for MockHardware {
    fn set_line(&mut self, line: Line, high: bool) {
        let index = line_index(line);
        if line == Line::AdcConvst && high && !self.levels[index] {
            self.convst_pulses += 1;
        }
        self.levels[index] = high;
    }

    fn line_level(&self, line: Line) -> bool {
        self.level(line)
    }
}

impl EepromPort for MockHardware {
    fn read_byte(&self, address: u16) -> u8 {
        self.eeprom.get(&address).copied().unwrap_or(0)
    }
}

impl MfcPort for MockHardware {
    fn send(&mut self, frame: &[u8]) {
        self.mfc_frames.push(String::from_utf8_lossy(frame).into_owned());
    }
}

// ── LogSink ──────────────────────────────────────────────────

pub struct LogSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl LogSink {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Payloads of register events for `address`, oldest first.
    pub fn register_events(&self, address: u8) -> Vec<Payload> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::Register { address: a, payload } if *a == address => {
                    Some(payload.clone())
                }
                _ => None,
            })
            .collect()
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for LogSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}
