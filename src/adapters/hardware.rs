//! Hardware adapter — bridges real peripherals to domain port traits.
//!
//! Owns the output line drivers and the MCPWM port, and borrows the
//! calibration image, exposing them through [`PwmPort`], [`LinePort`],
//! [`EepromPort`] and [`MfcPort`].  Lines are generic over
//! `embedded_hal::digital::OutputPin`, so host tests plug in plain mock
//! pins while the firmware hands over `PinDriver`s.

use embedded_hal::digital::OutputPin;
use log::warn;

use crate::app::ports::{EepromPort, Line, LinePort, MfcPort, PwmPort};
use crate::drivers::hw_init::{self, McpwmPort};
use crate::drivers::pwm::PwmTiming;

/// Valve slots 0–9, then DO0, DO1 and the ADC CONVST line.
pub const LINE_COUNT: usize = 13;

const OUT0_INDEX: usize = 10;
const OUT1_INDEX: usize = 11;
const CONVST_INDEX: usize = 12;

fn line_index(line: Line) -> usize {
    match line {
        Line::Valve(valve) => valve.slot(),
        Line::Out0 => OUT0_INDEX,
        Line::Out1 => OUT1_INDEX,
        Line::AdcConvst => CONVST_INDEX,
    }
}

/// Concrete adapter that combines all hardware behind port traits.
pub struct HardwareAdapter<'a, P, S> {
    lines: [P; LINE_COUNT],
    /// Last level driven per line, bit = index.
    levels: u16,
    pwm: McpwmPort,
    calibration: &'a S,
}

impl<'a, P: OutputPin, S: EepromPort> HardwareAdapter<'a, P, S> {
    /// All lines are driven low on construction.
    pub fn new(mut lines: [P; LINE_COUNT], calibration: &'a S) -> Self {
        for (index, pin) in lines.iter_mut().enumerate() {
            if pin.set_low().is_err() {
                warn!("hardware: line {} failed to drive low", index);
            }
        }
        Self {
            lines,
            levels: 0,
            pwm: McpwmPort,
            calibration,
        }
    }
}

// ── PwmPort implementation ────────────────────────────────────

impl<P, S> PwmPort for HardwareAdapter<'_, P, S> {
    fn configure(&mut self, channel: usize, timing: PwmTiming) {
        self.pwm.configure(channel, timing);
    }

    fn start(&mut self, channel: usize) {
        self.pwm.start(channel);
    }

    fn stop(&mut self, channel: usize) {
        self.pwm.stop(channel);
    }

    fn load_compare(&mut self, channel: usize, compare: u16) {
        self.pwm.load_compare(channel, compare);
    }
}

// ── LinePort implementation ───────────────────────────────────

impl<P: OutputPin, S> LinePort for HardwareAdapter<'_, P, S> {
    fn set_line(&mut self, line: Line, high: bool) {
        let index = line_index(line);
        let pin = &mut self.lines[index];
        let result = if high { pin.set_high() } else { pin.set_low() };
        if result.is_err() {
            warn!("hardware: failed to drive {:?} {}", line, if high { "high" } else { "low" });
            return;
        }
        if high {
            self.levels |= 1 << index;
        } else {
            self.levels &= !(1 << index);
        }
    }

    fn line_level(&self, line: Line) -> bool {
        self.levels & (1 << line_index(line)) != 0
    }
}

// ── EepromPort / MfcPort implementations ──────────────────────

impl<P, S: EepromPort> EepromPort for HardwareAdapter<'_, P, S> {
    fn read_byte(&self, address: u16) -> u8 {
        self.calibration.read_byte(address)
    }
}

impl<P, S> MfcPort for HardwareAdapter<'_, P, S> {
    fn send(&mut self, frame: &[u8]) {
        hw_init::uart_write(frame);
    }
}
