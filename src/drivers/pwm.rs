//! Proportional-valve PWM timers.
//!
//! Five channels, one per flow loop.  Frequency writes stop the channel
//! and recompute `(prescaler, period)`; the caller restarts it.  Duty
//! writes on a running channel never touch the compare register: the new
//! compare value is staged in [`DutyHandoff`] and applied by the rollover
//! interrupt, so a period is never cut short mid-cycle.
//!
//! ## Dual-target design
//!
//! The driver only tracks state and calls [`PwmPort`]; the port is backed
//! by MCPWM on ESP-IDF and by a recorder in tests.

use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use crate::app::ports::PwmPort;
use crate::error::ValidationError;

/// Number of proportional-valve channels.
pub const CHANNELS: usize = 5;

/// Timer clock dividers, tried smallest first.
const PRESCALERS: [u16; 7] = [1, 2, 4, 8, 64, 256, 1024];

/// Counter parameters for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PwmTiming {
    pub prescaler: u16,
    /// Counts per period.
    pub period: u16,
    /// Counts the output stays high.
    pub compare: u16,
}

/// Pick the first prescaler whose period fits 16 bits.
pub fn timing_for(clock_hz: u32, freq_hz: u16, duty: f32) -> Option<PwmTiming> {
    if freq_hz == 0 {
        return None;
    }
    PRESCALERS.iter().find_map(|&prescaler| {
        let count = clock_hz / (u32::from(prescaler) * u32::from(freq_hz));
        let period = u16::try_from(count).ok()?;
        Some(PwmTiming {
            prescaler,
            period,
            compare: duty_compare(duty, period),
        })
    })
}

/// Compare count for `duty` percent of `period`, rounded to nearest.
pub fn duty_compare(duty: f32, period: u16) -> u16 {
    (duty / 100.0 * f32::from(period) + 0.5) as u16
}

// ── ISR handoff ───────────────────────────────────────────────

/// Staged compare values, one slot per channel.
///
/// The main context writes the value then raises the flag; the rollover
/// interrupt lowers the flag then reads the value.
pub struct DutyHandoff {
    pending: [AtomicBool; CHANNELS],
    compare: [AtomicU16; CHANNELS],
}

impl DutyHandoff {
    pub const fn new() -> Self {
        Self {
            pending: [const { AtomicBool::new(false) }; CHANNELS],
            compare: [const { AtomicU16::new(0) }; CHANNELS],
        }
    }

    /// Stage a compare value for the next rollover.
    pub fn stage(&self, channel: usize, compare: u16) {
        self.compare[channel].store(compare, Ordering::Relaxed);
        self.pending[channel].store(true, Ordering::Release);
    }

    /// Take the staged value, if any.  Lock-free; safe from interrupt
    /// context.
    pub fn take(&self, channel: usize) -> Option<u16> {
        if self.pending[channel].swap(false, Ordering::Acquire) {
            Some(self.compare[channel].load(Ordering::Relaxed))
        } else {
            None
        }
    }

    pub fn discard(&self, channel: usize) {
        self.pending[channel].store(false, Ordering::Release);
    }

    pub fn is_pending(&self, channel: usize) -> bool {
        self.pending[channel].load(Ordering::Acquire)
    }
}

impl Default for DutyHandoff {
    fn default() -> Self {
        Self::new()
    }
}

// ── Driver ────────────────────────────────────────────────────

pub struct PwmDriver {
    clock_hz: u32,
    timings: [PwmTiming; CHANNELS],
    running: [bool; CHANNELS],
}

impl PwmDriver {
    pub fn new(clock_hz: u32) -> Self {
        Self {
            clock_hz,
            timings: [PwmTiming::default(); CHANNELS],
            running: [false; CHANNELS],
        }
    }

    /// Stop the channel, recompute its period and leave it stopped.
    pub fn set_frequency(
        &mut self,
        channel: usize,
        freq_hz: u16,
        duty: f32,
        port: &mut impl PwmPort,
        handoff: &DutyHandoff,
    ) -> Result<(), ValidationError> {
        let timing =
            timing_for(self.clock_hz, freq_hz, duty).ok_or(ValidationError::FrequencyOutOfRange)?;
        self.stop(channel, port, handoff);
        port.configure(channel, timing);
        self.timings[channel] = timing;
        Ok(())
    }

    /// Recompute the compare count; stage it when the channel is running.
    pub fn set_duty(
        &mut self,
        channel: usize,
        duty: f32,
        port: &mut impl PwmPort,
        handoff: &DutyHandoff,
    ) {
        let compare = duty_compare(duty, self.timings[channel].period);
        self.timings[channel].compare = compare;
        if self.running[channel] {
            handoff.stage(channel, compare);
        } else {
            port.load_compare(channel, compare);
        }
    }

    /// No-op if the channel is already running.
    pub fn start(&mut self, channel: usize, port: &mut impl PwmPort) {
        if self.running[channel] {
            return;
        }
        port.start(channel);
        self.running[channel] = true;
    }

    /// Stop the channel and drop any compare still waiting for a
    /// rollover, so a later restart runs the last loaded duty.  The valve
    /// output keeps whatever level it had.
    pub fn stop(&mut self, channel: usize, port: &mut impl PwmPort, handoff: &DutyHandoff) {
        handoff.discard(channel);
        if !self.running[channel] {
            return;
        }
        port.stop(channel);
        self.running[channel] = false;
    }

    pub fn stop_all(&mut self, port: &mut impl PwmPort, handoff: &DutyHandoff) {
        for channel in 0..CHANNELS {
            self.stop(channel, port, handoff);
        }
    }

    /// Apply a staged compare value at counter rollover.
    pub fn on_rollover(channel: usize, handoff: &DutyHandoff, port: &mut impl PwmPort) {
        if let Some(compare) = handoff.take(channel) {
            port.load_compare(channel, compare);
        }
    }

    pub fn is_running(&self, channel: usize) -> bool {
        self.running[channel]
    }

    pub fn timing(&self, channel: usize) -> PwmTiming {
        self.timings[channel]
    }
}
