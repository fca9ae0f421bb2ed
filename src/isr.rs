//! State shared between interrupt handlers and the main loop.
//!
//! Interrupt handlers only copy small values into these atomics and raise
//! flags.  Everything else (interpolation, the control law, register
//! handlers) runs in the main loop, which consumes the flags.
//!
//! ```text
//!   BUSY ISR ──────▶ AdcLatch ─────┐
//!   DI0 ISR ───────▶ InputLatch ───┼──▶ Olfactometer::tick (main loop)
//!   EXT-CTRL ISR ──▶ InputLatch ───┘
//!   Olfactometer ──▶ DutyHandoff ──▶ PWM rollover ISR
//! ```

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::drivers::pwm::DutyHandoff;
use crate::sensors::adc::AdcLatch;

/// Latched digital input levels.
pub struct InputLatch {
    di0_level: AtomicBool,
    di0_changed: AtomicBool,
    external_mask: AtomicU8,
    external_changed: AtomicBool,
}

impl InputLatch {
    pub const fn new() -> Self {
        Self {
            di0_level: AtomicBool::new(false),
            di0_changed: AtomicBool::new(false),
            external_mask: AtomicU8::new(0),
            external_changed: AtomicBool::new(false),
        }
    }

    /// Record a DI0 edge.
    pub fn record_di0(&self, level: bool) {
        self.di0_level.store(level, Ordering::Relaxed);
        self.di0_changed.store(true, Ordering::Release);
    }

    /// Level of the last unconsumed DI0 edge.
    pub fn take_di0(&self) -> Option<bool> {
        self.di0_changed
            .swap(false, Ordering::Acquire)
            .then(|| self.di0_level.load(Ordering::Relaxed))
    }

    /// Record the external valve-control pins (odor 0–3 in bits 0–3,
    /// end valves in bits 4–5).
    pub fn record_external(&self, pins: u8) {
        self.external_mask.store(pins & 0x3F, Ordering::Relaxed);
        self.external_changed.store(true, Ordering::Release);
    }

    pub fn take_external(&self) -> Option<u8> {
        self.external_changed
            .swap(false, Ordering::Acquire)
            .then(|| self.external_mask.load(Ordering::Relaxed))
    }
}

impl Default for InputLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything an interrupt handler may touch.
pub struct IsrShared {
    pub adc: AdcLatch,
    pub duty: DutyHandoff,
    pub inputs: InputLatch,
}

impl IsrShared {
    pub const fn new() -> Self {
        Self {
            adc: AdcLatch::new(),
            duty: DutyHandoff::new(),
            inputs: InputLatch::new(),
        }
    }
}

/// The instance the firmware's interrupt handlers write to.
pub static SHARED: IsrShared = IsrShared::new();

impl Default for IsrShared {
    fn default() -> Self {
        Self::new()
    }
}
