//! Valve pulse sequencer.
//!
//! Ten on/off valves: odor valves 0–3, end valves 0–1 and check valves
//! 0–3.  Each valve runs a small state machine advanced by [`ValveBank::tick`]
//! once per millisecond:
//!
//! ```text
//!            set (pulse off)                set (pulse on)
//!   Idle ─────────────────▶ Active    Idle ─────────────────▶ Pulsing(d+1)
//!    ▲                        │                                    │
//!    └──────── clear ─────────┘    Idle ◀──── countdown hits 0 ────┘
//! ```
//!
//! Check valve `n` pairs with odor valve `n`.  With sync enabled for the
//! pair, every level change of the odor valve arms `DelayedSync(d+1)` on
//! the check valve; on expiry the check valve copies the odor valve's
//! level at that moment.

use crate::app::ports::{Line, LinePort};
use crate::drivers::digital_io::MimicTarget;
use crate::error::ValidationError;

/// Default pulse and sync-delay duration (ms).
pub const DEFAULT_DURATION_MS: u16 = 500;

/// Every valve bit that exists in the valve-mask registers.
pub const VALVE_MASK: u16 = 0x0F3F;
/// Odor valves 0–3.
pub const ODOR_MASK: u16 = 0x000F;
/// End valves 0–1.
pub const END_MASK: u16 = 0x0030;
/// Check valves 0–3.
pub const CHECK_MASK: u16 = 0x0F00;

/// Physical valve; the discriminant is its bit in the valve-mask registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Valve {
    Valve0 = 0,
    Valve1 = 1,
    Valve2 = 2,
    Valve3 = 3,
    EndValve0 = 4,
    EndValve1 = 5,
    CheckValve0 = 8,
    CheckValve1 = 9,
    CheckValve2 = 10,
    CheckValve3 = 11,
}

impl Valve {
    /// All valves in slot order.
    pub const ALL: [Self; 10] = [
        Self::Valve0,
        Self::Valve1,
        Self::Valve2,
        Self::Valve3,
        Self::EndValve0,
        Self::EndValve1,
        Self::CheckValve0,
        Self::CheckValve1,
        Self::CheckValve2,
        Self::CheckValve3,
    ];

    /// Return the bitmask for this valve.
    pub const fn mask(self) -> u16 {
        1 << self as u8
    }

    /// Position in [`Valve::ALL`].
    pub const fn slot(self) -> usize {
        match self {
            Self::Valve0 => 0,
            Self::Valve1 => 1,
            Self::Valve2 => 2,
            Self::Valve3 => 3,
            Self::EndValve0 => 4,
            Self::EndValve1 => 5,
            Self::CheckValve0 => 6,
            Self::CheckValve1 => 7,
            Self::CheckValve2 => 8,
            Self::CheckValve3 => 9,
        }
    }

    /// Pair index (0–3) of an odor or check valve.
    pub const fn pair(self) -> Option<usize> {
        match self {
            Self::Valve0 | Self::CheckValve0 => Some(0),
            Self::Valve1 | Self::CheckValve1 => Some(1),
            Self::Valve2 | Self::CheckValve2 => Some(2),
            Self::Valve3 | Self::CheckValve3 => Some(3),
            Self::EndValve0 | Self::EndValve1 => None,
        }
    }

    pub const fn is_check(self) -> bool {
        self as u8 >= 8
    }

    pub const fn odor(pair: usize) -> Self {
        Self::ALL[pair & 3]
    }

    pub const fn check(pair: usize) -> Self {
        Self::ALL[6 + (pair & 3)]
    }
}

/// Countdown state of one valve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValvePhase {
    /// No countdown pending; a closed valve rests here.
    Idle,
    /// Open until explicitly cleared.
    Active,
    /// Open; closes when the countdown reaches zero.
    Pulsing(u16),
    /// Check valve only; copies its partner's level when the countdown
    /// reaches zero.
    DelayedSync(u16),
}

impl ValvePhase {
    pub const fn remaining(self) -> u16 {
        match self {
            Self::Pulsing(n) | Self::DelayedSync(n) => n,
            Self::Idle | Self::Active => 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    phase: ValvePhase,
    duration: u16,
    mimic: MimicTarget,
}

/// State of every valve plus the per-valve configuration registers.
pub struct ValveBank {
    slots: [Slot; 10],
    pulse_mask: u16,
    sync_mask: u8,
}

impl ValveBank {
    pub fn new() -> Self {
        Self {
            slots: [Slot {
                phase: ValvePhase::Idle,
                duration: DEFAULT_DURATION_MS,
                mimic: MimicTarget::None,
            }; 10],
            pulse_mask: 0,
            sync_mask: 0,
        }
    }

    // ── Configuration ─────────────────────────────────────────

    pub fn set_pulse_mask(&mut self, mask: u16) {
        self.pulse_mask = mask & VALVE_MASK;
    }

    pub fn pulse_mask(&self) -> u16 {
        self.pulse_mask
    }

    /// Pairs (bits 0–3) whose check valve follows the odor valve.
    pub fn set_sync_mask(&mut self, mask: u8) {
        self.sync_mask = mask & 0x0F;
    }

    pub fn sync_mask(&self) -> u8 {
        self.sync_mask
    }

    /// Pulse width, or sync delay for check valves.  Zero is rejected.
    pub fn set_duration(&mut self, valve: Valve, ms: u16) -> Result<(), ValidationError> {
        if ms == 0 {
            return Err(ValidationError::ZeroDuration);
        }
        self.slots[valve.slot()].duration = ms;
        Ok(())
    }

    pub fn duration(&self, valve: Valve) -> u16 {
        self.slots[valve.slot()].duration
    }

    pub fn set_mimic(&mut self, valve: Valve, target: MimicTarget) {
        self.slots[valve.slot()].mimic = target;
    }

    pub fn mimic(&self, valve: Valve) -> MimicTarget {
        self.slots[valve.slot()].mimic
    }

    pub fn phase(&self, valve: Valve) -> ValvePhase {
        self.slots[valve.slot()].phase
    }

    /// Ticks left on the valve's countdown; zero when none is pending.
    pub fn countdown(&self, valve: Valve) -> u16 {
        self.phase(valve).remaining()
    }

    // ── Commands ──────────────────────────────────────────────

    /// Open a valve, arming its pulse countdown when pulse mode is on.
    pub fn set(&mut self, valve: Valve, lines: &mut impl LinePort) {
        let phase = if self.pulse_mask & valve.mask() != 0 {
            ValvePhase::Pulsing(self.duration(valve).saturating_add(1))
        } else {
            ValvePhase::Active
        };
        self.slots[valve.slot()].phase = phase;
        self.drive(valve, true, lines);
    }

    /// Close a valve and cancel its countdown.
    pub fn clear(&mut self, valve: Valve, lines: &mut impl LinePort) {
        self.slots[valve.slot()].phase = ValvePhase::Idle;
        self.drive(valve, false, lines);
    }

    /// Close an open valve, otherwise open it like [`set`](Self::set).
    pub fn toggle(&mut self, valve: Valve, lines: &mut impl LinePort) {
        if lines.line_level(Line::Valve(valve)) {
            self.clear(valve, lines);
        } else {
            self.set(valve, lines);
        }
    }

    /// Open every valve in `affected` whose bit is set in `state`, close
    /// the others.
    pub fn apply_state(&mut self, state: u16, affected: u16, lines: &mut impl LinePort) {
        for valve in Valve::ALL {
            if affected & valve.mask() == 0 {
                continue;
            }
            if state & valve.mask() != 0 {
                self.set(valve, lines);
            } else {
                self.clear(valve, lines);
            }
        }
    }

    /// Live valve levels as a valve mask.
    pub fn levels(&self, lines: &impl LinePort) -> u16 {
        Valve::ALL
            .iter()
            .filter(|v| lines.line_level(Line::Valve(**v)))
            .fold(0, |acc, v| acc | v.mask())
    }

    /// Drop every valve to closed without sync side effects.
    pub fn close_all(&mut self, lines: &mut impl LinePort) {
        for valve in Valve::ALL {
            self.slots[valve.slot()].phase = ValvePhase::Idle;
            lines.set_line(Line::Valve(valve), false);
        }
    }

    /// Advance every countdown by one tick.
    ///
    /// Countdowns are decremented first and expiries applied afterwards,
    /// so a sync armed by an expiry starts counting on the next tick.
    pub fn tick(&mut self, lines: &mut impl LinePort) {
        let mut expired = [false; 10];
        for (slot, done) in self.slots.iter_mut().zip(expired.iter_mut()) {
            match slot.phase {
                ValvePhase::Pulsing(n) if n > 0 => {
                    slot.phase = ValvePhase::Pulsing(n - 1);
                    *done = n == 1;
                }
                ValvePhase::DelayedSync(n) if n > 0 => {
                    slot.phase = ValvePhase::DelayedSync(n - 1);
                    *done = n == 1;
                }
                _ => {}
            }
        }

        // Check valves sample their partner before the partner's own
        // expiry lands in the same tick.
        for &valve in Valve::ALL.iter().rev() {
            if !expired[valve.slot()] {
                continue;
            }
            match self.slots[valve.slot()].phase {
                ValvePhase::Pulsing(0) => {
                    if self.synced_partner(valve).is_some() {
                        self.follow_partner(valve, lines);
                    } else {
                        self.clear(valve, lines);
                    }
                }
                ValvePhase::DelayedSync(0) => self.follow_partner(valve, lines),
                _ => {}
            }
        }
    }

    // ── Internal ──────────────────────────────────────────────

    fn drive(&mut self, valve: Valve, open: bool, lines: &mut impl LinePort) {
        let was_open = lines.line_level(Line::Valve(valve));
        lines.set_line(Line::Valve(valve), open);

        match self.slots[valve.slot()].mimic {
            MimicTarget::None => {}
            MimicTarget::Do0 => lines.set_line(Line::Out0, open),
            MimicTarget::Do1 => lines.set_line(Line::Out1, open),
        }

        if was_open != open && !valve.is_check() {
            if let Some(pair) = valve.pair() {
                if self.sync_mask & (1 << pair) != 0 {
                    let check = Valve::check(pair);
                    let delay = self.duration(check).saturating_add(1);
                    self.slots[check.slot()].phase = ValvePhase::DelayedSync(delay);
                }
            }
        }
    }

    /// Odor valve a synced check valve follows.
    fn synced_partner(&self, valve: Valve) -> Option<Valve> {
        let pair = valve.pair()?;
        (valve.is_check() && self.sync_mask & (1 << pair) != 0).then(|| Valve::odor(pair))
    }

    fn follow_partner(&mut self, check: Valve, lines: &mut impl LinePort) {
        let Some(pair) = check.pair() else { return };
        let open = lines.line_level(Line::Valve(Valve::odor(pair)));
        self.slots[check.slot()].phase = if open {
            ValvePhase::Active
        } else {
            ValvePhase::Idle
        };
        self.drive(check, open, lines);
    }
}

impl Default for ValveBank {
    fn default() -> Self {
        Self::new()
    }
}
