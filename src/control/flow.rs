//! Proportional flow loop.
//!
//! The scheduler divides the 1 ms tick into ADC conversion cycles and
//! control periods.  Each control period services one channel, rotating
//! 1 → 4 then 0, so every channel is regulated once per five periods.

/// Channels served by the round robin.
const CHANNELS: usize = 5;

/// First channel served after a reset.
const FIRST_CHANNEL: usize = 1;

/// What the main loop should do on this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Step {
    /// Pulse CONVST to start a conversion.
    pub convert: bool,
    /// Channel whose controller step is due.
    pub control: Option<usize>,
}

pub struct FlowScheduler {
    divider: u16,
    period: u16,
    tick_count: u16,
    cycle_count: u16,
    next_channel: usize,
}

impl FlowScheduler {
    /// `divider` ticks per conversion, `period` conversions per control
    /// step.  Zero is treated as one.
    pub fn new(divider: u16, period: u16) -> Self {
        Self {
            divider: divider.max(1),
            period: period.max(1),
            tick_count: 0,
            cycle_count: 0,
            next_channel: FIRST_CHANNEL,
        }
    }

    /// Restart counting; the next control step serves channel 1.
    pub fn reset(&mut self) {
        self.tick_count = 0;
        self.cycle_count = 0;
        self.next_channel = FIRST_CHANNEL;
    }

    pub fn tick(&mut self) -> Step {
        self.tick_count += 1;
        if self.tick_count < self.divider {
            return Step::default();
        }
        self.tick_count = 0;

        self.cycle_count += 1;
        if self.cycle_count < self.period {
            return Step {
                convert: true,
                control: None,
            };
        }
        self.cycle_count = 0;

        let channel = self.next_channel;
        self.next_channel = (channel + 1) % CHANNELS;
        Step {
            convert: true,
            control: Some(channel),
        }
    }
}

/// One proportional step: `current + (target − actual) / gain`, pinned to
/// `floor` or `ceiling` once it reaches either.
pub fn next_duty(current: f32, target: f32, actual: f32, gain: f32, floor: f32, ceiling: f32) -> f32 {
    let duty = current + (target - actual) / gain;
    if duty <= floor {
        floor
    } else if duty >= ceiling {
        ceiling
    } else {
        duty
    }
}
