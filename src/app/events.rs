//! Outbound application events.
//!
//! The [`Olfactometer`](super::service::Olfactometer) emits these through
//! the [`EventSink`](super::ports::EventSink) port.  Register events carry
//! the same little-endian payload a host read would return.

use serde::Serialize;

use crate::registers::Payload;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AppEvent {
    /// A register changed without a host write (ADC frame, DI0 edge,
    /// controller step).
    Register { address: u8, payload: Payload },

    /// Registers were reset to defaults and calibration reloaded.
    Booted,

    /// All timers halted and every valve and output forced low.
    FaultShutdown,
}
