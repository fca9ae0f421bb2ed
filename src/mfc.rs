//! Setpoint frames for external mass-flow controllers.
//!
//! One ASCII frame per channel: `<ID>S <value>\r`.  Low-range channels
//! send ml/min with one decimal; high-range channels send l/min with
//! three.  Both pad to three integer digits.

use core::fmt::Write;

use crate::calibration::FlowRange;

/// `"AS 050.0\r"` and `"ES 001.100\r"` both fit.
pub type MfcFrame = heapless::String<16>;

/// Controller ID letter for a channel (A–E).
pub fn channel_id(channel: usize) -> char {
    char::from(b'A' + (channel.min(4)) as u8)
}

pub fn setpoint_frame(channel: usize, target: f32, range: FlowRange) -> Option<MfcFrame> {
    let mut frame = MfcFrame::new();
    let target = target.max(0.0);
    let id = channel_id(channel);
    match range {
        FlowRange::Low => write!(frame, "{id}S {target:05.1}\r").ok()?,
        FlowRange::High => write!(frame, "{id}S {:07.3}\r", target / 1000.0).ok()?,
    }
    Some(frame)
}
