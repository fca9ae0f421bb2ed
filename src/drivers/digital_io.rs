//! Digital outputs DO0/DO1 and the DI0 trigger input.
//!
//! Both outputs double as mimic targets for valve transitions.  In
//! `Start` mode an output mirrors the flow-enable bit instead of host
//! writes.

use crate::error::ValidationError;

/// Bit of DO0 in the output registers.
pub const DO0: u8 = 0b01;
/// Bit of DO1 in the output registers.
pub const DO1: u8 = 0b10;

/// Source that drives a digital output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DoSync {
    /// Host output registers drive the line.
    Software = 0,
    /// Line follows EnableFlow bit 0.
    Start = 1,
}

impl TryFrom<u8> for DoSync {
    type Error = ValidationError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Software),
            1 => Ok(Self::Start),
            _ => Err(ValidationError::InvalidEnum),
        }
    }
}

/// Reaction to edges on DI0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Di0Trigger {
    /// Only report edges as events.
    Sync = 0,
    /// Rising edge enables flow, falling edge disables it.
    RiseStartFallStop = 1,
    /// Rising edge opens both end valves, falling edge closes them.
    ValveToggle = 2,
}

impl TryFrom<u8> for Di0Trigger {
    type Error = ValidationError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Sync),
            1 => Ok(Self::RiseStartFallStop),
            2 => Ok(Self::ValveToggle),
            _ => Err(ValidationError::InvalidEnum),
        }
    }
}

/// Digital output that mirrors a valve, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MimicTarget {
    None = 0,
    Do0 = 1,
    Do1 = 2,
}

impl TryFrom<u8> for MimicTarget {
    type Error = ValidationError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::None),
            1 => Ok(Self::Do0),
            2 => Ok(Self::Do1),
            _ => Err(ValidationError::InvalidEnum),
        }
    }
}
