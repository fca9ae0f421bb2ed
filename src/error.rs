//! Unified error types for the olfactometer firmware.
//!
//! Every register access funnels into a single `Error` enum so the host
//! transport can map failures onto one reply code.  Variants are `Copy`
//! and carry no heap data.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The request was malformed; no handler ran.
    Protocol(ProtocolError),
    /// A handler rejected the value; the register kept its previous state.
    Validation(ValidationError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::Validation(e) => write!(f, "validation: {e}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Protocol errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Address is outside the register bank.
    AddressOutOfRange(u8),
    /// Declared element type differs from the register's type.
    TypeMismatch,
    /// Element count or payload length differs from the register's arity.
    ElementCount,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddressOutOfRange(addr) => write!(f, "address {addr} out of range"),
            Self::TypeMismatch => write!(f, "type mismatch"),
            Self::ElementCount => write!(f, "wrong element count"),
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// PWM frequency outside 100–10000 Hz.
    FrequencyOutOfRange,
    /// Duty cycle outside the open interval (0.1, 99.9) %.
    DutyOutOfRange,
    /// Pulse or delay duration of zero.
    ZeroDuration,
    /// Enum-valued register received an unknown discriminant.
    InvalidEnum,
    /// Target flow was negative, NaN or infinite.
    InvalidTarget,
    /// Calibration codes must be non-decreasing and at most 32768.
    NonMonotonicCalibration,
    /// Register is read-only.
    ReadOnly,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrequencyOutOfRange => write!(f, "frequency out of range"),
            Self::DutyOutOfRange => write!(f, "duty cycle out of range"),
            Self::ZeroDuration => write!(f, "duration must be at least 1 ms"),
            Self::InvalidEnum => write!(f, "invalid enum value"),
            Self::InvalidTarget => write!(f, "invalid target flow"),
            Self::NonMonotonicCalibration => write!(f, "calibration not monotonic"),
            Self::ReadOnly => write!(f, "register is read-only"),
        }
    }
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
