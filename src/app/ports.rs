//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Olfactometer (domain)
//! ```
//!
//! Driven adapters (PWM timers, GPIO lines, calibration storage, the MFC
//! serial link, event sinks) implement these traits.  The
//! [`Olfactometer`](super::service::Olfactometer) consumes them via
//! generics, so the domain core never touches hardware directly.

use crate::config::DeviceConfig;
use crate::drivers::pwm::PwmTiming;
use crate::drivers::valves::Valve;

// ───────────────────────────────────────────────────────────────
// PWM port (driven adapter: domain → timer peripheral)
// ───────────────────────────────────────────────────────────────

/// One hardware timer per proportional-valve channel.
pub trait PwmPort {
    /// Load prescaler, period and compare.  The channel is stopped.
    fn configure(&mut self, channel: usize, timing: PwmTiming);

    /// Begin counting with the configured parameters.
    fn start(&mut self, channel: usize);

    /// Halt counting immediately.
    fn stop(&mut self, channel: usize);

    /// Write the compare register.  Only called on a stopped channel or
    /// at counter rollover.
    fn load_compare(&mut self, channel: usize, compare: u16);
}

// ───────────────────────────────────────────────────────────────
// Line port (driven adapter: domain ↔ GPIO)
// ───────────────────────────────────────────────────────────────

/// Digital output lines the core drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    Valve(Valve),
    Out0,
    Out1,
    /// ADC conversion start.
    AdcConvst,
}

pub trait LinePort {
    fn set_line(&mut self, line: Line, high: bool);

    /// Level currently driven on the pin.
    fn line_level(&self, line: Line) -> bool;
}

// ───────────────────────────────────────────────────────────────
// EEPROM port (driven adapter: calibration storage → domain)
// ───────────────────────────────────────────────────────────────

/// Byte-addressed factory calibration storage.  Unwritten bytes read 0.
pub trait EepromPort {
    fn read_byte(&self, address: u16) -> u8;
}

// ───────────────────────────────────────────────────────────────
// MFC port (driven adapter: domain → mass-flow controller link)
// ───────────────────────────────────────────────────────────────

/// Serial link to external mass-flow controllers.
pub trait MfcPort {
    /// Transmit one complete ASCII frame.
    fn send(&mut self, frame: &[u8]);
}

/// Everything the register handlers drive.
pub trait Hardware: PwmPort + LinePort + EepromPort + MfcPort {}

impl<T: PwmPort + LinePort + EepromPort + MfcPort> Hardware for T {}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → host / logging)
// ───────────────────────────────────────────────────────────────

/// The domain emits [`AppEvent`](super::events::AppEvent)s through this
/// port.  Adapters decide where they go (host transport, serial log).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists device configuration.
///
/// Implementations MUST validate config values before persisting and
/// reject invalid ranges with [`ConfigError::ValidationFailed`].
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`DeviceConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<DeviceConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &DeviceConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::error::Error for ConfigError {}
