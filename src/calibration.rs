//! Flow calibration — raw sensor code to ml/min.
//!
//! Each channel owns eleven breakpoint codes.  The flow at breakpoint `i`
//! is fixed by the range (`(i + 1) × 10` or `(i + 1) × 100` ml/min), so
//! only the codes are stored.  Two synthetic sentinels close the table:
//!
//! ```text
//!   (0, 0) ── bp0 ── bp1 ── … ── bp10 ── (32768, sentinel flow)
//! ```
//!
//! Lookup scans for the first breakpoint whose code exceeds the query
//! and interpolates against the previous one, clamping to the bracket.

use serde::{Deserialize, Serialize};

use crate::app::ports::EepromPort;
use crate::config::DeviceConfig;
use crate::error::ValidationError;

/// Breakpoints per table, sentinels excluded.
pub const BREAKPOINTS: usize = 11;

/// Code of the upper sentinel; also the largest code a user table may hold.
pub const MAX_CODE: i32 = 32768;

/// Factory codes for channels 0–3 in the 100 ml/min range.
pub const DEFAULT_LOW_RANGE: [u16; BREAKPOINTS] = [
    3259, 3819, 4336, 4824, 5284, 5722, 6144, 6549, 6928, 7283, 7636,
];

/// Factory codes for channel 4 and for channel 3 in the 1000 ml/min range.
pub const DEFAULT_HIGH_RANGE: [u16; BREAKPOINTS] = [
    3391, 5176, 6389, 7357, 8166, 8872, 9493, 10060, 10554, 11006, 11430,
];

// ---------------------------------------------------------------------------
// Flow range
// ---------------------------------------------------------------------------

/// Full-scale selection of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FlowRange {
    /// 100 ml/min full scale.
    Low = 0,
    /// 1000 ml/min full scale.
    High = 1,
}

impl FlowRange {
    /// Largest target a host may set.
    pub const fn ceiling(self) -> f32 {
        match self {
            Self::Low => 110.0,
            Self::High => 1100.0,
        }
    }

    /// Flow reported at the upper sentinel.
    pub const fn sentinel_flow(self) -> f32 {
        match self {
            Self::Low => 500.0,
            Self::High => 3000.0,
        }
    }

    /// Flow assigned to breakpoint `index`.
    pub fn breakpoint_flow(self, index: usize) -> f32 {
        let step = match self {
            Self::Low => 10.0,
            Self::High => 100.0,
        };
        (index + 1) as f32 * step
    }

    pub const fn default_codes(self) -> [u16; BREAKPOINTS] {
        match self {
            Self::Low => DEFAULT_LOW_RANGE,
            Self::High => DEFAULT_HIGH_RANGE,
        }
    }
}

impl TryFrom<u8> for FlowRange {
    type Error = ValidationError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Low),
            1 => Ok(Self::High),
            _ => Err(ValidationError::InvalidEnum),
        }
    }
}

// ---------------------------------------------------------------------------
// Table and lookup
// ---------------------------------------------------------------------------

/// One channel's breakpoints together with the range that gives them flows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationTable {
    pub codes: [u16; BREAKPOINTS],
    pub range: FlowRange,
}

impl CalibrationTable {
    pub const fn new(codes: [u16; BREAKPOINTS], range: FlowRange) -> Self {
        Self { codes, range }
    }

    /// Flow for `raw` with no temperature correction.
    pub fn lookup(&self, raw: i32) -> f32 {
        self.lookup_corrected(raw, 0)
    }

    /// Flow for `raw` after shifting every breakpoint code down by `offset`.
    ///
    /// Corrected codes are clamped to `[0, MAX_CODE]`, which keeps the
    /// table ordered for any offset.
    pub fn lookup_corrected(&self, raw: i32, offset: i32) -> f32 {
        if raw <= 0 {
            return 0.0;
        }
        if raw >= MAX_CODE {
            return self.range.sentinel_flow();
        }

        let (mut x0, mut y0) = (0_i32, 0.0_f32);
        for (i, &code) in self.codes.iter().enumerate() {
            let x1 = i32::from(code).saturating_sub(offset).clamp(0, MAX_CODE);
            let y1 = self.range.breakpoint_flow(i);
            if raw < x1 {
                return interpolate(raw, x0, y0, x1, y1);
            }
            x0 = x1;
            y0 = y1;
        }
        interpolate(raw, x0, y0, MAX_CODE, self.range.sentinel_flow())
    }
}

/// Linear interpolation between `(x0, y0)` and `(x1, y1)`, clamped to
/// `[y0, y1]`.  Callers guarantee `x0 <= raw < x1`.
fn interpolate(raw: i32, x0: i32, y0: f32, x1: i32, y1: f32) -> f32 {
    let slope = (y1 - y0) / (x1 - x0) as f32;
    let value = (raw - x0) as f32 * slope + y0;
    value.clamp(y0, y1)
}

/// Code shift for a sensor reading against the factory reference.
pub fn temperature_offset(sensor_c: u8, reference_c: u8, scale: f32) -> i32 {
    ((f32::from(sensor_c) - f32::from(reference_c)) * scale).round() as i32
}

/// Reject user tables that are not non-decreasing or exceed `MAX_CODE`.
pub fn validate_codes(codes: &[u16; BREAKPOINTS]) -> Result<(), ValidationError> {
    let ordered = codes.windows(2).all(|w| w[0] <= w[1]);
    let bounded = codes.iter().all(|&c| i32::from(c) <= MAX_CODE);
    if ordered && bounded {
        Ok(())
    } else {
        Err(ValidationError::NonMonotonicCalibration)
    }
}

// ---------------------------------------------------------------------------
// Factory calibration (persisted)
// ---------------------------------------------------------------------------

/// Factory tables read from persistent storage at boot.
#[derive(Debug, Clone, PartialEq)]
pub struct FactoryCalibration {
    /// Channels 0–4; channel 3 holds its low-range table.
    pub channels: [[u16; BREAKPOINTS]; 5],
    /// Channel 3 in the 1000 ml/min range.
    pub channel3_high: [u16; BREAKPOINTS],
    /// Temperature at which the factory tables were recorded (°C).
    pub temperature_reference: u8,
}

impl Default for FactoryCalibration {
    fn default() -> Self {
        Self {
            channels: [
                DEFAULT_LOW_RANGE,
                DEFAULT_LOW_RANGE,
                DEFAULT_LOW_RANGE,
                DEFAULT_LOW_RANGE,
                DEFAULT_HIGH_RANGE,
            ],
            channel3_high: DEFAULT_HIGH_RANGE,
            temperature_reference: DeviceConfig::default().default_temperature_reference,
        }
    }
}

impl FactoryCalibration {
    /// Read every factory table; tables whose first word is zero fall back
    /// to the defaults.
    pub fn load(eeprom: &impl EepromPort, config: &DeviceConfig) -> Self {
        let mut cal = Self::default();
        for ch in 0..5 {
            let range = if ch == 4 { FlowRange::High } else { FlowRange::Low };
            cal.channels[ch] = read_table(eeprom, config.calibration_address(ch, false), range);
        }
        cal.channel3_high =
            read_table(eeprom, config.calibration_address(3, true), FlowRange::High);

        let reference = eeprom.read_byte(config.temperature_reference_address());
        cal.temperature_reference = match reference {
            0 | 0xFF => config.default_temperature_reference,
            r => r,
        };
        log::info!(
            "calibration: factory tables loaded (temp ref {} C)",
            cal.temperature_reference
        );
        cal
    }

    /// Re-read only channel 3's table for `range`.
    pub fn reload_channel3(
        &mut self,
        eeprom: &impl EepromPort,
        config: &DeviceConfig,
        range: FlowRange,
    ) {
        let address = config.calibration_address(3, range == FlowRange::High);
        let codes = read_table(eeprom, address, range);
        match range {
            FlowRange::Low => self.channels[3] = codes,
            FlowRange::High => self.channel3_high = codes,
        }
    }

    /// Factory table for a channel given channel 3's current range.
    pub fn table(&self, channel: usize, channel3_range: FlowRange) -> CalibrationTable {
        match channel {
            3 if channel3_range == FlowRange::High => {
                CalibrationTable::new(self.channel3_high, FlowRange::High)
            }
            4 => CalibrationTable::new(self.channels[4], FlowRange::High),
            ch => CalibrationTable::new(self.channels[ch], FlowRange::Low),
        }
    }
}

fn read_table(eeprom: &impl EepromPort, base: u16, range: FlowRange) -> [u16; BREAKPOINTS] {
    let mut codes = [0_u16; BREAKPOINTS];
    for (i, code) in codes.iter_mut().enumerate() {
        let addr = base + 2 * i as u16;
        *code = u16::from_be_bytes([eeprom.read_byte(addr), eeprom.read_byte(addr + 1)]);
    }
    if codes[0] == 0 {
        range.default_codes()
    } else {
        codes
    }
}
