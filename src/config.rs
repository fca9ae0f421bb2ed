//! Device configuration parameters
//!
//! Tuning constants for the flow loop, PWM and calibration storage.
//! Values can be overridden via NVS (non-volatile storage).

use serde::{Deserialize, Serialize};

/// Core device configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    // --- Timing ---
    /// Ticks (1 ms) between ADC conversion triggers
    pub sampling_divider: u16,
    /// Sampling cycles between two controller steps
    pub control_period_cycles: u16,

    // --- Controller ---
    /// Proportional divisor per channel (error / gain is added to duty)
    pub gains: [f32; 5],
    /// Lowest duty the controller writes (%)
    pub duty_floor: f32,
    /// Highest duty the controller writes (%)
    pub duty_ceiling: f32,

    // --- PWM ---
    /// PWM timer input clock (Hz)
    pub system_clock_hz: u32,
    /// Minimum accepted PWM frequency (Hz)
    pub min_frequency_hz: u16,
    /// Maximum accepted PWM frequency (Hz)
    pub max_frequency_hz: u16,

    // --- Calibration storage ---
    /// First byte of the factory calibration region
    pub calibration_base: u16,
    /// Bytes between two channel tables
    pub calibration_stride: u16,
    /// Offset of the channel 3 high-range table from `calibration_base`
    pub channel3_high_offset: u16,
    /// Offset of the temperature reference byte from `calibration_base`
    pub temperature_reference_offset: u16,

    // --- Temperature compensation ---
    /// Raw codes per °C applied to low-range tables
    pub temperature_scale_low_range: f32,
    /// Raw codes per °C applied to high-range tables
    pub temperature_scale_high_range: f32,
    /// Reference used when storage holds none (°C)
    pub default_temperature_reference: u8,

    // --- External MFC ---
    /// Mirror every target-flow change to the MFC serial link
    pub mfc_link: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            // Timing
            sampling_divider: 2,      // 500 Hz conversions
            control_period_cycles: 5, // one channel every 10 ms

            // Controller
            gains: [32.0, 32.0, 32.0, 256.0, 256.0],
            duty_floor: 1.0,
            duty_ceiling: 99.0,

            // PWM
            system_clock_hz: 32_000_000,
            min_frequency_hz: 100,
            max_frequency_hz: 10_000,

            // Calibration storage
            calibration_base: 1600,
            calibration_stride: 32,
            channel3_high_offset: 160,
            temperature_reference_offset: 182,

            // Temperature compensation
            temperature_scale_low_range: 4.0,
            temperature_scale_high_range: 10.0,
            default_temperature_reference: 25,

            mfc_link: false,
        }
    }
}

impl DeviceConfig {
    /// Byte address of a channel's factory table.
    ///
    /// `high_range` only matters for channel 3, the only dual-range channel.
    pub fn calibration_address(&self, channel: usize, high_range: bool) -> u16 {
        if channel == 3 && high_range {
            self.calibration_base + self.channel3_high_offset
        } else {
            self.calibration_base + self.calibration_stride * channel as u16
        }
    }

    /// Byte address of the persisted temperature reference.
    pub fn temperature_reference_address(&self) -> u16 {
        self.calibration_base + self.temperature_reference_offset
    }
}
