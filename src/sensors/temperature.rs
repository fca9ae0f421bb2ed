//! Manifold temperature from an NTC thermistor (10 kOhm @ 25 C, B = 3950).
//!
//! The thermistor sits in a divider with a fixed 10 kOhm resistor on
//! ADC1.  The Beta equation turns the divider resistance into degrees,
//! which the flow correction consumes as a whole-degree byte.
//!
//! On ESP-IDF the reading comes from the oneshot channel configured in
//! `hw_init`; on host a static `AtomicU16` stands in for the ADC.

use core::sync::atomic::AtomicU16;
#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::Ordering;

#[cfg(target_os = "espidf")]
use crate::drivers::hw_init;

static SIM_TEMP_ADC: AtomicU16 = AtomicU16::new(2048);

#[cfg(not(target_os = "espidf"))]
pub fn sim_set_temp_adc(raw: u16) {
    SIM_TEMP_ADC.store(raw, Ordering::Relaxed);
}

const R25: f32 = 10_000.0;
const BETA: f32 = 3950.0;
const T25_K: f32 = 298.15;
const R_DIVIDER: f32 = 10_000.0;
const ADC_MAX: f32 = 4095.0;
const V_REF: f32 = 3.3;

/// Readings within this many volts of either rail mean an open or
/// shorted thermistor.
const RAIL_MARGIN_V: f32 = 0.01;

pub struct TemperatureSensor {
    channel: u32,
}

impl TemperatureSensor {
    pub fn new(channel: u32) -> Self {
        Self { channel }
    }

    /// Current temperature, rounded and clamped to 0–255 °C.
    ///
    /// `None` when the ADC read fails or the thermistor is disconnected.
    pub fn read_celsius(&self) -> Option<u8> {
        let celsius = adc_to_celsius(self.read_adc()?)?;
        Some(celsius.round().clamp(0.0, 255.0) as u8)
    }

    #[cfg(target_os = "espidf")]
    fn read_adc(&self) -> Option<u16> {
        hw_init::adc1_read(self.channel)
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_adc(&self) -> Option<u16> {
        let _ = self.channel;
        Some(SIM_TEMP_ADC.load(Ordering::Relaxed))
    }
}

/// Divider voltage to degrees Celsius via the Beta equation.
pub fn adc_to_celsius(raw: u16) -> Option<f32> {
    let voltage = (f32::from(raw) / ADC_MAX) * V_REF;
    if voltage <= RAIL_MARGIN_V || voltage >= V_REF - RAIL_MARGIN_V {
        return None;
    }
    let r_ntc = R_DIVIDER * voltage / (V_REF - voltage);
    let inv_t = (1.0 / T25_K) + (1.0 / BETA) * (r_ntc / R25).ln();
    if inv_t <= 0.0 {
        return None;
    }
    Some((1.0 / inv_t) - 273.15)
}
