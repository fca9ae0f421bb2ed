//! Sensor inputs: the flowmeter ADC frame latch and the manifold NTC.

pub mod adc;
pub mod temperature;
