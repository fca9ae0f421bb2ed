//! Actuator drivers, hardware initialisation, and peripheral helpers.

pub mod digital_io;
pub mod hw_init;
pub mod hw_timer;
pub mod pwm;
pub mod valves;
