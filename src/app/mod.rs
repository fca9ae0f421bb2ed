//! Application core — pure domain logic, zero I/O.
//!
//! The register handlers, valve sequencing, PWM duty handoff and the flow
//! controller live behind [`service::Olfactometer`].  All interaction with
//! hardware happens through **port traits** defined in [`ports`], keeping
//! this layer fully testable without real peripherals.

pub mod events;
pub mod ports;
pub mod service;
