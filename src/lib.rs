//! Olfactometer firmware library.
//!
//! Exposes the register map, valve sequencing and flow control for
//! integration testing on the host.  All ESP-IDF-specific code is guarded
//! by `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod calibration;
pub mod config;
pub mod control;
pub mod error;
pub mod events;
pub mod isr;
pub mod mfc;
pub mod registers;

pub mod pins;

// Hardware-facing modules; the peripheral code inside is cfg-gated, so
// these also build on the host with simulation stubs.
pub mod adapters;
pub mod drivers;
pub mod sensors;
