//! Closed-loop flow regulation.

pub mod flow;
