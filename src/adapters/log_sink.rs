//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing application events as JSON lines
//! to the ESP-IDF logger (UART / USB-CDC in production).

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match serde_json::to_string(event) {
            Ok(json) => info!("EVENT | {}", json),
            Err(e) => warn!("EVENT | unserializable {:?}: {}", event, e),
        }
    }
}
