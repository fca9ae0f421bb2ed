//! Interrupt-to-main-loop signal queue.
//!
//! Events are produced by:
//! - the 1 ms esp_timer callback (valve countdowns, sampling, control)
//! - the ADC BUSY falling-edge ISR (frame ready on the SPI bus)
//!
//! Input edges (DI0, external valve control) are latched straight into
//! [`IsrShared`](crate::isr::IsrShared) and need no queue entry.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ esp_timer   │────▶│  Event Queue │────▶│  Main Loop   │
//! │ BUSY ISR    │────▶│  (lock-free) │     │  (consumer)  │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```

use core::sync::atomic::{AtomicU8, Ordering};

/// Maximum number of pending events.
const EVENT_QUEUE_CAP: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Event {
    /// ADC finished converting; a frame waits on the bus.
    ConversionDone = 0,
    /// 1 ms timer fired.
    Tick = 1,
}

// ── Lock-free SPSC ring buffer ────────────────────────────────
//
// ISRs write (produce), main loop reads (consume).

static EVENT_HEAD: AtomicU8 = AtomicU8::new(0);
static EVENT_TAIL: AtomicU8 = AtomicU8::new(0);
static EVENT_BUFFER: [AtomicU8; EVENT_QUEUE_CAP] = [const { AtomicU8::new(0) }; EVENT_QUEUE_CAP];

/// Push an event into the queue.
/// Safe to call from ISR context (lock-free).
/// Returns `false` if the queue is full (event dropped).
pub fn push_event(event: Event) -> bool {
    let head = EVENT_HEAD.load(Ordering::Relaxed);
    let tail = EVENT_TAIL.load(Ordering::Acquire);
    let next_head = (head + 1) % EVENT_QUEUE_CAP as u8;

    if next_head == tail {
        return false;
    }

    EVENT_BUFFER[head as usize].store(event as u8, Ordering::Relaxed);
    EVENT_HEAD.store(next_head, Ordering::Release);
    true
}

/// Pop the next event.  Single consumer: the main loop.
pub fn pop_event() -> Option<Event> {
    let tail = EVENT_TAIL.load(Ordering::Relaxed);
    let head = EVENT_HEAD.load(Ordering::Acquire);

    if tail == head {
        return None;
    }

    let raw = EVENT_BUFFER[tail as usize].load(Ordering::Relaxed);
    EVENT_TAIL.store((tail + 1) % EVENT_QUEUE_CAP as u8, Ordering::Release);

    event_from_u8(raw)
}

/// Drain all pending events into a callback, FIFO.
pub fn drain_events(mut handler: impl FnMut(Event)) {
    while let Some(event) = pop_event() {
        handler(event);
    }
}

pub fn queue_is_empty() -> bool {
    let tail = EVENT_TAIL.load(Ordering::Relaxed);
    let head = EVENT_HEAD.load(Ordering::Acquire);
    tail == head
}

fn event_from_u8(raw: u8) -> Option<Event> {
    match raw {
        0 => Some(Event::ConversionDone),
        1 => Some(Event::Tick),
        _ => None,
    }
}
