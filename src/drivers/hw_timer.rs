//! 1 ms tick using ESP-IDF's esp_timer API.
//!
//! The callback runs in the esp_timer task (not ISR) and only pushes
//! [`Event::Tick`] into the lock-free queue.

#[cfg(target_os = "espidf")]
use crate::events::{push_event, Event};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

/// Tick period (µs).
pub const TICK_PERIOD_US: u64 = 1_000;

#[cfg(target_os = "espidf")]
static mut TICK_TIMER: esp_timer_handle_t = core::ptr::null_mut();

#[cfg(target_os = "espidf")]
unsafe extern "C" fn tick_cb(_arg: *mut core::ffi::c_void) {
    push_event(Event::Tick);
}

/// Start the periodic tick timer.
#[cfg(target_os = "espidf")]
pub fn start_timers() {
    // SAFETY: TICK_TIMER is written once here from the main task before the
    // callback can fire; the callback only calls push_event().
    unsafe {
        let args = esp_timer_create_args_t {
            callback: Some(tick_cb),
            arg: core::ptr::null_mut(),
            dispatch_method: esp_timer_dispatch_t_ESP_TIMER_TASK,
            name: b"tick\0".as_ptr() as *const _,
            skip_unhandled_events: true,
        };
        let ret = esp_timer_create(&args, &raw mut TICK_TIMER);
        if ret != ESP_OK {
            log::error!("hw_timer: tick timer create failed (rc={})", ret);
            return;
        }
        let ret = esp_timer_start_periodic(TICK_TIMER, TICK_PERIOD_US);
        if ret != ESP_OK {
            log::error!("hw_timer: tick timer start failed (rc={})", ret);
            return;
        }
        log::info!("hw_timer: tick@{}us started", TICK_PERIOD_US);
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn start_timers() {
    log::info!("hw_timer(sim): tick timer not started");
}
