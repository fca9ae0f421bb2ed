//! Fuzz target: `Olfactometer::write` followed by ticks and a read-back.
//!
//! Input layout: `[address, type, count, data...]`.  The service must
//! never panic, whatever the address, type tag, count or payload, and
//! every accepted write must leave the register readable.
//!
//! cargo fuzz run fuzz_register_write

#![no_main]

use libfuzzer_sys::fuzz_target;
use olfactometer::app::events::AppEvent;
use olfactometer::app::ports::{EepromPort, EventSink, Line, LinePort, MfcPort, PwmPort};
use olfactometer::app::service::Olfactometer;
use olfactometer::config::DeviceConfig;
use olfactometer::drivers::pwm::PwmTiming;
use olfactometer::isr::IsrShared;
use olfactometer::registers::RegType;

#[derive(Default)]
struct NullHw {
    levels: u16,
}

fn bit(line: Line) -> u16 {
    1 << match line {
        Line::Valve(v) => v.slot(),
        Line::Out0 => 10,
        Line::Out1 => 11,
        Line::AdcConvst => 12,
    }
}

impl PwmPort for NullHw {
    fn configure(&mut self, _channel: usize, _timing: PwmTiming) {}
    fn start(&mut self, _channel: usize) {}
    fn stop(&mut self, _channel: usize) {}
    fn load_compare(&mut self, _channel: usize, _compare: u16) {}
}

impl LinePort for NullHw {
    fn set_line(&mut self, line: Line, high: bool) {
        if high {
            self.levels |= bit(line);
        } else {
            self.levels &= !bit(line);
        }
    }
    fn line_level(&self, line: Line) -> bool {
        self.levels & bit(line) != 0
    }
}

impl EepromPort for NullHw {
    fn read_byte(&self, address: u16) -> u8 {
        (address >> 3) as u8
    }
}

impl MfcPort for NullHw {
    fn send(&mut self, frame: &[u8]) {
        assert!(frame.ends_with(b"\r"));
    }
}

struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: &AppEvent) {}
}

fn reg_type(tag: u8) -> RegType {
    match tag % 4 {
        0 => RegType::U8,
        1 => RegType::U16,
        2 => RegType::I16,
        _ => RegType::Float,
    }
}

fuzz_target!(|data: &[u8]| {
    let [address, tag, count, payload @ ..] = data else {
        return;
    };
    let isr = IsrShared::new();
    let config = DeviceConfig {
        mfc_link: true,
        ..DeviceConfig::default()
    };
    let mut app = Olfactometer::new(config, &isr);
    let mut hw = NullHw::default();
    let mut sink = NullSink;
    app.boot(&mut hw, &mut sink);

    let ty = reg_type(*tag);
    let accepted = app
        .write(&mut hw, *address, ty, payload, usize::from(*count))
        .is_ok();

    for _ in 0..64 {
        app.tick(&mut hw, &mut sink);
    }

    if accepted {
        assert!(app.read(&hw, *address, ty).is_ok());
    }
    for ch in 0..5 {
        let duty = app.duty(ch);
        assert!(duty > 0.0 && duty < 100.0, "duty {duty} escaped its window");
        assert!(app.target(ch).is_finite());
    }
});
