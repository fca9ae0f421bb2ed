//! Fuzz target: `CalibrationTable::lookup_corrected`
//!
//! Builds a table from 22 bytes (sorted so it passes validation), then
//! checks that the lookup of any code under any temperature offset stays
//! within `[0, sentinel]`.
//!
//! cargo fuzz run fuzz_calibration_lookup

#![no_main]

use libfuzzer_sys::fuzz_target;
use olfactometer::calibration::{validate_codes, CalibrationTable, FlowRange, BREAKPOINTS};

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 * BREAKPOINTS + 6 {
        return;
    }
    let (table_bytes, rest) = data.split_at(2 * BREAKPOINTS);
    let mut codes: [u16; BREAKPOINTS] =
        core::array::from_fn(|i| u16::from_le_bytes([table_bytes[2 * i], table_bytes[2 * i + 1]]) >> 1);
    codes.sort_unstable();
    if validate_codes(&codes).is_err() {
        return;
    }

    let range = if rest[0] & 1 == 0 { FlowRange::Low } else { FlowRange::High };
    let raw = i32::from(i16::from_le_bytes([rest[1], rest[2]]));
    let offset = i32::from(i8::from_le_bytes([rest[3]]));

    let table = CalibrationTable::new(codes, range);
    let flow = table.lookup_corrected(raw, offset);
    assert!(flow.is_finite());
    assert!((0.0..=range.sentinel_flow()).contains(&flow), "flow {flow} out of range");
});
