//! Fuzz target for label and prediction line parsing.
//!
//! Covers both the five-column label form and the six-column form with a
//! trailing confidence.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pcbscan::label::fuzz_parse_label_line;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };

    let _ = fuzz_parse_label_line(line);
});
