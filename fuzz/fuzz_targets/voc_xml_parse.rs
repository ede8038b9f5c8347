//! Fuzz target for Pascal VOC annotation parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pcbscan::label::voc::from_voc_xml_slice;

fuzz_target!(|data: &[u8]| {
    // Cap input size to avoid excessive memory usage.
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let _ = from_voc_xml_slice(data);
});
