#![allow(dead_code)]

use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

/// Tolerance for a label round trip through six-decimal text, in pixels.
pub fn eps_label(image_w: u32, image_h: u32) -> f64 {
    image_w.max(image_h) as f64 * 1e-6
}

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// Image sizes in the range of scanned PCB boards.
pub fn arb_image_size() -> impl Strategy<Value = (u32, u32)> {
    (1u32..=4096, 1u32..=4096)
}

/// An ordered pixel box lying inside a `width` x `height` image.
pub fn arb_pixel_box(width: u32, height: u32) -> impl Strategy<Value = [f64; 4]> {
    let w = width as f64;
    let h = height as f64;
    (0.0..=w, 0.0..=w, 0.0..=h, 0.0..=h).prop_map(|(x1, x2, y1, y2)| {
        [x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2)]
    })
}

/// An image size together with up to `max_boxes` boxes inside it.
pub fn arb_annotated_image(max_boxes: usize) -> impl Strategy<Value = ((u32, u32), Vec<[f64; 4]>)> {
    arb_image_size().prop_flat_map(move |(w, h)| {
        (
            Just((w, h)),
            prop::collection::vec(arb_pixel_box(w, h), 0..=max_boxes),
        )
    })
}
