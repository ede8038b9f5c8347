//! Rendering defects onto the inspected image.

use std::fs;
use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use super::report::Defect;
use crate::error::PcbScanError;

pub const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BOX_THICKNESS: i64 = 2;
const LABEL_SCALE: f32 = 16.0;
const LABEL_OFFSET: i32 = 5;

/// Load a TrueType/OpenType font for box captions.
pub fn load_font(path: &Path) -> Result<FontVec, PcbScanError> {
    let bytes = fs::read(path).map_err(PcbScanError::Io)?;
    FontVec::try_from_vec(bytes).map_err(|err| PcbScanError::FontLoad {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

/// Draw a box per defect, plus `"<type> <confidence>"` above it when a font
/// is available.
pub fn draw_defects(image: &mut RgbImage, defects: &[Defect], font: Option<&FontVec>) {
    for defect in defects {
        draw_box(image, defect.bbox);

        if let Some(font) = font {
            let caption = format!("{} {:.2}", defect.kind, defect.confidence);
            let x = clamp_i32(defect.bbox[0]).max(0);
            let y = (clamp_i32(defect.bbox[1]) - LABEL_OFFSET - LABEL_SCALE as i32).max(0);
            draw_text_mut(image, BOX_COLOR, x, y, PxScale::from(LABEL_SCALE), font, &caption);
        }
    }
}

fn draw_box(image: &mut RgbImage, [x1, y1, x2, y2]: [i64; 4]) {
    let max_x = image.width() as i64 - 1;
    let max_y = image.height() as i64 - 1;
    let (x1, x2) = (x1.clamp(0, max_x), x2.clamp(0, max_x));
    let (y1, y2) = (y1.clamp(0, max_y), y2.clamp(0, max_y));

    for inset in 0..BOX_THICKNESS {
        let width = x2 - x1 + 1 - 2 * inset;
        let height = y2 - y1 + 1 - 2 * inset;
        if width <= 0 || height <= 0 {
            break;
        }
        let rect = Rect::at((x1 + inset) as i32, (y1 + inset) as i32)
            .of_size(width as u32, height as u32);
        draw_hollow_rect_mut(image, rect, BOX_COLOR);
    }
}

fn clamp_i32(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}
