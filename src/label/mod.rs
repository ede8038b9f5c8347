//! Normalized YOLO labels and the conversion from pixel-space annotations.
//!
//! A label line is `<class_id> <x_center> <y_center> <width> <height>`, with
//! the four coordinates normalized to the image size and written with six
//! decimal digits.

pub mod voc;

use std::fmt;
use std::path::Path;

use crate::error::PcbScanError;
use crate::geometry::{BBoxXYXY, Normalized, Pixel};
use crate::registry::ClassId;

pub use voc::{read_voc_file, VocAnnotation, VocObject};

pub const LABEL_EXTENSION: &str = "txt";

/// One normalized object label.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Label {
    pub class_id: ClassId,
    pub x_center: f64,
    pub y_center: f64,
    pub width: f64,
    pub height: f64,
}

impl Label {
    /// Normalizes a pixel box against the image size.
    ///
    /// Nothing is clamped: a box that leaves the image produces values
    /// outside `[0, 1]`.
    pub fn from_pixel_box(
        class_id: ClassId,
        bbox: &BBoxXYXY<Pixel>,
        image_width: u32,
        image_height: u32,
    ) -> Self {
        let (x_center, y_center, width, height) = bbox
            .to_normalized(image_width as f64, image_height as f64)
            .to_cxcywh();
        Self {
            class_id,
            x_center,
            y_center,
            width,
            height,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.6} {:.6} {:.6} {:.6}",
            self.class_id, self.x_center, self.y_center, self.width, self.height
        )
    }
}

/// Convert every object of an annotation into a label carrying `class_id`.
///
/// Object names embedded in the annotation are ignored. Output order matches
/// the order of `<object>` entries in the source.
pub fn convert(
    annotation: &VocAnnotation,
    image_width: u32,
    image_height: u32,
    class_id: ClassId,
) -> Vec<Label> {
    annotation
        .objects
        .iter()
        .map(|object| Label::from_pixel_box(class_id, &object.bbox, image_width, image_height))
        .collect()
}

/// Decode a VOC XML file and convert its objects.
pub fn convert_voc_file(
    path: &Path,
    image_width: u32,
    image_height: u32,
    class_id: ClassId,
) -> Result<Vec<Label>, PcbScanError> {
    let annotation = read_voc_file(path)?;
    Ok(convert(&annotation, image_width, image_height, class_id))
}

/// Render labels as label-file text: one line per label, no trailing newline.
pub fn labels_to_text(labels: &[Label]) -> String {
    labels
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// A parsed label-file row, optionally followed by a confidence column as
/// written by detector predictions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LabelRow {
    pub class_index: usize,
    pub bbox: BBoxXYXY<Normalized>,
    pub confidence: Option<f64>,
}

/// Parse one label line. Blank lines yield `Ok(None)`.
pub fn parse_label_line(
    line: &str,
    file_path: &Path,
    line_num: usize,
) -> Result<Option<LabelRow>, PcbScanError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    // Take at most 7 tokens so pathological inputs do not allocate unbounded memory.
    let tokens: Vec<&str> = trimmed.split_whitespace().take(7).collect();

    if tokens.len() < 5 || tokens.len() > 6 {
        return Err(PcbScanError::LabelParse {
            path: file_path.to_path_buf(),
            line: line_num,
            message: format!(
                "expected 5 tokens (or 6 with confidence), found {}",
                tokens.len()
            ),
        });
    }

    let class_index = tokens[0]
        .parse::<usize>()
        .map_err(|_| PcbScanError::LabelParse {
            path: file_path.to_path_buf(),
            line: line_num,
            message: format!(
                "invalid class_id '{}'; expected non-negative integer",
                tokens[0]
            ),
        })?;

    let cx = parse_f64_token(tokens[1], "x_center", file_path, line_num)?;
    let cy = parse_f64_token(tokens[2], "y_center", file_path, line_num)?;
    let w = parse_f64_token(tokens[3], "width", file_path, line_num)?;
    let h = parse_f64_token(tokens[4], "height", file_path, line_num)?;
    let confidence = tokens
        .get(5)
        .map(|raw| parse_f64_token(raw, "confidence", file_path, line_num))
        .transpose()?;

    Ok(Some(LabelRow {
        class_index,
        bbox: BBoxXYXY::from_cxcywh(cx, cy, w, h),
        confidence,
    }))
}

/// Fuzz-only entrypoint for single-line label parsing.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_label_line(input: &str) -> Result<(), PcbScanError> {
    let _ = parse_label_line(input, Path::new("<fuzz>"), 1)?;
    Ok(())
}

fn parse_f64_token(
    raw: &str,
    field_name: &str,
    file_path: &Path,
    line_num: usize,
) -> Result<f64, PcbScanError> {
    raw.parse::<f64>().map_err(|_| PcbScanError::LabelParse {
        path: file_path.to_path_buf(),
        line: line_num,
        message: format!("invalid {field_name} '{raw}'; expected floating-point number"),
    })
}
