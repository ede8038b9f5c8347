//! Inspection: run a trained detector on one board image, grade each defect
//! by its relative area, and emit a JSON report plus an annotated copy of the
//! image.
//!
//! The severity policy is a single threshold on `box_area / image_area`:
//! above it a defect is [`Severity::Critical`], otherwise
//! [`Severity::Minor`].

pub mod detector;
pub mod draw;
pub mod report;

use std::path::{Path, PathBuf};

use ab_glyph::FontVec;
use tracing::{error, warn};

use crate::config::PipelineConfig;
use crate::dataset::{collect_images, SplitKind};
use crate::error::PcbScanError;
use crate::geometry::{BBoxXYXY, Pixel};

pub use detector::{Detector, RawDetection, UltralyticsDetector};
pub use report::{Defect, InspectionReport, Severity};

const RESULT_PREFIX: &str = "result_";

/// Thresholds and output locations for an inspection.
#[derive(Clone, Debug, PartialEq)]
pub struct InspectOptions {
    pub confidence_threshold: f64,
    pub severity_area_threshold: f64,
    /// Directory receiving `result_<image file name>`.
    pub result_dir: PathBuf,
    pub font_path: Option<PathBuf>,
}

impl InspectOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            severity_area_threshold: config.severity_area_threshold,
            result_dir: config.result_dir.clone(),
            font_path: config.font_path.clone(),
        }
    }
}

/// A finished inspection: the report and where the annotated image went.
#[derive(Clone, Debug, PartialEq)]
pub struct Inspection {
    pub report: InspectionReport,
    pub annotated_path: PathBuf,
}

/// Inspects images with a [`Detector`].
pub struct Inspector<D> {
    detector: D,
    options: InspectOptions,
    font: Option<FontVec>,
}

impl<D: Detector> Inspector<D> {
    pub fn new(detector: D, options: InspectOptions) -> Result<Self, PcbScanError> {
        let font = options
            .font_path
            .as_deref()
            .map(draw::load_font)
            .transpose()?;

        Ok(Self {
            detector,
            options,
            font,
        })
    }

    /// Inspect one image.
    ///
    /// An image that cannot be decoded is logged and yields `Ok(None)`.
    /// Detections that violate the detector contract (unknown class,
    /// confidence outside `[0, 1]`, a box that is not finite or lies far
    /// outside the image) fail with `DetectionShape`.
    pub fn inspect(&self, image_path: &Path) -> Result<Option<Inspection>, PcbScanError> {
        let mut image = match image::open(image_path) {
            Ok(image) => image.to_rgb8(),
            Err(err) => {
                error!("Error reading {}: {err}", image_path.display());
                return Ok(None);
            }
        };

        let (width, height) = image.dimensions();
        let image_area = width as f64 * height as f64;
        let class_names = self.detector.class_names();

        let detections = self.detector.detect(
            image_path,
            width,
            height,
            self.options.confidence_threshold,
        )?;

        let mut defects = Vec::with_capacity(detections.len());
        for detection in &detections {
            validate_detection(detection, class_names.len(), width, height)?;
            if detection.confidence < self.options.confidence_threshold {
                continue;
            }

            let bbox = detection.bbox.to_integer_corners();
            let box_area = BBoxXYXY::<Pixel>::from_xyxy(
                bbox[0] as f64,
                bbox[1] as f64,
                bbox[2] as f64,
                bbox[3] as f64,
            )
            .area()
            .abs();

            defects.push(Defect {
                kind: class_names[detection.class_index].clone(),
                confidence: round_to(detection.confidence, 3),
                severity: classify_severity(
                    box_area,
                    image_area,
                    self.options.severity_area_threshold,
                ),
                bbox,
            });
        }

        let report = InspectionReport {
            source_filename: file_name(image_path),
            timestamp: chrono::Local::now()
                .format("%Y-%m-%dT%H:%M:%S%.6f")
                .to_string(),
            defects,
        };

        draw::draw_defects(&mut image, &report.defects, self.font.as_ref());
        let annotated_path = result_path(&self.options.result_dir, image_path);
        image
            .save(&annotated_path)
            .map_err(|source| PcbScanError::ImageWrite {
                path: annotated_path.clone(),
                source,
            })?;

        Ok(Some(Inspection {
            report,
            annotated_path,
        }))
    }
}

/// Inspect `image_path` with the trained checkpoint at `artifact`.
pub fn inspect(
    config: &PipelineConfig,
    artifact: &Path,
    image_path: &Path,
) -> Result<Option<Inspection>, PcbScanError> {
    config.validate()?;
    let registry = config.class_registry()?;
    let detector = UltralyticsDetector::new(&config.trainer_program, artifact, &registry)?;
    let inspector = Inspector::new(detector, InspectOptions::from_config(config))?;
    inspector.inspect(image_path)
}

/// `Critical` when the box covers more than `threshold` of the image.
pub fn classify_severity(box_area: f64, image_area: f64, threshold: f64) -> Severity {
    if image_area > 0.0 && box_area / image_area > threshold {
        Severity::Critical
    } else {
        Severity::Minor
    }
}

/// Check a detection against the detector contract.
///
/// Corners may overshoot the image by at most one image width/height on
/// each side.
pub fn validate_detection(
    detection: &RawDetection,
    class_count: usize,
    image_width: u32,
    image_height: u32,
) -> Result<(), PcbScanError> {
    if detection.class_index >= class_count {
        return Err(PcbScanError::DetectionShape {
            message: format!(
                "class index {} is out of range for {} class(es)",
                detection.class_index, class_count
            ),
        });
    }

    if !(0.0..=1.0).contains(&detection.confidence) {
        return Err(PcbScanError::DetectionShape {
            message: format!("confidence {} is outside [0, 1]", detection.confidence),
        });
    }

    if !detection.bbox.is_finite() {
        return Err(PcbScanError::DetectionShape {
            message: format!("bounding box {:?} is not finite", detection.bbox),
        });
    }

    let (w, h) = (image_width as f64, image_height as f64);
    let bbox = &detection.bbox;
    let within = |value: f64, extent: f64| (-extent..=2.0 * extent).contains(&value);
    if !(within(bbox.xmin(), w)
        && within(bbox.xmax(), w)
        && within(bbox.ymin(), h)
        && within(bbox.ymax(), h))
    {
        return Err(PcbScanError::DetectionShape {
            message: format!(
                "bounding box {bbox:?} lies far outside the {image_width}x{image_height} image"
            ),
        });
    }

    if !detection.bbox.is_ordered() {
        warn!("Detector returned an inverted box {:?}", detection.bbox);
    }

    Ok(())
}

/// `<result_dir>/result_<file name>`.
pub fn result_path(result_dir: &Path, image_path: &Path) -> PathBuf {
    result_dir.join(format!("{RESULT_PREFIX}{}", file_name(image_path)))
}

/// First `.jpg` (by name) in the validation images of a prepared dataset.
pub fn first_validation_image(output_root: &Path) -> Result<Option<PathBuf>, PcbScanError> {
    let dir = output_root.join(SplitKind::Val.images_rel_dir());
    if !dir.is_dir() {
        return Ok(None);
    }
    let images = collect_images(&dir, &["jpg".to_string()])?;
    Ok(images.into_iter().next())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
