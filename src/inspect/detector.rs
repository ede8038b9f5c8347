//! The external detector boundary.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::PcbScanError;
use crate::geometry::{BBoxXYXY, Pixel};
use crate::label::{parse_label_line, LABEL_EXTENSION};
use crate::registry::ClassRegistry;

const PREDICT_RUN_NAME: &str = "predict";

/// A detection as returned by the detector, before validation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawDetection {
    pub class_index: usize,
    pub confidence: f64,
    pub bbox: BBoxXYXY<Pixel>,
}

/// An object detector that runs on one image file.
pub trait Detector {
    /// Class names indexed by `RawDetection::class_index`.
    fn class_names(&self) -> &[String];

    /// Detect objects in `image_path`, whose decoded size is
    /// `image_width` x `image_height`, keeping scores >= `confidence_threshold`.
    fn detect(
        &self,
        image_path: &Path,
        image_width: u32,
        image_height: u32,
        confidence_threshold: f64,
    ) -> Result<Vec<RawDetection>, PcbScanError>;
}

/// Runs `yolo detect predict` against a trained checkpoint and reads the
/// per-image prediction text it saves.
#[derive(Clone, Debug)]
pub struct UltralyticsDetector {
    program: String,
    artifact: PathBuf,
    class_names: Vec<String>,
}

impl UltralyticsDetector {
    /// Fails with `ArtifactNotFound` when `artifact` is not a file.
    pub fn new(
        program: impl Into<String>,
        artifact: &Path,
        registry: &ClassRegistry,
    ) -> Result<Self, PcbScanError> {
        if !artifact.is_file() {
            return Err(PcbScanError::ArtifactNotFound {
                path: artifact.to_path_buf(),
            });
        }

        Ok(Self {
            program: program.into(),
            artifact: artifact.to_path_buf(),
            class_names: registry.names().to_vec(),
        })
    }

    /// Arguments for `yolo detect predict ...`, saving predictions under `project`.
    pub fn command_args(
        &self,
        image_path: &Path,
        confidence_threshold: f64,
        project: &Path,
    ) -> Vec<String> {
        vec![
            "detect".to_string(),
            "predict".to_string(),
            format!("model={}", self.artifact.display()),
            format!("source={}", image_path.display()),
            format!("conf={confidence_threshold}"),
            "save=False".to_string(),
            "save_txt=True".to_string(),
            "save_conf=True".to_string(),
            "verbose=False".to_string(),
            format!("project={}", project.display()),
            format!("name={PREDICT_RUN_NAME}"),
            "exist_ok=True".to_string(),
        ]
    }
}

impl Detector for UltralyticsDetector {
    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn detect(
        &self,
        image_path: &Path,
        image_width: u32,
        image_height: u32,
        confidence_threshold: f64,
    ) -> Result<Vec<RawDetection>, PcbScanError> {
        let scratch = tempfile::tempdir().map_err(PcbScanError::Io)?;
        let args = self.command_args(image_path, confidence_threshold, scratch.path());
        debug!("Running {} {}", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|source| PcbScanError::ExternalTool {
                program: self.program.clone(),
                message: format!("failed to start: {source}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PcbScanError::ExternalTool {
                program: self.program.clone(),
                message: format!(
                    "prediction exited with {}: {}",
                    output.status,
                    stderr.trim()
                ),
            });
        }

        let stem = image_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let prediction_file = scratch
            .path()
            .join(PREDICT_RUN_NAME)
            .join("labels")
            .join(format!("{stem}.{LABEL_EXTENSION}"));

        // No file means nothing was detected above the threshold.
        if !prediction_file.is_file() {
            return Ok(Vec::new());
        }

        read_prediction_file(&prediction_file, image_width, image_height)
    }
}

/// Read `class cx cy w h conf` rows and scale them to pixel boxes.
pub fn read_prediction_file(
    path: &Path,
    image_width: u32,
    image_height: u32,
) -> Result<Vec<RawDetection>, PcbScanError> {
    let content = fs::read_to_string(path).map_err(PcbScanError::Io)?;
    let mut detections = Vec::new();

    for (line_idx, line) in content.lines().enumerate() {
        let line_num = line_idx + 1;
        let Some(row) = parse_label_line(line, path, line_num)? else {
            continue;
        };

        let confidence = row.confidence.ok_or_else(|| PcbScanError::LabelParse {
            path: path.to_path_buf(),
            line: line_num,
            message: "prediction row has no confidence column".to_string(),
        })?;

        detections.push(RawDetection {
            class_index: row.class_index,
            confidence,
            bbox: row.bbox.to_pixel(image_width as f64, image_height as f64),
        });
    }

    Ok(detections)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_artifact_is_rejected() {
        let err = UltralyticsDetector::new(
            "yolo",
            Path::new("runs/detect/none/weights/best.pt"),
            &ClassRegistry::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PcbScanError::ArtifactNotFound { .. }));
    }

    #[test]
    fn predict_args_request_confidence_column() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let artifact = temp.path().join("best.pt");
        fs::write(&artifact, b"weights").expect("write artifact");

        let detector =
            UltralyticsDetector::new("yolo", &artifact, &ClassRegistry::default()).expect("new");
        let args = detector.command_args(Path::new("board.jpg"), 0.25, Path::new("/tmp/p"));

        assert_eq!(args[0], "detect");
        assert_eq!(args[1], "predict");
        assert!(args.contains(&"source=board.jpg".to_string()));
        assert!(args.contains(&"conf=0.25".to_string()));
        assert!(args.contains(&"save_conf=True".to_string()));
        assert!(args.contains(&"project=/tmp/p".to_string()));
        assert_eq!(detector.class_names().len(), 6);
    }

    #[test]
    fn prediction_rows_become_pixel_boxes() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let path = temp.path().join("board.txt");
        fs::write(&path, "3 0.5 0.5 0.2 0.1 0.91\n\n0 0.1 0.1 0.02 0.02 0.30\n")
            .expect("write predictions");

        let detections = read_prediction_file(&path, 1000, 500).expect("read");
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].class_index, 3);
        assert_eq!(detections[0].confidence, 0.91);
        assert!((detections[0].bbox.xmin() - 400.0).abs() < 1e-9);
        assert!((detections[0].bbox.ymax() - 275.0).abs() < 1e-9);
    }

    #[test]
    fn prediction_row_without_confidence_is_rejected() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let path = temp.path().join("board.txt");
        fs::write(&path, "3 0.5 0.5 0.2 0.1\n").expect("write predictions");

        assert!(matches!(
            read_prediction_file(&path, 100, 100),
            Err(PcbScanError::LabelParse { .. })
        ));
    }
}
