//! Pipeline configuration.
//!
//! Every stage takes a [`PipelineConfig`]. The defaults are the fixed values
//! of the PCB defect workflow, so running a subcommand with
//! no flags and no config file behaves exactly like the hard-coded scripts.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PcbScanError;
use crate::registry::{ClassRegistry, PCB_DEFECT_CLASSES};
use crate::split::validate_train_fraction;
use crate::train::TrainParams;

pub const DEFAULT_INPUT_ROOT: &str = "dataset/PCB_DATASET";
pub const DEFAULT_OUTPUT_ROOT: &str = "dataset_fixed";
pub const DEFAULT_TRAIN_FRACTION: f64 = 0.8;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.25;
pub const DEFAULT_SEVERITY_AREA_THRESHOLD: f64 = 0.005;
pub const DEFAULT_IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "png", "jpeg", "bmp"];
pub const DEFAULT_TRAINER_PROGRAM: &str = "yolo";

/// What to do when a per-image XML annotation cannot be decoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationFallback {
    /// Abort the whole run with the parse error.
    #[default]
    Abort,
    /// Write an empty label file, log a warning and continue.
    Empty,
}

/// Configuration shared by the prepare, train and inspect stages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Raw dataset root holding `images/<class>/` and `Annotations/<class>/`.
    pub input_root: PathBuf,
    /// Output dataset root. Deleted and rebuilt by every prepare run.
    pub output_root: PathBuf,
    /// Ordered class names; the position is the class id.
    pub class_names: Vec<String>,
    pub train_fraction: f64,
    /// Fixes the train/val shuffle when set.
    pub seed: Option<u64>,
    /// Image extensions to pick up, compared case-insensitively.
    pub image_extensions: Vec<String>,
    pub on_corrupt_annotation: AnnotationFallback,
    pub confidence_threshold: f64,
    /// Box area / image area above which a defect is Critical.
    pub severity_area_threshold: f64,
    /// Executable of the external detection library's CLI.
    pub trainer_program: String,
    pub train: TrainParams,
    /// TrueType font used for box captions on annotated images.
    pub font_path: Option<PathBuf>,
    /// Directory that receives `result_<image>` files.
    pub result_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from(DEFAULT_INPUT_ROOT),
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            class_names: PCB_DEFECT_CLASSES.iter().map(|s| s.to_string()).collect(),
            train_fraction: DEFAULT_TRAIN_FRACTION,
            seed: None,
            image_extensions: DEFAULT_IMAGE_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            on_corrupt_annotation: AnnotationFallback::Abort,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            severity_area_threshold: DEFAULT_SEVERITY_AREA_THRESHOLD,
            trainer_program: DEFAULT_TRAINER_PROGRAM.to_string(),
            train: TrainParams::default(),
            font_path: None,
            result_dir: PathBuf::from("."),
        }
    }
}

impl PipelineConfig {
    /// Load a YAML config file. Keys that are absent keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, PcbScanError> {
        let raw = fs::read_to_string(path).map_err(PcbScanError::Io)?;
        Self::from_yaml_str(&raw, path)
    }

    pub fn from_yaml_str(raw: &str, path: &Path) -> Result<Self, PcbScanError> {
        serde_yaml::from_str(raw).map_err(|source| PcbScanError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check every field that a stage could trip over.
    pub fn validate(&self) -> Result<(), PcbScanError> {
        validate_train_fraction(self.train_fraction)?;
        self.class_registry()?;

        if self.image_extensions.is_empty() {
            return Err(invalid("image_extensions must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(invalid(format!(
                "confidence_threshold must be in [0.0, 1.0], got {}",
                self.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.severity_area_threshold) {
            return Err(invalid(format!(
                "severity_area_threshold must be in [0.0, 1.0], got {}",
                self.severity_area_threshold
            )));
        }
        if self.trainer_program.trim().is_empty() {
            return Err(invalid("trainer_program must not be empty"));
        }

        self.train.validate()
    }

    pub fn class_registry(&self) -> Result<ClassRegistry, PcbScanError> {
        ClassRegistry::new(self.class_names.iter().cloned())
    }

    /// Path of the manifest the prepare stage writes.
    pub fn manifest_path(&self) -> PathBuf {
        self.output_root.join(crate::dataset::MANIFEST_FILE_NAME)
    }
}

fn invalid(message: impl Into<String>) -> PcbScanError {
    PcbScanError::InvalidConfiguration {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pcb_workflow() {
        let config = PipelineConfig::default();
        assert_eq!(config.input_root, PathBuf::from("dataset/PCB_DATASET"));
        assert_eq!(config.output_root, PathBuf::from("dataset_fixed"));
        assert_eq!(config.class_names.len(), 6);
        assert_eq!(config.train_fraction, 0.8);
        assert_eq!(config.confidence_threshold, 0.25);
        assert_eq!(config.severity_area_threshold, 0.005);
        assert_eq!(config.train.epochs, 50);
        assert_eq!(config.manifest_path(), PathBuf::from("dataset_fixed/data.yaml"));
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn yaml_overrides_only_given_keys() {
        let yaml = "output_root: out\nseed: 7\nclass_names: [a, b]\ntrain:\n  epochs: 3\n";
        let config = PipelineConfig::from_yaml_str(yaml, Path::new("c.yaml")).expect("parse");
        assert_eq!(config.output_root, PathBuf::from("out"));
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.class_names, vec!["a", "b"]);
        assert_eq!(config.train.epochs, 3);
        assert_eq!(config.train.batch, 16);
        assert_eq!(config.input_root, PathBuf::from(DEFAULT_INPUT_ROOT));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = PipelineConfig::from_yaml_str("split: 0.5\n", Path::new("c.yaml")).unwrap_err();
        assert!(matches!(err, PcbScanError::ConfigParse { .. }));
    }

    #[test]
    fn fallback_parses_lowercase() {
        let config = PipelineConfig::from_yaml_str(
            "on_corrupt_annotation: empty\n",
            Path::new("c.yaml"),
        )
        .expect("parse");
        assert_eq!(config.on_corrupt_annotation, AnnotationFallback::Empty);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = PipelineConfig {
            train_fraction: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PcbScanError::InvalidConfiguration { .. })
        ));

        config.train_fraction = 0.8;
        config.confidence_threshold = -0.1;
        assert!(config.validate().is_err());

        config.confidence_threshold = 0.25;
        config.class_names.clear();
        assert!(config.validate().is_err());

        config = PipelineConfig::default();
        config.train.epochs = 0;
        assert!(config.validate().is_err());
    }
}
