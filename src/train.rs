//! Training stage.
//!
//! Training itself belongs to the external detection library. This module
//! only builds the request (manifest + fixed hyperparameters), runs the
//! library's CLI, and reports where the best checkpoint ended up.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::PipelineConfig;
use crate::dataset::{DatasetManifest, SplitKind};
use crate::error::PcbScanError;

pub const DEFAULT_BASE_WEIGHTS: &str = "yolov8n.pt";
pub const DEFAULT_EPOCHS: u32 = 50;
pub const DEFAULT_IMAGE_SIZE: u32 = 640;
pub const DEFAULT_BATCH: u32 = 16;
pub const DEFAULT_RUN_NAME: &str = "pcb_final_model";
pub const DEFAULT_PROJECT: &str = "runs/detect";

/// Best checkpoint, relative to a run's save directory.
pub const BEST_WEIGHTS: &str = "weights/best.pt";

const SAVE_DIR_MARKER: &str = "Results saved to";

/// Hyperparameters handed to the trainer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainParams {
    /// Pretrained weights identifier the run starts from.
    pub base_weights: String,
    pub epochs: u32,
    /// Square input resolution in pixels.
    pub image_size: u32,
    pub batch: u32,
    pub run_name: String,
    /// Parent directory of run save directories.
    pub project: PathBuf,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            base_weights: DEFAULT_BASE_WEIGHTS.to_string(),
            epochs: DEFAULT_EPOCHS,
            image_size: DEFAULT_IMAGE_SIZE,
            batch: DEFAULT_BATCH,
            run_name: DEFAULT_RUN_NAME.to_string(),
            project: PathBuf::from(DEFAULT_PROJECT),
        }
    }
}

impl TrainParams {
    pub fn validate(&self) -> Result<(), PcbScanError> {
        let problem = if self.base_weights.trim().is_empty() {
            Some("train.base_weights must not be empty")
        } else if self.epochs == 0 {
            Some("train.epochs must be greater than 0")
        } else if self.image_size == 0 {
            Some("train.image_size must be greater than 0")
        } else if self.batch == 0 {
            Some("train.batch must be greater than 0")
        } else if self.run_name.trim().is_empty() {
            Some("train.run_name must not be empty")
        } else {
            None
        };

        match problem {
            Some(message) => Err(PcbScanError::InvalidConfiguration {
                message: message.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Save directory the trainer uses when it does not report one.
    pub fn default_save_dir(&self) -> PathBuf {
        self.project.join(&self.run_name)
    }
}

/// A detection-model trainer.
pub trait Trainer {
    /// Train on the dataset described by `manifest_path` and return the path
    /// of the resulting model artifact.
    fn train(&self, manifest_path: &Path, params: &TrainParams) -> Result<PathBuf, PcbScanError>;
}

/// Drives the Ultralytics `yolo` command line.
#[derive(Clone, Debug)]
pub struct UltralyticsTrainer {
    program: String,
}

impl UltralyticsTrainer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments for `yolo detect train ...`.
    pub fn command_args(manifest_path: &Path, params: &TrainParams) -> Vec<String> {
        vec![
            "detect".to_string(),
            "train".to_string(),
            format!("data={}", manifest_path.display()),
            format!("model={}", params.base_weights),
            format!("epochs={}", params.epochs),
            format!("imgsz={}", params.image_size),
            format!("batch={}", params.batch),
            format!("name={}", params.run_name),
            format!("project={}", params.project.display()),
        ]
    }
}

impl Trainer for UltralyticsTrainer {
    fn train(&self, manifest_path: &Path, params: &TrainParams) -> Result<PathBuf, PcbScanError> {
        let args = Self::command_args(manifest_path, params);
        info!("Running {} {}", self.program, args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| PcbScanError::ExternalTool {
                program: self.program.clone(),
                message: format!("failed to start: {source}"),
            })?;

        let mut reported_save_dir = None;
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let line = line.map_err(PcbScanError::Io)?;
                println!("{line}");
                if let Some(dir) = parse_save_dir(&line) {
                    reported_save_dir = Some(dir);
                }
            }
        }

        let status = child.wait().map_err(PcbScanError::Io)?;
        if !status.success() {
            return Err(PcbScanError::ExternalTool {
                program: self.program.clone(),
                message: format!("training exited with {status}"),
            });
        }

        let save_dir = reported_save_dir.unwrap_or_else(|| params.default_save_dir());
        let artifact = save_dir.join(BEST_WEIGHTS);
        if !artifact.is_file() {
            return Err(PcbScanError::ArtifactNotFound { path: artifact });
        }

        Ok(artifact)
    }
}

/// Train on the manifest written by the prepare stage.
pub fn train_dataset<T: Trainer>(
    config: &PipelineConfig,
    trainer: &T,
) -> Result<PathBuf, PcbScanError> {
    config.validate()?;

    let manifest_path = config.manifest_path();
    if !manifest_path.is_file() {
        return Err(PcbScanError::InvalidConfiguration {
            message: format!(
                "dataset manifest {} not found; run `pcbscan prepare` first",
                manifest_path.display()
            ),
        });
    }

    let manifest = DatasetManifest::read(&manifest_path)?;
    if !manifest.is_consistent() {
        return Err(PcbScanError::InvalidConfiguration {
            message: format!(
                "dataset manifest {} declares nc={} but lists {} name(s)",
                manifest_path.display(),
                manifest.nc,
                manifest.names.len()
            ),
        });
    }

    for split in SplitKind::ALL {
        let images_dir = manifest.images_dir(split);
        if !images_dir.is_dir() {
            return Err(PcbScanError::InvalidConfiguration {
                message: format!(
                    "dataset manifest {} points at missing {split} images directory {}",
                    manifest_path.display(),
                    images_dir.display()
                ),
            });
        }
    }

    info!("Training on: {}", manifest_path.display());
    trainer.train(&manifest_path, &config.train)
}

/// Extract the save directory from a trainer log line such as
/// `Results saved to \x1b[1mruns/detect/pcb_final_model2\x1b[0m`.
pub fn parse_save_dir(line: &str) -> Option<PathBuf> {
    let plain = strip_ansi(line);
    let (_, rest) = plain.split_once(SAVE_DIR_MARKER)?;
    let dir = rest.trim();
    (!dir.is_empty()).then(|| PathBuf::from(dir))
}

/// Find the newest `best.pt` among `<project>/<run_name>*` run directories.
///
/// Repeated runs with the same name get numeric suffixes (`name`, `name2`,
/// `name3`, ...); the highest suffix wins.
pub fn find_latest_artifact(params: &TrainParams) -> Result<PathBuf, PcbScanError> {
    let not_found = || PcbScanError::ArtifactNotFound {
        path: params
            .project
            .join(format!("{}*", params.run_name))
            .join(BEST_WEIGHTS),
    };

    if !params.project.is_dir() {
        return Err(not_found());
    }

    let mut candidates = Vec::new();
    for entry in fs::read_dir(&params.project).map_err(PcbScanError::Io)? {
        let entry = entry.map_err(PcbScanError::Io)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(suffix) = name.strip_prefix(&params.run_name) else {
            continue;
        };
        let artifact = entry.path().join(BEST_WEIGHTS);
        if artifact.is_file() {
            let rank = if suffix.is_empty() {
                Some(1)
            } else {
                suffix.parse::<u64>().ok()
            };
            candidates.push((rank, name, artifact));
        }
    }

    candidates.sort();
    candidates
        .pop()
        .map(|(_, _, artifact)| artifact)
        .ok_or_else(not_found)
}

fn strip_ansi(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            // CSI sequence: ESC '[' params final-byte
            if chars.next() == Some('[') {
                for next in chars.by_ref() {
                    if next.is_ascii_alphabetic() {
                        break;
                    }
                }
            }
            continue;
        }
        out.push(c);
    }
    out
}
