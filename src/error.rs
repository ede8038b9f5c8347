use std::path::PathBuf;
use thiserror::Error;

/// The main error type for pcbscan operations.
#[derive(Debug, Error)]
pub enum PcbScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse annotation {path}: {message}")]
    AnnotationParse { path: PathBuf, message: String },

    #[error("Failed to parse label file {path} at line {line}: {message}")]
    LabelParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to write dataset manifest {path}: {source}")]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to parse dataset manifest {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Model artifact not found at {path}")]
    ArtifactNotFound { path: PathBuf },

    #[error("Failed to decode image {path}: {message}")]
    ImageDecode { path: PathBuf, message: String },

    #[error("Failed to write image {path}: {source}")]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to load font {path}: {message}")]
    FontLoad { path: PathBuf, message: String },

    #[error("External tool '{program}' failed: {message}")]
    ExternalTool { program: String, message: String },

    #[error("Invalid detection from external detector: {message}")]
    DetectionShape { message: String },

    #[error("Failed to serialize inspection report: {0}")]
    ReportSerialize(#[from] serde_json::Error),
}
