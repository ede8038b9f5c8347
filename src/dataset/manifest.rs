//! The `data.yaml` manifest consumed by the detection trainer.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PcbScanError;
use crate::registry::ClassRegistry;

use super::SplitKind;

/// Dataset root, split image directories and class names, in the shape the
/// Ultralytics trainer expects.
///
/// Written once after every image has been materialized and never touched
/// afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetManifest {
    /// Absolute dataset root.
    pub path: PathBuf,
    /// Train images, relative to `path`.
    pub train: String,
    /// Validation images, relative to `path`.
    pub val: String,
    /// Number of classes.
    pub nc: usize,
    /// Class names in id order.
    pub names: Vec<String>,
}

impl DatasetManifest {
    pub fn new(root: &Path, registry: &ClassRegistry) -> Self {
        Self {
            path: root.to_path_buf(),
            train: SplitKind::Train.images_rel_dir(),
            val: SplitKind::Val.images_rel_dir(),
            nc: registry.len(),
            names: registry.names().to_vec(),
        }
    }

    /// True when `nc` agrees with the number of names.
    pub fn is_consistent(&self) -> bool {
        self.nc == self.names.len()
    }

    pub fn images_dir(&self, split: SplitKind) -> PathBuf {
        match split {
            SplitKind::Train => self.path.join(&self.train),
            SplitKind::Val => self.path.join(&self.val),
        }
    }

    pub fn to_yaml_string(&self, path: &Path) -> Result<String, PcbScanError> {
        serde_yaml::to_string(self).map_err(|source| PcbScanError::ManifestWrite {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn write(&self, path: &Path) -> Result<(), PcbScanError> {
        let yaml = self.to_yaml_string(path)?;
        fs::write(path, yaml).map_err(PcbScanError::Io)
    }

    pub fn read(path: &Path) -> Result<Self, PcbScanError> {
        let raw = fs::read_to_string(path).map_err(PcbScanError::Io)?;
        serde_yaml::from_str(&raw).map_err(|source| PcbScanError::ManifestParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_mirrors_registry() {
        let registry = ClassRegistry::default();
        let manifest = DatasetManifest::new(Path::new("/data/pcb"), &registry);

        assert_eq!(manifest.nc, 6);
        assert_eq!(manifest.names, registry.names());
        assert!(manifest.is_consistent());
        assert_eq!(manifest.train, "train/images");
        assert_eq!(manifest.val, "val/images");
        assert_eq!(
            manifest.images_dir(SplitKind::Val),
            PathBuf::from("/data/pcb/val/images")
        );
    }

    #[test]
    fn yaml_is_block_style_and_reads_back() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let path = temp.path().join("data.yaml");
        let registry = ClassRegistry::new(["Short", "Spur"]).expect("registry");
        let manifest = DatasetManifest::new(temp.path(), &registry);

        manifest.write(&path).expect("write manifest");
        let text = fs::read_to_string(&path).expect("read manifest");
        assert!(text.contains("train: train/images"));
        assert!(text.contains("val: val/images"));
        assert!(text.contains("nc: 2"));
        assert!(text.contains("- Short\n"));

        let restored = DatasetManifest::read(&path).expect("read back");
        assert_eq!(restored, manifest);
    }

    #[test]
    fn inconsistent_manifest_is_detected() {
        let manifest = DatasetManifest {
            path: PathBuf::from("/d"),
            train: "train/images".to_string(),
            val: "val/images".to_string(),
            nc: 3,
            names: vec!["a".to_string()],
        };
        assert!(!manifest.is_consistent());
    }
}
