//! Dataset materialization: turn the raw per-class PCB dataset into a
//! YOLO `train/` + `val/` layout with one label file per image.
//!
//! Input layout:
//!
//! ```text
//! <input_root>/images/<class>/*.jpg
//! <input_root>/Annotations/<class>/*.xml   (or *.txt)
//! ```
//!
//! Output layout:
//!
//! ```text
//! <output_root>/train/images/   <output_root>/train/labels/
//! <output_root>/val/images/     <output_root>/val/labels/
//! <output_root>/data.yaml
//! ```

pub mod manifest;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{AnnotationFallback, PipelineConfig};
use crate::error::PcbScanError;
use crate::label::{self, voc::VOC_XML_EXTENSION, LABEL_EXTENSION};
use crate::registry::ClassId;
use crate::split::partition;

pub use manifest::DatasetManifest;

pub const MANIFEST_FILE_NAME: &str = "data.yaml";
pub const IMAGES_DIR: &str = "images";
pub const LABELS_DIR: &str = "labels";
pub const ANNOTATIONS_DIR: &str = "Annotations";

/// Output split.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SplitKind {
    Train,
    Val,
}

impl SplitKind {
    pub const ALL: [SplitKind; 2] = [SplitKind::Train, SplitKind::Val];

    pub fn as_str(&self) -> &'static str {
        match self {
            SplitKind::Train => "train",
            SplitKind::Val => "val",
        }
    }

    /// `train/images` or `val/images`, as recorded in the manifest.
    pub fn images_rel_dir(&self) -> String {
        format!("{}/{}", self.as_str(), IMAGES_DIR)
    }
}

impl fmt::Display for SplitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Paths inside the output dataset root.
#[derive(Clone, Debug)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self, split: SplitKind) -> PathBuf {
        self.root.join(split.as_str()).join(IMAGES_DIR)
    }

    pub fn labels_dir(&self, split: SplitKind) -> PathBuf {
        self.root.join(split.as_str()).join(LABELS_DIR)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE_NAME)
    }

    /// Delete the output root if present and create the empty split tree.
    ///
    /// Destructive: nothing previously stored under the root survives.
    pub fn recreate(&self) -> Result<(), PcbScanError> {
        if self.root.exists() {
            warn!(
                "Removing existing output directory {} before rebuilding it",
                self.root.display()
            );
            fs::remove_dir_all(&self.root).map_err(PcbScanError::Io)?;
        }

        for split in SplitKind::ALL {
            fs::create_dir_all(self.images_dir(split)).map_err(PcbScanError::Io)?;
            fs::create_dir_all(self.labels_dir(split)).map_err(PcbScanError::Io)?;
        }

        Ok(())
    }
}

/// Where an image's label comes from, in precedence order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LabelSource {
    /// A VOC XML annotation to convert.
    Structured(PathBuf),
    /// A ready-made YOLO label file to copy verbatim.
    FlatText(PathBuf),
    /// No annotation: an empty label file is written.
    Missing,
}

/// Pick the label source for the image with file stem `stem`.
pub fn resolve_label_source(annotation_dir: &Path, stem: &str) -> LabelSource {
    let xml = annotation_dir.join(format!("{stem}.{VOC_XML_EXTENSION}"));
    if xml.is_file() {
        return LabelSource::Structured(xml);
    }

    let txt = annotation_dir.join(format!("{stem}.{LABEL_EXTENSION}"));
    if txt.is_file() {
        return LabelSource::FlatText(txt);
    }

    LabelSource::Missing
}

/// Per-class outcome of a materialize run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassSummary {
    pub class_id: ClassId,
    pub name: String,
    pub train: usize,
    pub val: usize,
}

/// What a materialize run produced.
#[derive(Clone, Debug, Default)]
pub struct MaterializeReport {
    pub output_root: PathBuf,
    pub manifest_path: PathBuf,
    pub classes: Vec<ClassSummary>,
    /// Classes whose image directory was missing.
    pub skipped_classes: Vec<String>,
    /// Annotations that failed to decode and were replaced by empty labels.
    pub degraded_annotations: Vec<PathBuf>,
}

impl MaterializeReport {
    /// Number of images copied across both splits.
    pub fn total_images(&self) -> usize {
        self.classes.iter().map(|c| c.train + c.val).sum()
    }
}

impl fmt::Display for MaterializeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for class in &self.classes {
            writeln!(
                f,
                "Processing '{}': {} train, {} val",
                class.name, class.train, class.val
            )?;
        }
        writeln!(f, "SUCCESS! Processed {} images.", self.total_images())?;
        writeln!(f, "New dataset created at: {}", self.output_root.display())?;

        if !self.skipped_classes.is_empty() {
            writeln!(
                f,
                "Skipped {} class(es) with no image folder: {}",
                self.skipped_classes.len(),
                self.skipped_classes.join(", ")
            )?;
        }

        if !self.degraded_annotations.is_empty() {
            writeln!(
                f,
                "Wrote empty labels for {} unreadable annotation(s)",
                self.degraded_annotations.len()
            )?;
        }

        Ok(())
    }
}

/// Rebuild the output dataset from the raw per-class dataset.
///
/// Classes are processed in registry order. A class without an image folder
/// is skipped with a warning. Every copied image gets exactly one label file,
/// empty when the image has no annotation. A run that fails part way leaves
/// the output root partially populated.
pub fn materialize(config: &PipelineConfig) -> Result<MaterializeReport, PcbScanError> {
    config.validate()?;
    let registry = config.class_registry()?;

    let layout = OutputLayout::new(&config.output_root);
    layout.recreate()?;

    info!("Scanning '{}'...", config.input_root.display());

    let mut report = MaterializeReport {
        manifest_path: layout.manifest_path(),
        ..Default::default()
    };

    for (class_id, class_name) in registry.iter() {
        let image_dir = config.input_root.join(IMAGES_DIR).join(class_name);
        let annotation_dir = config.input_root.join(ANNOTATIONS_DIR).join(class_name);

        if !image_dir.is_dir() {
            warn!("Folder not found {}", image_dir.display());
            report.skipped_classes.push(class_name.to_string());
            continue;
        }

        let images = collect_images(&image_dir, &config.image_extensions)?;
        // Per-class seed: base seed + class id.
        let seed = config
            .seed
            .map(|seed| seed.wrapping_add(class_id.as_usize() as u64));
        let split = partition(images, config.train_fraction, seed)?;

        debug!(
            "Partitioned '{}' into {} train / {} val",
            class_name,
            split.train.len(),
            split.val.len()
        );

        let summary = ClassSummary {
            class_id,
            name: class_name.to_string(),
            train: split.train.len(),
            val: split.val.len(),
        };

        for (kind, files) in [(SplitKind::Train, split.train), (SplitKind::Val, split.val)] {
            for image_path in files {
                materialize_image(
                    &image_path,
                    kind,
                    &layout,
                    &annotation_dir,
                    class_id,
                    config.on_corrupt_annotation,
                    &mut report,
                )?;
            }
        }

        report.classes.push(summary);
    }

    let output_root = fs::canonicalize(layout.root()).map_err(PcbScanError::Io)?;
    let manifest = DatasetManifest::new(&output_root, &registry);
    manifest.write(&report.manifest_path)?;
    report.output_root = output_root;

    Ok(report)
}

fn materialize_image(
    image_path: &Path,
    split: SplitKind,
    layout: &OutputLayout,
    annotation_dir: &Path,
    class_id: ClassId,
    fallback: AnnotationFallback,
    report: &mut MaterializeReport,
) -> Result<(), PcbScanError> {
    let (file_name, stem) = file_name_and_stem(image_path)?;

    let dst_image = layout.images_dir(split).join(&file_name);
    let dst_label = layout
        .labels_dir(split)
        .join(format!("{stem}.{LABEL_EXTENSION}"));

    fs::copy(image_path, &dst_image).map_err(PcbScanError::Io)?;

    match resolve_label_source(annotation_dir, &stem) {
        LabelSource::Structured(xml_path) => {
            let (width, height) = read_image_dimensions(image_path)?;
            match label::convert_voc_file(&xml_path, width, height, class_id) {
                Ok(labels) => {
                    fs::write(&dst_label, label::labels_to_text(&labels))
                        .map_err(PcbScanError::Io)?;
                }
                Err(err @ PcbScanError::AnnotationParse { .. })
                    if fallback == AnnotationFallback::Empty =>
                {
                    warn!("{err}; writing an empty label instead");
                    fs::write(&dst_label, "").map_err(PcbScanError::Io)?;
                    report.degraded_annotations.push(xml_path);
                }
                Err(err) => return Err(err),
            }
        }
        LabelSource::FlatText(txt_path) => {
            fs::copy(&txt_path, &dst_label).map_err(PcbScanError::Io)?;
        }
        LabelSource::Missing => {
            debug!("No annotation for {}; writing empty label", image_path.display());
            fs::write(&dst_label, "").map_err(PcbScanError::Io)?;
        }
    }

    Ok(())
}

/// List image files directly inside `dir` (non-recursive), sorted by name.
pub fn collect_images(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>, PcbScanError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
        let entry = entry.map_err(|source| {
            PcbScanError::Io(std::io::Error::other(format!(
                "failed while listing {}: {source}",
                dir.display()
            )))
        })?;

        if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

/// Read an image's pixel size from its header.
pub fn read_image_dimensions(path: &Path) -> Result<(u32, u32), PcbScanError> {
    let size = imagesize::size(path).map_err(|source| PcbScanError::ImageDecode {
        path: path.to_path_buf(),
        message: source.to_string(),
    })?;

    let width: u32 = size.width.try_into().map_err(|_| PcbScanError::ImageDecode {
        path: path.to_path_buf(),
        message: format!("image width {} does not fit in u32", size.width),
    })?;
    let height: u32 = size.height.try_into().map_err(|_| PcbScanError::ImageDecode {
        path: path.to_path_buf(),
        message: format!("image height {} does not fit in u32", size.height),
    })?;

    if width == 0 || height == 0 {
        return Err(PcbScanError::ImageDecode {
            path: path.to_path_buf(),
            message: format!("image has zero size ({width}x{height})"),
        });
    }

    Ok((width, height))
}

fn has_extension(path: &Path, allowed: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };

    allowed
        .iter()
        .any(|allowed_ext| ext.eq_ignore_ascii_case(allowed_ext))
}

fn file_name_and_stem(path: &Path) -> Result<(String, String), PcbScanError> {
    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned());
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned());
    file_name.zip(stem).ok_or_else(|| {
        PcbScanError::Io(std::io::Error::other(format!(
            "image path {} has no file name",
            path.display()
        )))
    })
}
