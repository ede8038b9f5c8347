//! Pascal VOC XML annotation decoding.
//!
//! Only the `<object>` entries and their `<bndbox>` are read. `<size>` is
//! ignored: image dimensions always come from the image file itself.

use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::Node;

use crate::error::PcbScanError;
use crate::geometry::{BBoxXYXY, Pixel};

pub const VOC_XML_EXTENSION: &str = "xml";

/// A decoded per-image VOC annotation.
#[derive(Clone, Debug, PartialEq)]
pub struct VocAnnotation {
    pub objects: Vec<VocObject>,
}

/// One `<object>` entry. `name` is kept for diagnostics only; class ids come
/// from the folder the image lives in.
#[derive(Clone, Debug, PartialEq)]
pub struct VocObject {
    pub name: Option<String>,
    pub bbox: BBoxXYXY<Pixel>,
}

/// Read and decode a VOC XML file.
pub fn read_voc_file(path: &Path) -> Result<VocAnnotation, PcbScanError> {
    let bytes = fs::read(path).map_err(PcbScanError::Io)?;
    let xml = std::str::from_utf8(&bytes).map_err(|source| PcbScanError::AnnotationParse {
        path: path.to_path_buf(),
        message: format!("input is not valid UTF-8: {source}"),
    })?;
    parse_voc_str(xml, path)
}

/// Decode VOC XML held in memory. `path` is only used in error messages.
pub fn parse_voc_str(xml: &str, path: &Path) -> Result<VocAnnotation, PcbScanError> {
    let document =
        roxmltree::Document::parse(xml).map_err(|source| PcbScanError::AnnotationParse {
            path: path.to_path_buf(),
            message: source.to_string(),
        })?;

    let annotation = document.root_element();
    if annotation.tag_name().name() != "annotation" {
        return Err(PcbScanError::AnnotationParse {
            path: path.to_path_buf(),
            message: format!(
                "expected <annotation> root element, found <{}>",
                annotation.tag_name().name()
            ),
        });
    }

    let mut objects = Vec::new();
    for object in annotation
        .children()
        .filter(|node| node.is_element() && node.tag_name().name() == "object")
    {
        let bndbox = child_element(object, "bndbox").ok_or_else(|| {
            PcbScanError::AnnotationParse {
                path: path.to_path_buf(),
                message: format!("missing <bndbox> in <object> #{}", objects.len() + 1),
            }
        })?;

        let xmin = parse_required_f64(bndbox, "xmin", path)?;
        let ymin = parse_required_f64(bndbox, "ymin", path)?;
        let xmax = parse_required_f64(bndbox, "xmax", path)?;
        let ymax = parse_required_f64(bndbox, "ymax", path)?;

        objects.push(VocObject {
            name: optional_child_text(object, "name"),
            bbox: BBoxXYXY::from_xyxy(xmin, ymin, xmax, ymax),
        });
    }

    Ok(VocAnnotation { objects })
}

/// Parse VOC XML from raw bytes, discarding the result.
///
/// Used by the fuzz targets and benches to exercise the decoder in memory.
pub fn from_voc_xml_slice(bytes: &[u8]) -> Result<(), PcbScanError> {
    let xml = std::str::from_utf8(bytes).map_err(|source| PcbScanError::AnnotationParse {
        path: PathBuf::from("<memory>"),
        message: format!("input is not valid UTF-8: {source}"),
    })?;
    parse_voc_str(xml, Path::new("<memory>"))?;
    Ok(())
}

fn parse_required_f64(node: Node<'_, '_>, tag: &str, path: &Path) -> Result<f64, PcbScanError> {
    let raw = optional_child_text(node, tag).ok_or_else(|| PcbScanError::AnnotationParse {
        path: path.to_path_buf(),
        message: format!("missing <{tag}> in <bndbox>"),
    })?;
    raw.parse::<f64>()
        .map_err(|_| PcbScanError::AnnotationParse {
            path: path.to_path_buf(),
            message: format!("invalid <{tag}> value '{raw}' in <bndbox>; expected a number"),
        })
}

fn child_element<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|child| child.is_element() && child.tag_name().name() == tag)
}

fn optional_child_text(node: Node<'_, '_>, tag: &str) -> Option<String> {
    child_element(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToOwned::to_owned)
}
