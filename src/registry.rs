//! The class registry: an ordered list of class names whose positions are
//! the integer class ids written into label files.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PcbScanError;

/// Class names of the public PCB defect dataset, in training id order.
pub const PCB_DEFECT_CLASSES: [&str; 6] = [
    "Missing_hole",
    "Mouse_bite",
    "Open_circuit",
    "Short",
    "Spur",
    "Spurious_copper",
];

/// Zero-based class index as written in YOLO label files.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(pub usize);

impl ClassId {
    #[inline]
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    #[inline]
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({})", self.0)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered, duplicate-free class names.
///
/// Built once per run and passed by reference to everything that needs a
/// class id, so the same name always maps to the same id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassRegistry {
    names: Vec<String>,
}

impl ClassRegistry {
    /// Builds a registry, rejecting empty, blank or repeated names.
    pub fn new<I, S>(names: I) -> Result<Self, PcbScanError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();

        if names.is_empty() {
            return Err(PcbScanError::InvalidConfiguration {
                message: "class list must contain at least one class".to_string(),
            });
        }

        for (idx, name) in names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(PcbScanError::InvalidConfiguration {
                    message: format!("class name at position {idx} is blank"),
                });
            }
            if names[..idx].contains(name) {
                return Err(PcbScanError::InvalidConfiguration {
                    message: format!("class name '{name}' appears more than once"),
                });
            }
        }

        Ok(Self { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Iterates classes in registry order.
    pub fn iter(&self) -> impl Iterator<Item = (ClassId, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(idx, name)| (ClassId::new(idx), name.as_str()))
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self {
            names: PCB_DEFECT_CLASSES.iter().map(|s| s.to_string()).collect(),
        }
    }
}
