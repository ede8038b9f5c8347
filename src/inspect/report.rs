//! Inspection report types.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PcbScanError;

/// Defect severity. These two levels are the whole taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    Minor,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => f.write_str("Critical"),
            Severity::Minor => f.write_str("Minor"),
        }
    }
}

/// One reported defect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Defect {
    /// Class name of the detection.
    #[serde(rename = "type")]
    pub kind: String,
    /// Detector score rounded to three decimals.
    pub confidence: f64,
    pub severity: Severity,
    /// `[x1, y1, x2, y2]` in integer pixels.
    pub bbox: [i64; 4],
}

/// Result of inspecting one image. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InspectionReport {
    #[serde(rename = "file")]
    pub source_filename: String,
    /// Local time, ISO-8601.
    pub timestamp: String,
    pub defects: Vec<Defect>,
}

impl InspectionReport {
    pub fn count(&self, severity: Severity) -> usize {
        self.defects
            .iter()
            .filter(|defect| defect.severity == severity)
            .count()
    }

    /// Pretty-printed JSON, two-space indented.
    pub fn to_json_pretty(&self) -> Result<String, PcbScanError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for InspectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} defect(s), {} critical, {} minor",
            self.source_filename,
            self.defects.len(),
            self.count(Severity::Critical),
            self.count(Severity::Minor)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InspectionReport {
        InspectionReport {
            source_filename: "01_short_03.jpg".to_string(),
            timestamp: "2026-01-02T03:04:05.000006".to_string(),
            defects: vec![
                Defect {
                    kind: "Short".to_string(),
                    confidence: 0.912,
                    severity: Severity::Critical,
                    bbox: [10, 20, 110, 220],
                },
                Defect {
                    kind: "Spur".to_string(),
                    confidence: 0.3,
                    severity: Severity::Minor,
                    bbox: [1, 2, 3, 4],
                },
            ],
        }
    }

    #[test]
    fn json_uses_report_field_names() {
        let json = sample().to_json_pretty().expect("serialize");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");

        assert_eq!(value["file"], "01_short_03.jpg");
        assert_eq!(value["defects"][0]["type"], "Short");
        assert_eq!(value["defects"][0]["severity"], "Critical");
        assert_eq!(value["defects"][1]["severity"], "Minor");
        assert_eq!(value["defects"][0]["bbox"], serde_json::json!([10, 20, 110, 220]));
        assert!(json.contains("\n  \"file\""));
    }

    #[test]
    fn display_counts_severities() {
        assert_eq!(
            sample().to_string(),
            "01_short_03.jpg: 2 defect(s), 1 critical, 1 minor"
        );
    }
}
