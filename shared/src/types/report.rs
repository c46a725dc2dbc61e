//! Report document and the naming convention linking images to reports

use serde::{Deserialize, Serialize};

/// Key prefix for uploaded images
pub const IMAGE_PREFIX: &str = "images/";

/// Key prefix for analysis reports
pub const REPORT_PREFIX: &str = "reports/";

const REPORT_SUFFIX: &str = ".json";

/// Report written by the processing service for a single image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub blob_name: String,
    pub ocr_text: String,
    pub security_analysis: String,
}

impl Report {
    pub fn new(blob_name: impl Into<String>, ocr_text: String, security_analysis: String) -> Self {
        Self {
            blob_name: blob_name.into(),
            ocr_text,
            security_analysis,
        }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }

    /// A report only counts as delivered once it carries analysis text.
    pub fn has_analysis(&self) -> bool {
        !self.security_analysis.trim().is_empty()
    }
}

pub fn image_key_for(image_id: &str) -> String {
    format!("{}{}", IMAGE_PREFIX, image_id)
}

/// Strip the image prefix. Returns `None` for keys outside `images/`.
pub fn image_id_from_key(image_key: &str) -> Option<&str> {
    image_key
        .strip_prefix(IMAGE_PREFIX)
        .filter(|id| !id.is_empty() && !id.contains('/'))
}

/// `images/{id}` maps to `reports/{id}.json`. Bare ids are accepted too.
pub fn report_key_for(image_key: &str) -> String {
    let id = image_id_from_key(image_key).unwrap_or(image_key);
    format!("{}{}{}", REPORT_PREFIX, id, REPORT_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_report_wire_format() {
        let report = Report::new(
            "images/abc",
            "hello".to_string(),
            "{\"sensitive\": false}".to_string(),
        );
        let json: serde_json::Value = serde_json::from_slice(&report.to_bytes().unwrap()).unwrap();

        assert_eq!(json["blobName"], "images/abc");
        assert_eq!(json["ocrText"], "hello");
        assert_eq!(json["securityAnalysis"], "{\"sensitive\": false}");
    }

    #[test]
    fn test_report_naming_convention() {
        assert_eq!(image_key_for("abc"), "images/abc");
        assert_eq!(report_key_for("images/abc"), "reports/abc.json");
        assert_eq!(report_key_for("abc"), "reports/abc.json");
        assert_eq!(image_id_from_key("images/abc"), Some("abc"));
        assert_eq!(image_id_from_key("reports/abc.json"), None);
        assert_eq!(image_id_from_key("images/"), None);
        assert_eq!(image_id_from_key("images/nested/abc"), None);
    }

    #[test]
    fn test_empty_analysis_is_not_delivered() {
        let report = Report::new("images/abc", "text".to_string(), "  ".to_string());
        assert!(!report.has_analysis());
    }
}
