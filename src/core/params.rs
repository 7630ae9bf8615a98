use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Markers;

/// Reader options suitable for config files and CLI presets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Prefix marking attribute keys in the decoded document
    pub attribute_marker: String,
    /// Key holding element text content
    pub text_key: String,
    /// Attribute naming the part of a composite (complex/magnitude) value
    pub discriminator: String,
    /// Attributes never copied into dataset metadata
    pub ignored_attributes: Vec<String>,
    /// Upper bound on concurrently evaluated layout rules; None means sequential
    pub max_parallelism: Option<usize>,
    /// Compute every reader node at open instead of on first access
    pub eager: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        let markers = Markers::default();
        Self {
            attribute_marker: markers.attribute,
            text_key: markers.text,
            discriminator: markers.discriminator,
            ignored_attributes: ["@xmlns", "@xmlns:rcm", "@xmlns:xsi", "@xsi:schemaLocation"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_parallelism: None,
            eager: false,
        }
    }
}

impl ReaderOptions {
    pub fn markers(&self) -> Markers {
        Markers {
            attribute: self.attribute_marker.clone(),
            text: self.text_key.clone(),
            discriminator: self.discriminator.clone(),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let opts = ReaderOptions::from_json_str(r#"{"max_parallelism": 4}"#).unwrap();
        assert_eq!(opts.max_parallelism, Some(4));
        assert_eq!(opts.markers(), Markers::default());
        assert!(opts.ignored_attributes.contains(&"@xmlns".to_string()));
    }

    #[test]
    fn malformed_config_is_reported() {
        let err = ReaderOptions::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }
}
