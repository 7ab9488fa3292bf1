//! Encoder configuration.
//!
//! Supports both programmatic and file-based (JSON) configuration. The struct is
//! handed to the [`Encoder`](crate::Encoder) at construction and threaded through
//! every transformation; nothing reads configuration ambiently.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::loader::load_json;

/// Configuration for encoding JSON-API documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Base URL prepended to every generated link.
    #[serde(default)]
    pub base_url: String,

    /// Emit `links.self` on relationships.
    #[serde(default = "default_true")]
    pub relationship_links: bool,

    /// Emit `links.related` on non-polymorphic relationships.
    #[serde(default = "default_true")]
    pub related_links: bool,

    /// URL segment for relationship self links.
    #[serde(default = "default_relationships_segment")]
    pub relationships_segment: String,

    /// When the client requested any include, default includes are ignored.
    #[serde(default)]
    pub requested_includes_cancel_defaults: bool,

    /// Default includes only apply to the top-level resource(s).
    #[serde(default)]
    pub top_level_default_includes_only: bool,

    /// Derive the top resource URL from the current request URL.
    #[serde(default)]
    pub auto_top_resource_url: bool,

    /// strftime format for attributes declared as dates.
    #[serde(default = "default_datetime_format")]
    pub datetime_format: String,

    /// Merge validation messages of one field into a single error object.
    #[serde(default)]
    pub group_validation_errors: bool,

    /// Prefix of the `source.pointer` of validation errors.
    #[serde(default = "default_validation_pointer_prefix")]
    pub validation_pointer_prefix: String,

    /// Exception class name to HTTP status.
    #[serde(default)]
    pub exception_status: HashMap<String, u16>,

    /// Namespace prefix trimmed when deriving resource types.
    #[serde(default)]
    pub type_namespace_prefix: Option<String>,

    /// Separator of the `include` query parameter.
    #[serde(default = "default_separator")]
    pub include_separator: String,

    /// Separator of the `sort` query parameter.
    #[serde(default = "default_separator")]
    pub sort_separator: String,

    /// Query parameter carrying the page number in pagination links.
    #[serde(default = "default_page_parameter")]
    pub page_parameter: String,

    /// Maximum include path depth at which default includes still apply.
    #[serde(default = "default_max_include_depth")]
    pub max_include_depth: usize,
}

fn default_true() -> bool {
    true
}

fn default_relationships_segment() -> String {
    "relationships".to_string()
}

fn default_datetime_format() -> String {
    "%Y-%m-%dT%H:%M:%S%:z".to_string()
}

fn default_validation_pointer_prefix() -> String {
    "/data/attributes/".to_string()
}

fn default_separator() -> String {
    ",".to_string()
}

fn default_page_parameter() -> String {
    "page".to_string()
}

fn default_max_include_depth() -> usize {
    8
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            relationship_links: true,
            related_links: true,
            relationships_segment: default_relationships_segment(),
            requested_includes_cancel_defaults: false,
            top_level_default_includes_only: false,
            auto_top_resource_url: false,
            datetime_format: default_datetime_format(),
            group_validation_errors: false,
            validation_pointer_prefix: default_validation_pointer_prefix(),
            exception_status: HashMap::new(),
            type_namespace_prefix: None,
            include_separator: default_separator(),
            sort_separator: default_separator(),
            page_parameter: default_page_parameter(),
            max_include_depth: default_max_include_depth(),
        }
    }
}

impl EncoderConfig {
    /// Load configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let value = load_json(path.as_ref())?;
        let config: Self = serde_json::from_value(value)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.include_separator.is_empty() {
            return Err(ConfigError::Invalid("include_separator is empty".into()));
        }
        if self.sort_separator.is_empty() {
            return Err(ConfigError::Invalid("sort_separator is empty".into()));
        }
        if self.page_parameter.is_empty() {
            return Err(ConfigError::Invalid("page_parameter is empty".into()));
        }
        if self.max_include_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_include_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Join `path` onto the base URL.
    pub fn url(&self, path: &str) -> String {
        crate::link::join(&self.base_url, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults() {
        let config = EncoderConfig::default();
        assert!(config.relationship_links);
        assert!(config.related_links);
        assert_eq!(config.relationships_segment, "relationships");
        assert_eq!(config.page_parameter, "page");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: EncoderConfig = serde_json::from_str(
            r#"{ "base_url": "https://api.test", "group_validation_errors": true }"#,
        )
        .unwrap();
        assert_eq!(config.base_url, "https://api.test");
        assert!(config.group_validation_errors);
        assert_eq!(config.include_separator, ",");
        assert_eq!(config.max_include_depth, 8);
    }

    #[test]
    fn from_file_rejects_invalid() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "page_parameter": "" }}"#).unwrap();
        let result = EncoderConfig::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn from_file_missing() {
        let result = EncoderConfig::from_file("/nonexistent/config.json");
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn url_joins_base() {
        let config = EncoderConfig {
            base_url: "https://api.test/v1/".into(),
            ..Default::default()
        };
        assert_eq!(config.url("/posts/1"), "https://api.test/v1/posts/1");

        let config = EncoderConfig::default();
        assert_eq!(config.url("posts/1"), "/posts/1");
    }
}
