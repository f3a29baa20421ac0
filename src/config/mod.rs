//! Configuration loading and management
//!
//! [`ApiConfig`] is a plain value handed to every component that needs it.
//! Per-request variations (such as the public base URL seen by a client)
//! are derived with [`ApiConfig::with_base_url`], which returns a new value.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Default page window applied when a request carries no `page[...]` parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct PageConfig {
    #[validate(range(min = 1))]
    pub limit: u64,

    pub offset: u64,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            offset: 0,
        }
    }
}

/// Settings shared by the query parser, serializer and paginator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_page_bounds"))]
pub struct ApiConfig {
    /// Scheme and host prepended to every generated link (no trailing slash)
    #[validate(length(min = 1))]
    pub base_url: String,

    #[validate(nested)]
    pub default_page: PageConfig,

    /// Ceiling for `page[limit]`; larger values are clamped
    #[validate(range(min = 1))]
    pub max_page_limit: u64,

    /// Maximum number of segments in an `include` path
    #[validate(range(min = 1))]
    pub max_include_depth: usize,

    /// Window, in days, for counting recently updated entries in popularity
    #[validate(range(min = 0))]
    pub recent_window_days: i64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            default_page: PageConfig::default(),
            max_page_limit: 100,
            max_include_depth: 3,
            recent_window_days: 7,
        }
    }
}

fn validate_page_bounds(config: &ApiConfig) -> std::result::Result<(), ValidationError> {
    if config.default_page.limit > config.max_page_limit {
        return Err(ValidationError::new("default_page_limit_exceeds_max"));
    }
    Ok(())
}

impl ApiConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    ///
    /// Missing keys fall back to [`ApiConfig::default`]. The result is validated.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.checked()
    }

    /// Validate the configuration, returning it unchanged on success
    pub fn checked(self) -> Result<Self> {
        self.validate()
            .map_err(|e| anyhow!("Invalid API configuration: {}", e))?;
        Ok(self)
    }

    /// Copy of this configuration with a different base URL
    ///
    /// Used when the public host is only known per request.
    pub fn with_base_url(&self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            ..self.clone()
        }
    }

    /// Absolute URL of a path below the base URL
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
