//! Engine-wide configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! release = "6.2.0"
//! build_tag = "b1234"
//! services = "upload, download"
//! production = true
//! ```

use crate::error::ConfigError;
use serde::Deserialize;

/// Default maximum length of the stored request query string
pub const DEFAULT_QUERY_STRING_LIMIT: usize = 4000;

/// Default servlet path engine URLs are built from
pub const DEFAULT_SERVLET_PATH: &str = "/fox";

/// Engine identity and limits
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Release name
    pub release: String,
    /// Build tag
    pub build_tag: String,
    /// Build timestamp as text
    pub build_time: String,
    /// Comma-separated services this engine offers
    pub services: String,
    /// Production or development engine
    pub production: bool,
    /// Query strings longer than this are truncated in the system document
    pub query_string_limit: usize,
    /// Path engine URLs are built against
    pub servlet_path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            release: "development".to_string(),
            build_tag: String::new(),
            build_time: String::new(),
            services: String::new(),
            production: false,
            query_string_limit: DEFAULT_QUERY_STRING_LIMIT,
            servlet_path: DEFAULT_SERVLET_PATH.to_string(),
        }
    }
}

impl EngineConfig {
    /// Parse TOML text
    ///
    /// # Errors
    /// `ConfigError::Toml` if the text is not valid configuration
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Set release name
    #[inline]
    #[must_use]
    pub fn with_release(mut self, release: impl Into<String>) -> Self {
        self.release = release.into();
        self
    }

    /// Set build tag and time
    #[inline]
    #[must_use]
    pub fn with_build(mut self, tag: impl Into<String>, time: impl Into<String>) -> Self {
        self.build_tag = tag.into();
        self.build_time = time.into();
        self
    }

    /// Set offered services
    #[inline]
    #[must_use]
    pub fn with_services(mut self, services: impl Into<String>) -> Self {
        self.services = services.into();
        self
    }

    /// Set production flag
    #[inline]
    #[must_use]
    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    /// Set query string limit
    #[inline]
    #[must_use]
    pub fn with_query_string_limit(mut self, limit: usize) -> Self {
        self.query_string_limit = limit;
        self
    }

    /// Set servlet path
    #[inline]
    #[must_use]
    pub fn with_servlet_path(mut self, path: impl Into<String>) -> Self {
        self.servlet_path = path.into();
        self
    }

    /// Services split on commas, blanks dropped
    pub fn service_list(&self) -> impl Iterator<Item = &str> {
        self.services.split(',').map(str::trim).filter(|s| !s.is_empty())
    }

    /// `PRODUCTION` or `DEVELOPMENT`
    #[inline]
    #[must_use]
    pub fn status(&self) -> &'static str {
        if self.production {
            "PRODUCTION"
        } else {
            "DEVELOPMENT"
        }
    }
}
