//! Pipeline configuration.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::error::{ConfigError, ConfigErrorKind, Result};

/// Configuration threaded through compilation and execution.
///
/// ```
/// use rowgraph_core::config::Config;
/// use rowgraph_core::dialect::Dialect;
///
/// let config = Config::new().dialect(Dialect::mysql()).fetch_size(500);
/// assert_eq!(config.fetch_size, Some(500));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQL dialect used for rendering.
    pub dialect: Dialect,
    /// Number of rows the connection should buffer per round trip.
    pub fetch_size: Option<usize>,
}

impl Config {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the dialect.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Set the fetch size hint.
    pub fn fetch_size(mut self, rows: usize) -> Self {
        self.fetch_size = Some(rows);
        self
    }

    /// Load a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            ConfigError::new(
                ConfigErrorKind::InvalidDefinition,
                format!("invalid configuration: {e}"),
            )
            .into()
        })
    }

    /// Process-wide default configuration, for callers that do not carry one.
    pub fn global() -> &'static Config {
        static GLOBAL: OnceLock<Config> = OnceLock::new();
        GLOBAL.get_or_init(Config::default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::PlaceholderStyle;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.dialect, Dialect::postgres());
        assert_eq!(config.fetch_size, None);
        assert_eq!(Config::global(), &config);
    }

    #[test]
    fn test_config_from_json() {
        let config = Config::from_json(
            r#"{ "dialect": { "placeholder": "question", "quote_names": false }, "fetch_size": 100 }"#,
        )
        .unwrap();
        assert_eq!(config.fetch_size, Some(100));
        assert_eq!(config.dialect.placeholder, PlaceholderStyle::Question);
        assert!(!config.dialect.quote_names);
        assert_eq!(config.dialect.quote, '"');
    }

    #[test]
    fn test_config_from_bad_json() {
        assert!(Config::from_json("[1, 2]").is_err());
    }
}
