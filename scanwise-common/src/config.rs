//! Configuration loading for Scanwise services
//!
//! TOML file with environment-variable override (ENV wins over TOML).
//! Every field has a default so a missing config file is not an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub services: ServiceConfig,
    pub timeouts: TimeoutConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

/// External service endpoints and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the analysis service (identity, ingredients, packaging,
    /// recommendations)
    pub analysis_base_url: String,
    /// Base URL of the scan-history backend (persistence, uploads)
    pub history_base_url: String,
    /// Bearer token for the history backend; absent means unauthenticated
    /// and scan results are not persisted
    pub api_token: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            analysis_base_url: "http://127.0.0.1:8900".to_string(),
            history_base_url: "http://127.0.0.1:8910".to_string(),
            api_token: None,
        }
    }
}

/// Client-side timeout budgets, in seconds
///
/// Only the identify and recommendation calls carry a hard per-request
/// budget. The ingredient/packaging sub-calls rely on the transport-level
/// connect timeout alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub identify_secs: u64,
    pub recommendation_secs: u64,
    pub connect_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            identify_secs: 45,
            recommendation_secs: 45,
            connect_secs: 5,
        }
    }
}

/// Scan result cache capacities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub photo_capacity: usize,
    pub barcode_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            photo_capacity: 5,
            barcode_capacity: 10,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing-subscriber env-filter directive, e.g. "info" or
    /// "scanwise_engine=debug,info"
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Load configuration from an optional TOML file, then apply ENV overrides
///
/// Recognised environment variables:
/// - `SCANWISE_ANALYSIS_URL`
/// - `SCANWISE_HISTORY_URL`
/// - `SCANWISE_API_TOKEN`
/// - `SCANWISE_LOG`
pub fn load_config(path: Option<&Path>) -> Result<TomlConfig> {
    let mut config = match path {
        Some(path) if path.exists() => {
            let content = std::fs::read_to_string(path)?;
            let parsed: TomlConfig = toml::from_str(&content)
                .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
            info!("Configuration loaded from {}", path.display());
            parsed
        }
        Some(path) => {
            warn!(
                "Config file {} not found, using defaults",
                path.display()
            );
            TomlConfig::default()
        }
        None => TomlConfig::default(),
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

fn apply_env_overrides(config: &mut TomlConfig) {
    if let Ok(url) = std::env::var("SCANWISE_ANALYSIS_URL") {
        if !url.trim().is_empty() {
            config.services.analysis_base_url = url;
            info!("Analysis service URL overridden from environment");
        }
    }
    if let Ok(url) = std::env::var("SCANWISE_HISTORY_URL") {
        if !url.trim().is_empty() {
            config.services.history_base_url = url;
            info!("History backend URL overridden from environment");
        }
    }
    if let Ok(token) = std::env::var("SCANWISE_API_TOKEN") {
        if !token.trim().is_empty() {
            config.services.api_token = Some(token);
            info!("API token loaded from environment");
        }
    }
    if let Ok(filter) = std::env::var("SCANWISE_LOG") {
        if !filter.trim().is_empty() {
            config.logging.filter = filter;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.timeouts.identify_secs, 45);
        assert_eq!(config.timeouts.recommendation_secs, 45);
        assert_eq!(config.cache.photo_capacity, 5);
        assert_eq!(config.cache.barcode_capacity, 10);
        assert!(config.services.api_token.is_none());
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_partial_toml_keeps_defaults_elsewhere() {
        let parsed: TomlConfig = toml::from_str(
            r#"
            [services]
            analysis_base_url = "https://analysis.example.com"

            [cache]
            barcode_capacity = 20
            "#,
        )
        .unwrap();
        assert_eq!(
            parsed.services.analysis_base_url,
            "https://analysis.example.com"
        );
        // untouched sections fall back to defaults
        assert_eq!(parsed.cache.photo_capacity, 5);
        assert_eq!(parsed.cache.barcode_capacity, 20);
        assert_eq!(parsed.timeouts.identify_secs, 45);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = load_config(Some(Path::new("/nonexistent/scanwise.toml"))).unwrap();
        assert_eq!(config.cache.barcode_capacity, 10);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanwise.toml");
        std::fs::write(
            &path,
            r#"
            [timeouts]
            identify_secs = 10

            [logging]
            filter = "debug"
            "#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.timeouts.identify_secs, 10);
        assert_eq!(config.logging.filter, "debug");
    }
}
