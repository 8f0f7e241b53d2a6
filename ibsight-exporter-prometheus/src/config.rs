//! Configuration for the Prometheus exporter.

use ibsight_common::{LoggingConfig, SysfsConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Paths served by the router besides the metrics endpoint.
pub const RESERVED_PATHS: [&str; 2] = ["/health", "/ready"];

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Load(#[from] ibsight_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Counter filesystem settings.
    #[serde(default)]
    pub sysfs: SysfsConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// What a scrape collects and how it treats vanished counters.
    #[serde(default)]
    pub collection: CollectionConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Prometheus HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Address to listen on (default: "0.0.0.0:9401").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_listen() -> String {
    "0.0.0.0:9401".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
        }
    }
}

/// What happens to a series whose counter is absent from the latest read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbsentSeriesPolicy {
    /// Keep serving the last observed value.
    #[default]
    Retain,
    /// Drop the series until the counter shows up again.
    Remove,
}

/// Collection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Handling of series whose counter disappeared.
    #[serde(default)]
    pub absent_series: AbsentSeriesPolicy,

    /// Glob patterns for devices to include (empty = all).
    #[serde(default)]
    pub include_devices: Vec<String>,

    /// Glob patterns for devices to exclude.
    #[serde(default)]
    pub exclude_devices: Vec<String>,
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: ExporterConfig = ibsight_common::load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = ibsight_common::parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sysfs.root.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "sysfs root must not be empty".to_string(),
            ));
        }

        if self.sysfs.read_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "read_timeout_ms must be > 0".to_string(),
            ));
        }

        // Validate listen address format
        if self
            .prometheus
            .listen
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.prometheus.listen
            )));
        }

        // Validate path starts with /
        if !self.prometheus.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        if RESERVED_PATHS.contains(&self.prometheus.path.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Metrics path {} is already served by the exporter",
                self.prometheus.path
            )));
        }

        for pattern in self
            .collection
            .include_devices
            .iter()
            .chain(&self.collection.exclude_devices)
        {
            if let Err(e) = glob::Pattern::new(pattern) {
                return Err(ConfigError::Validation(format!(
                    "Invalid device pattern '{}': {}",
                    pattern, e
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ibsight_common::LogFormat;
    use std::path::PathBuf;

    #[test]
    fn test_parse_minimal_config() {
        let config = ExporterConfig::parse("{}").unwrap();

        assert_eq!(config.prometheus.listen, "0.0.0.0:9401");
        assert_eq!(config.prometheus.path, "/metrics");
        assert_eq!(config.sysfs.root, PathBuf::from("/sys"));
        assert_eq!(config.sysfs.read_timeout_ms, 5_000);
        assert_eq!(config.collection.absent_series, AbsentSeriesPolicy::Retain);
        assert!(config.collection.include_devices.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            sysfs: {
                root: "/host/sys",
                read_timeout_ms: 1500
            },
            prometheus: {
                listen: "127.0.0.1:9402",
                path: "/prometheus/metrics"
            },
            collection: {
                absent_series: "remove",
                include_devices: ["mlx5_*"],
                exclude_devices: ["mlx5_9"]
            },
            logging: {
                level: "debug",
                format: "json"
            }
        }"#;

        let config = ExporterConfig::parse(json).unwrap();

        assert_eq!(config.sysfs.root, PathBuf::from("/host/sys"));
        assert_eq!(config.sysfs.read_timeout_ms, 1500);
        assert_eq!(config.prometheus.listen, "127.0.0.1:9402");
        assert_eq!(config.prometheus.path, "/prometheus/metrics");
        assert_eq!(config.collection.absent_series, AbsentSeriesPolicy::Remove);
        assert_eq!(config.collection.include_devices, vec!["mlx5_*"]);
        assert_eq!(config.collection.exclude_devices, vec!["mlx5_9"]);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_validate_invalid_listen() {
        let json = r#"{
            prometheus: { listen: "not-an-address" }
        }"#;

        let result = ExporterConfig::parse(json);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid listen address")
        );
    }

    #[test]
    fn test_validate_invalid_path() {
        let json = r#"{
            prometheus: { path: "no-leading-slash" }
        }"#;

        let result = ExporterConfig::parse(json);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("must start with /")
        );
    }

    #[test]
    fn test_validate_zero_read_timeout() {
        let json = r#"{
            sysfs: { read_timeout_ms: 0 }
        }"#;

        assert!(ExporterConfig::parse(json).is_err());
    }

    #[test]
    fn test_validate_bad_device_pattern() {
        let json = r#"{
            collection: { exclude_devices: ["mlx5_[0"] }
        }"#;

        let err = ExporterConfig::parse(json).unwrap_err();
        assert!(err.to_string().contains("Invalid device pattern"));
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let json = r#"{
            collection: { absent_series: "zero" }
        }"#;

        assert!(matches!(
            ExporterConfig::parse(json),
            Err(ConfigError::Load(ibsight_common::Error::Config(_)))
        ));
    }

    #[test]
    fn test_validate_reserved_path() {
        for path in RESERVED_PATHS {
            let json = format!(r#"{{ prometheus: {{ path: "{}" }} }}"#, path);

            let err = ExporterConfig::parse(&json).unwrap_err();
            assert!(matches!(err, ConfigError::Validation(_)));
            assert!(err.to_string().contains("already served"));
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("exporter.json5");
        std::fs::write(
            &path,
            r#"{ sysfs: { root: "/host/sys" }, collection: { absent_series: "remove" } }"#,
        )
        .unwrap();

        let config = ExporterConfig::load_from_file(&path).unwrap();
        assert_eq!(config.sysfs.root, PathBuf::from("/host/sys"));
        assert_eq!(config.collection.absent_series, AbsentSeriesPolicy::Remove);
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = ExporterConfig::load_from_file("/nonexistent/ibsight.json5").unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
