//! Configuration for the hardware exporter.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
///
/// Exactly one backend block must be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Seconds between sensor samples (default: 5).
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Hostname to tag metrics with, or "auto" to detect (default: "auto").
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Graphite plaintext backend.
    #[serde(default)]
    pub graphite: Option<GraphiteConfig>,

    /// Prometheus scrape endpoint backend.
    #[serde(default)]
    pub prometheus: Option<PrometheusConfig>,

    /// TimescaleDB backend.
    #[serde(default)]
    pub timescale: Option<TimescaleConfig>,

    /// InfluxDB 1.x backend.
    #[serde(default)]
    pub influx: Option<InfluxConfig>,

    /// InfluxDB 2.x backend.
    #[serde(default)]
    pub influx2: Option<Influx2Config>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Graphite plaintext protocol settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphiteConfig {
    /// Graphite server host.
    pub host: String,

    /// Graphite plaintext port (default: 2003).
    #[serde(default = "default_graphite_port")]
    pub port: u16,

    /// Metric path prefix (default: "hw").
    #[serde(default = "default_graphite_prefix")]
    pub prefix: String,

    /// Emit graphite tags instead of dotted paths (default: false).
    #[serde(default)]
    pub tags: bool,
}

/// Prometheus scrape endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Address to listen on (default: "0.0.0.0:4445").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Pushgateway base URL. When set, metrics are also pushed there.
    #[serde(default)]
    pub pushgateway_url: Option<String>,

    /// Pushgateway job name (default: "hwexport").
    #[serde(default = "default_job")]
    pub job: String,
}

/// TimescaleDB settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimescaleConfig {
    /// Postgres connection string.
    pub connection: String,

    /// Create the hypertable on first write (default: false).
    #[serde(default)]
    pub setup_table: bool,
}

/// InfluxDB 1.x settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    /// Base URL of the InfluxDB server, e.g. "http://localhost:8086".
    pub address: String,

    /// Database to write into.
    pub db: String,

    /// Optional basic auth user.
    #[serde(default)]
    pub username: Option<String>,

    /// Optional basic auth password.
    #[serde(default)]
    pub password: Option<String>,
}

/// InfluxDB 2.x settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Influx2Config {
    /// Base URL of the InfluxDB server, e.g. "http://localhost:8086".
    pub address: String,

    /// Organization name.
    pub org: String,

    /// Bucket to write into.
    pub bucket: String,

    /// API token.
    pub token: String,
}

fn default_interval() -> u64 {
    5
}

fn default_hostname() -> String {
    "auto".to_string()
}

fn default_graphite_port() -> u16 {
    2003
}

fn default_graphite_prefix() -> String {
    "hw".to_string()
}

fn default_listen() -> String {
    "0.0.0.0:4445".to_string()
}

fn default_job() -> String {
    "hwexport".to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            pushgateway_url: None,
            job: default_job(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// The single backend selected by the configuration.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    Graphite(GraphiteConfig),
    Prometheus(PrometheusConfig),
    Timescale(TimescaleConfig),
    Influx(InfluxConfig),
    Influx2(Influx2Config),
}

impl BackendConfig {
    /// Short backend name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            BackendConfig::Graphite(_) => "graphite",
            BackendConfig::Prometheus(_) => "prometheus",
            BackendConfig::Timescale(_) => "timescale",
            BackendConfig::Influx(_) => "influx",
            BackendConfig::Influx2(_) => "influx2",
        }
    }
}

impl ExportConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ExportConfig = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExportConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Select the configured backend.
    ///
    /// Zero backends and more than one backend are both rejected, so a
    /// config that names two destinations fails at startup instead of
    /// silently exporting to only one of them.
    pub fn backend(&self) -> Result<BackendConfig, ConfigError> {
        let mut configured = Vec::new();
        if self.graphite.is_some() {
            configured.push("graphite");
        }
        if self.prometheus.is_some() {
            configured.push("prometheus");
        }
        if self.timescale.is_some() {
            configured.push("timescale");
        }
        if self.influx.is_some() {
            configured.push("influx");
        }
        if self.influx2.is_some() {
            configured.push("influx2");
        }

        if configured.len() > 1 {
            return Err(ConfigError::Validation(format!(
                "Multiple backends configured ({}): exactly one is allowed",
                configured.join(", ")
            )));
        }

        if let Some(graphite) = &self.graphite {
            return Ok(BackendConfig::Graphite(graphite.clone()));
        }
        if let Some(prometheus) = &self.prometheus {
            return Ok(BackendConfig::Prometheus(prometheus.clone()));
        }
        if let Some(timescale) = &self.timescale {
            return Ok(BackendConfig::Timescale(timescale.clone()));
        }
        if let Some(influx) = &self.influx {
            return Ok(BackendConfig::Influx(influx.clone()));
        }
        if let Some(influx2) = &self.influx2 {
            return Ok(BackendConfig::Influx2(influx2.clone()));
        }

        Err(ConfigError::Validation(
            "No backend configured: add one of graphite, prometheus, timescale, influx, influx2"
                .to_string(),
        ))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "interval_secs must be > 0".to_string(),
            ));
        }

        if self.hostname.is_empty() {
            return Err(ConfigError::Validation(
                "hostname must not be empty".to_string(),
            ));
        }

        self.backend()?;

        if let Some(graphite) = &self.graphite {
            if graphite.host.is_empty() {
                return Err(ConfigError::Validation(
                    "graphite.host must not be empty".to_string(),
                ));
            }
            if graphite.prefix.is_empty() {
                return Err(ConfigError::Validation(
                    "graphite.prefix must not be empty".to_string(),
                ));
            }
        }

        if let Some(prometheus) = &self.prometheus {
            if prometheus
                .listen
                .parse::<std::net::SocketAddr>()
                .is_err()
            {
                return Err(ConfigError::Validation(format!(
                    "Invalid listen address: {}",
                    prometheus.listen
                )));
            }
            if prometheus.job.is_empty() {
                return Err(ConfigError::Validation(
                    "prometheus.job must not be empty".to_string(),
                ));
            }
            if let Some(url) = &prometheus.pushgateway_url {
                if url.is_empty() {
                    return Err(ConfigError::Validation(
                        "prometheus.pushgateway_url must not be empty".to_string(),
                    ));
                }
            }
        }

        if let Some(timescale) = &self.timescale {
            if timescale.connection.is_empty() {
                return Err(ConfigError::Validation(
                    "timescale.connection must not be empty".to_string(),
                ));
            }
        }

        if let Some(influx) = &self.influx {
            if influx.address.is_empty() {
                return Err(ConfigError::Validation(
                    "influx.address must not be empty".to_string(),
                ));
            }
            if influx.db.is_empty() {
                return Err(ConfigError::Validation(
                    "influx.db must not be empty".to_string(),
                ));
            }
        }

        if let Some(influx2) = &self.influx2 {
            if influx2.address.is_empty() {
                return Err(ConfigError::Validation(
                    "influx2.address must not be empty".to_string(),
                ));
            }
            if influx2.org.is_empty() {
                return Err(ConfigError::Validation(
                    "influx2.org must not be empty".to_string(),
                ));
            }
            if influx2.bucket.is_empty() {
                return Err(ConfigError::Validation(
                    "influx2.bucket must not be empty".to_string(),
                ));
            }
            if influx2.token.is_empty() {
                return Err(ConfigError::Validation(
                    "influx2.token must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Sampling interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Hostname to tag metrics with, resolving "auto" to the machine name.
    pub fn get_hostname(&self) -> String {
        if self.hostname == "auto" {
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".to_string())
        } else {
            self.hostname.clone()
        }
    }
}
