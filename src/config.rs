use crate::search::duration::deserialize_duration;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Scan engine configuration
    pub search: SearchConfig,

    /// Artifact corpus location and URI layout
    pub artifacts: ArtifactsConfig,

    /// Job listing source
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the embedded defaults, an optional file and the environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/ci-search.toml".to_string());
        Self::load_from(&config_path)
    }

    /// Load configuration using an explicit override file path
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(config_path).required(false))
            // Override with environment variables (prefix: CI_SEARCH_)
            .add_source(
                config::Environment::with_prefix("CI_SEARCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Configuration used when nothing can be loaded
    pub fn embedded() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Deadline for a single search request (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Absolute ceiling for the `maxAge` request parameter
    #[serde(
        default = "default_max_age",
        deserialize_with = "deserialize_duration"
    )]
    pub max_age: Duration,

    /// Number of artifacts scanned concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the queue between scan workers and the aggregator
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactsConfig {
    /// Directory holding the artifact corpus
    pub root: PathBuf,

    /// Prefix joined with a run directory to form the job URI
    pub job_uri_prefix: String,

    /// Prefix joined with a bug number to form the bug URI
    pub bug_uri_prefix: String,

    /// Prefix joined with an issue key to form the issue URI
    pub issue_uri_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// JSON job list; `/jobs` is unavailable without it
    pub path: Option<PathBuf>,

    /// How often the job list is reloaded (seconds)
    #[serde(default = "default_jobs_refresh")]
    pub refresh_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            path: None,
            refresh_secs: default_jobs_refresh(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,

    /// Service name
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    120
}

fn default_max_age() -> Duration {
    Duration::from_secs(14 * 24 * 3600)
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().clamp(2, 16))
        .unwrap_or(4)
}

fn default_queue_depth() -> usize {
    256
}

fn default_jobs_refresh() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "ci-search".to_string()
}

fn default_true() -> bool {
    true
}
