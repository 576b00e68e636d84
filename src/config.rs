use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::providers::buildkite::{DEFAULT_BASE_URL, PAGE_SIZE};

/// Configuration file structure for buildkite-metrics.
///
/// Every value can also be given on the command line; flags win over the
/// file. Configuration files are loaded from the current directory or a
/// specified path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Buildkite API access
    #[serde(default)]
    pub buildkite: BuildkiteConfig,

    /// Which builds are queried and how they are counted
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Where metrics are published
    #[serde(default)]
    pub sink: SinkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildkiteConfig {
    /// Buildkite API access token
    pub token: Option<String>,

    /// Buildkite organization slug
    pub org: Option<String>,

    /// REST API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Builds requested per page
    #[serde(default = "default_per_page")]
    pub per_page: usize,

    /// Per-request timeout
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Retries for 429/5xx and connection failures (0 disables retrying)
    #[serde(default)]
    pub max_retries: u32,

    /// Delay between retries
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CollectionMode {
    /// Seed from recently finished builds, then query scheduled and running builds
    #[default]
    StateFiltered,
    /// One query for recently created builds, counted by activity time
    TimeWindowed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CollectorConfig {
    #[serde(default)]
    pub mode: CollectionMode,

    /// Seed window for the first state-filtered cycle
    #[serde(default = "default_initial_history_hours")]
    pub initial_history_hours: i64,

    /// Seed window for every later state-filtered cycle
    #[serde(default = "default_history_hours")]
    pub history_hours: i64,

    /// Window for time-windowed cycles
    #[serde(default = "default_window_minutes")]
    pub window_minutes: i64,

    /// Metrics namespace
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Seconds between cycles; run once when unset
    pub interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SinkBackend {
    /// Amazon CloudWatch `PutMetricData`
    Cloudwatch,
    /// JSON gateway at `sink.url`
    Http,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SinkConfig {
    /// Where metrics go; `http` when only a URL is given, else `cloudwatch`
    pub backend: Option<SinkBackend>,

    /// AWS region for CloudWatch; the standard AWS environment when unset
    pub region: Option<String>,

    /// Metrics gateway accepting PutMetricData-shaped JSON
    pub url: Option<String>,

    /// Log metrics instead of publishing them
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for BuildkiteConfig {
    fn default() -> Self {
        Self {
            token: None,
            org: None,
            base_url: default_base_url(),
            per_page: default_per_page(),
            timeout_seconds: default_timeout_seconds(),
            max_retries: 0,
            retry_delay_seconds: default_retry_delay_seconds(),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            mode: CollectionMode::default(),
            initial_history_hours: default_initial_history_hours(),
            history_hours: default_history_hours(),
            window_minutes: default_window_minutes(),
            namespace: default_namespace(),
            interval_seconds: None,
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_per_page() -> usize {
    PAGE_SIZE
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_retry_delay_seconds() -> u64 {
    5
}

fn default_initial_history_hours() -> i64 {
    24
}

fn default_history_hours() -> i64 {
    1
}

fn default_window_minutes() -> i64 {
    5
}

fn default_namespace() -> String {
    "Buildkite".to_string()
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./buildkite-metrics.toml
    /// 3. ./buildkite-metrics.json
    /// 4. ./buildkite-metrics.yaml
    /// 5. ./buildkite-metrics.yml
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = [
            "buildkite-metrics.toml",
            "buildkite-metrics.json",
            "buildkite-metrics.yaml",
            "buildkite-metrics.yml",
        ];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }
}
