//! Configuration loading from TOML files
//!
//! Config file is selected via the `--config <path>` command line argument
//! (default: config/dev.toml). Every section and field is optional.

use crate::domain::types::TrackingMode;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Site identifier used in logs and metric labels (e.g., "warehouse-a")
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "warehouse".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    /// Minimum time a code must go unseen before it is processed again
    #[serde(default = "default_min_detection_gap_ms")]
    pub min_detection_gap_ms: u64,
    /// How long a tracked object stays active after first detection
    #[serde(default = "default_display_window_ms")]
    pub display_window_ms: u64,
    /// Frames are skipped for this long after a new object is admitted
    #[serde(default = "default_new_object_gap_ms")]
    pub new_object_gap_ms: u64,
    /// Expiry tick when the decoder is idle
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Mode in effect at startup
    #[serde(default)]
    pub default_mode: TrackingMode,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            min_detection_gap_ms: default_min_detection_gap_ms(),
            display_window_ms: default_display_window_ms(),
            new_object_gap_ms: default_new_object_gap_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            default_mode: TrackingMode::default(),
        }
    }
}

fn default_min_detection_gap_ms() -> u64 {
    500
}

fn default_display_window_ms() -> u64 {
    3000
}

fn default_new_object_gap_ms() -> u64 {
    100
}

fn default_tick_interval_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecoderConfig {
    /// Enable the decoder feed TCP listener
    #[serde(default = "default_decoder_enabled")]
    pub enabled: bool,
    #[serde(default = "default_decoder_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_decoder_port")]
    pub port: u16,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            enabled: default_decoder_enabled(),
            bind_address: default_decoder_bind_address(),
            port: default_decoder_port(),
        }
    }
}

fn default_decoder_enabled() -> bool {
    true
}

fn default_decoder_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_decoder_port() -> u16 {
    25900
}

#[derive(Debug, Clone, Deserialize)]
pub struct FirebaseConfig {
    /// Report to Firebase; when false events are only logged
    #[serde(default)]
    pub enabled: bool,
    /// Realtime Database URL (e.g., "https://project-default-rtdb.firebaseio.com")
    #[serde(default)]
    pub database_url: String,
    /// Database secret or ID token, sent as the `auth` query parameter
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_firebase_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for FirebaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            database_url: String::new(),
            auth_token: None,
            timeout_ms: default_firebase_timeout_ms(),
        }
    }
}

fn default_firebase_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    /// Pending report messages before new ones are dropped
    #[serde(default = "default_report_queue_size")]
    pub queue_size: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { queue_size: default_report_queue_size() }
    }
}

fn default_report_queue_size() -> usize {
    256
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_metrics_interval_secs(),
            prometheus_port: default_prometheus_port(),
        }
    }
}

fn default_metrics_interval_secs() -> u64 {
    10
}

fn default_prometheus_port() -> u16 {
    9090
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub firebase: FirebaseConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    min_detection_gap_ms: u64,
    display_window_ms: u64,
    new_object_gap_ms: u64,
    tick_interval_ms: u64,
    default_mode: TrackingMode,
    decoder_enabled: bool,
    decoder_bind_address: String,
    decoder_port: u16,
    firebase_enabled: bool,
    firebase_database_url: String,
    firebase_auth_token: Option<String>,
    firebase_timeout_ms: u64,
    report_queue_size: usize,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            site_id: toml_config.site.id,
            min_detection_gap_ms: toml_config.tracking.min_detection_gap_ms,
            display_window_ms: toml_config.tracking.display_window_ms,
            new_object_gap_ms: toml_config.tracking.new_object_gap_ms,
            tick_interval_ms: toml_config.tracking.tick_interval_ms,
            default_mode: toml_config.tracking.default_mode,
            decoder_enabled: toml_config.decoder.enabled,
            decoder_bind_address: toml_config.decoder.bind_address,
            decoder_port: toml_config.decoder.port,
            firebase_enabled: toml_config.firebase.enabled,
            firebase_database_url: toml_config
                .firebase
                .database_url
                .trim_end_matches('/')
                .to_string(),
            firebase_auth_token: toml_config.firebase.auth_token.filter(|t| !t.is_empty()),
            firebase_timeout_ms: toml_config.firebase.timeout_ms,
            report_queue_size: toml_config.report.queue_size.max(1),
            metrics_interval_secs: toml_config.metrics.interval_secs.max(1),
            prometheus_port: toml_config.metrics.prometheus_port,
            config_file,
        }
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig =
            toml::from_str(content).context("Failed to parse config")?;
        Ok(Self::from_toml(toml_config, "inline".to_string()))
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration from a path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn min_detection_gap_ms(&self) -> u64 {
        self.min_detection_gap_ms
    }

    pub fn display_window_ms(&self) -> u64 {
        self.display_window_ms
    }

    pub fn new_object_gap_ms(&self) -> u64 {
        self.new_object_gap_ms
    }

    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms
    }

    pub fn default_mode(&self) -> TrackingMode {
        self.default_mode
    }

    pub fn decoder_enabled(&self) -> bool {
        self.decoder_enabled
    }

    pub fn decoder_bind_address(&self) -> &str {
        &self.decoder_bind_address
    }

    pub fn decoder_port(&self) -> u16 {
        self.decoder_port
    }

    pub fn firebase_enabled(&self) -> bool {
        self.firebase_enabled
    }

    pub fn firebase_database_url(&self) -> &str {
        &self.firebase_database_url
    }

    pub fn firebase_auth_token(&self) -> Option<&str> {
        self.firebase_auth_token.as_deref()
    }

    pub fn firebase_timeout_ms(&self) -> u64 {
        self.firebase_timeout_ms
    }

    pub fn report_queue_size(&self) -> usize {
        self.report_queue_size
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set tracking timings
    #[cfg(test)]
    pub fn with_tracking(mut self, min_gap_ms: u64, display_window_ms: u64) -> Self {
        self.min_detection_gap_ms = min_gap_ms;
        self.display_window_ms = display_window_ms;
        self
    }

    /// Builder method for tests to set the new-object throttle
    #[cfg(test)]
    pub fn with_new_object_gap_ms(mut self, ms: u64) -> Self {
        self.new_object_gap_ms = ms;
        self
    }
}
