//! Configuration module for trainping campaigns.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Target and optional source address
//! - Probe transport (raw or datagram ICMP)
//! - Train shape (size, intra-train spacing, inter-train interval, jitter, rate)
//! - Payload size pattern and sequence export location
//!
//! Command-line flags are applied on top of a loaded file (CLI > file > defaults).

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::engine::Transport;
use crate::export::DEFAULT_EXPORT_PATH;

// =============================================================================
// Constants
// =============================================================================

/// Default number of cycles (or trains) per campaign.
pub const DEFAULT_COUNT: u64 = 10;

/// Default interval between cycles (1 second).
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

/// Default number of probes per train.
pub const DEFAULT_TRAIN_SIZE: u32 = 1;

/// Default spacing between probes of one train (100 ms).
pub const DEFAULT_TRAIN_INTERVAL: Duration = Duration::from_millis(100);

/// Largest payload an echo request may carry.
pub const MAX_PAYLOAD_SIZE: usize = 65_500;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Malformed comma-separated size pattern.
    #[error("invalid size pattern '{pattern}': '{element}' is not a size")]
    InvalidPattern { pattern: String, element: String },

    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    ValidationError(String),
}

fn default_count() -> u64 {
    DEFAULT_COUNT
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_train_size() -> u32 {
    DEFAULT_TRAIN_SIZE
}

fn default_train_interval() -> Duration {
    DEFAULT_TRAIN_INTERVAL
}

fn default_export_path() -> PathBuf {
    PathBuf::from(DEFAULT_EXPORT_PATH)
}

/// Campaign configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Target hostname or IP address.
    #[serde(default)]
    pub host: String,

    /// Source address to send probes from.
    #[serde(default)]
    pub source: Option<IpAddr>,

    /// Echo transport (default: raw).
    #[serde(default)]
    pub transport: Transport,

    /// Verbose engine diagnostics.
    #[serde(default)]
    pub debug: bool,

    /// Number of cycles to run (default: 10).
    #[serde(default = "default_count")]
    pub count: u64,

    /// Interval between cycles, also the per-probe reply deadline (default: 1s).
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Probes per train; values above 1 enable train capture (default: 1).
    #[serde(default = "default_train_size")]
    pub train_size: u32,

    /// Spacing between probes of a train (default: 100ms).
    #[serde(default = "default_train_interval", with = "humantime_serde")]
    pub train_interval: Duration,

    /// Uniform jitter bound applied to the cycle interval (default: 0).
    #[serde(default, with = "humantime_serde")]
    pub jitter: Duration,

    /// Average trains per minute; 0 keeps fixed spacing.
    #[serde(default)]
    pub rate: f64,

    /// Payload sizes cycled across probes.
    #[serde(default)]
    pub pattern: Vec<usize>,

    /// Sequence export file (train capture only).
    #[serde(default = "default_export_path")]
    pub export_path: PathBuf,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self::new("")
    }
}

impl CampaignConfig {
    /// Create a configuration for `host` with default settings.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            source: None,
            transport: Transport::default(),
            debug: false,
            count: DEFAULT_COUNT,
            interval: DEFAULT_INTERVAL,
            train_size: DEFAULT_TRAIN_SIZE,
            train_interval: DEFAULT_TRAIN_INTERVAL,
            jitter: Duration::ZERO,
            rate: 0.0,
            pattern: Vec::new(),
            export_path: default_export_path(),
        }
    }

    /// Load configuration from a YAML file.
    ///
    /// The file is not validated here since CLI overrides are applied afterwards.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "host cannot be empty".to_string(),
            ));
        }

        if self.count == 0 {
            return Err(ConfigError::ValidationError(
                "count must be positive".to_string(),
            ));
        }

        if self.train_size == 0 {
            return Err(ConfigError::ValidationError(
                "train_size must be positive".to_string(),
            ));
        }

        if !self.rate.is_finite() || self.rate < 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "rate must be a non-negative number, got {}",
                self.rate
            )));
        }

        if let Some(size) = self.pattern.iter().find(|&&s| s > MAX_PAYLOAD_SIZE) {
            return Err(ConfigError::ValidationError(format!(
                "pattern size {} exceeds maximum payload of {} bytes",
                size, MAX_PAYLOAD_SIZE
            )));
        }

        if !self.spacing_is_valid() {
            tracing::warn!(
                train_size = self.train_size,
                train_interval_ms = self.train_interval.as_millis() as u64,
                interval_ms = self.interval.as_millis() as u64,
                jitter_ms = self.jitter.as_millis() as u64,
                "Train span is not shorter than the inter-train interval minus jitter"
            );
        }

        Ok(())
    }

    /// Whether trains are enabled (more than one probe per cycle).
    pub fn trains_enabled(&self) -> bool {
        self.train_size > 1
    }

    /// Whether a train fits inside the inter-train interval minus jitter.
    ///
    /// Always true when trains are disabled.
    pub fn spacing_is_valid(&self) -> bool {
        if !self.trains_enabled() {
            return true;
        }
        let span = self.train_interval * self.train_size;
        span < self.interval.saturating_sub(self.jitter)
    }

    /// Set the probe count.
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    /// Set the inter-cycle interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the train size and intra-train spacing.
    pub fn with_train(mut self, size: u32, spacing: Duration) -> Self {
        self.train_size = size;
        self.train_interval = spacing;
        self
    }

    /// Set the jitter bound.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set the train rate (events per minute).
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    /// Set the transport.
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    /// Set the source address.
    pub fn with_source(mut self, source: IpAddr) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the payload size pattern.
    pub fn with_pattern(mut self, pattern: Vec<usize>) -> Self {
        self.pattern = pattern;
        self
    }

    /// Set the export file path.
    pub fn with_export_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.export_path = path.into();
        self
    }
}

/// Parse a comma-separated size pattern such as `"64,128,256"`.
///
/// An empty string yields an empty pattern.
pub fn parse_size_pattern(s: &str) -> Result<Vec<usize>, ConfigError> {
    if s.is_empty() {
        return Ok(Vec::new());
    }
    s.split(',')
        .map(|element| {
            element
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidPattern {
                    pattern: s.to_string(),
                    element: element.to_string(),
                })
        })
        .collect()
}
