//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file at {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write configuration file
    #[error("Failed to write config file at {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML configuration
    #[error("Failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize configuration
    #[error("Failed to serialize config: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Threshold outside [0, 1]
    #[error("Invalid {name}: must be between 0.0 and 1.0, got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },

    /// Quorum of zero
    #[error("Invalid minimum quorum: must be at least 1, got {0}")]
    InvalidQuorum(usize),

    /// Invalid timeout configuration
    #[error("Invalid timeout: {name} must be positive, got {value}ms")]
    InvalidTimeout { name: &'static str, value: u64 },

    /// Window cap below the base window
    #[error("Invalid vote window: window_max_ms ({max}) is below vote_window_ms ({base})")]
    InvalidWindowCap { base: u64, max: u64 },

    /// Round limit of zero
    #[error("Invalid max rounds: must be at least 1, got {0}")]
    InvalidRounds(u32),

    /// Invalid percentage value
    #[error("Invalid {name}: must be <= 100, got {value}")]
    InvalidPercentage { name: &'static str, value: u8 },

    /// Credibility weights of one branch do not sum to 1.0
    #[error("Invalid {branch} credibility weights: must sum to 1.0, got {sum}")]
    InvalidCredibilityWeights { branch: &'static str, sum: f64 },

    /// Medium confidence threshold above the high one
    #[error("Invalid confidence thresholds: medium ({medium}) exceeds high ({high})")]
    InvalidConfidenceBands { medium: f64, high: f64 },

    /// Peer listed twice
    #[error("Duplicate peer: {0}")]
    DuplicatePeer(String),

    /// Source listed twice
    #[error("Duplicate source: {0}")]
    DuplicateSource(String),

    /// Enabled source without a feed location
    #[error("Source {0} is enabled but has no path")]
    MissingSourcePath(String),

    /// Address in a peer's threat list did not parse
    #[error("Invalid IP address in peer {peer}: {ip}")]
    InvalidPeerIp { peer: String, ip: String },

    /// Zero concurrency limit
    #[error("Invalid max_concurrent_items: must be at least 1")]
    InvalidConcurrency,

    /// History limit of zero
    #[error("Invalid max_history: must be at least 1")]
    InvalidHistoryLimit,

    /// Invalid log level
    #[error("Invalid log level: {0}. Valid values: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// Invalid log format
    #[error("Invalid log format: {0}. Valid values: text, json, compact")]
    InvalidLogFormat(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
