//! Main configuration module for ThreatMesh
//!
//! This module implements the single-config philosophy where all engine
//! settings are defined in one `threatmesh.toml` file.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use threatmesh_types::{SourceKind, ThreatLevel};
use tracing::{debug, info, warn};

/// Main configuration struct containing all ThreatMesh settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Node identity
    pub node: NodeConfig,

    /// Consensus parameters and peer set
    pub consensus: ConsensusConfig,

    /// Credibility scoring parameters
    pub credibility: CredibilityConfig,

    /// Policy gate parameters
    pub policy: PolicyConfig,

    /// Evidence sources
    pub sources: Vec<SourceConfig>,

    /// Evidence store configuration
    pub store: StoreConfig,

    /// Decision export configuration
    pub export: ExportConfig,

    /// Pipeline scheduling
    pub pipeline: PipelineConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use threatmesh_config::Config;
    /// use std::path::Path;
    ///
    /// let config = Config::load(Path::new("threatmesh.toml"))?;
    /// ```
    pub fn load(path: &Path) -> ConfigResult<Self> {
        info!("Loading configuration from {:?}", path);

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content)?;

        debug!("Configuration parsed successfully, validating...");
        config.validate()?;

        info!(
            node_id = %config.node.node_id,
            peers = config.consensus.peers.len(),
            sources = config.sources.len(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Load configuration from a TOML string.
    ///
    /// Useful for testing or when configuration is provided as a string.
    pub fn from_str(content: &str) -> ConfigResult<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Checks that all values are within acceptable ranges and that
    /// the configuration is internally consistent.
    pub fn validate(&self) -> ConfigResult<()> {
        self.node.validate()?;
        self.consensus.validate()?;
        self.credibility.validate()?;
        self.policy.validate()?;

        let mut names = HashSet::new();
        for source in &self.sources {
            source.validate()?;
            if !names.insert(source.name.as_str()) {
                return Err(ConfigError::DuplicateSource(source.name.clone()));
            }
        }

        self.store.validate()?;
        self.pipeline.validate()?;
        self.logging.validate()?;

        let enabled_peers = self.consensus.enabled_peers().count();
        if enabled_peers < self.consensus.minimum_quorum {
            warn!(
                enabled_peers,
                minimum_quorum = self.consensus.minimum_quorum,
                "Fewer peers than the quorum; every round will be undetermined"
            );
        }

        debug!("Configuration validation passed");
        Ok(())
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }

    /// Default configuration plus one local and one upstream file source,
    /// as written by `threatmesh init`.
    pub fn example() -> Self {
        let mut local = SourceConfig::new("local-sensor", SourceKind::LocalSensor, FeedFormat::Canonical);
        local.path = Some(PathBuf::from("./feeds/local.json"));
        local.default_confidence = 0.6;

        let mut upstream = SourceConfig::new("upstream-stix", SourceKind::UpstreamFeed, FeedFormat::Stix);
        upstream.path = Some(PathBuf::from("./feeds/upstream-stix.json"));
        upstream.priority = 10;

        Self {
            sources: vec![local, upstream],
            store: StoreConfig {
                snapshot_path: Some(PathBuf::from("./data/evidence.json")),
                ..StoreConfig::default()
            },
            ..Self::default()
        }
    }

    /// Sources whose evidence the policy gate must ignore: explicitly
    /// ignored sources plus every disabled source.
    pub fn policy_exclusions(&self) -> BTreeSet<String> {
        let mut excluded: BTreeSet<String> = self.policy.ignored_sources.iter().cloned().collect();
        excluded.extend(
            self.sources
                .iter()
                .filter(|s| !s.enabled)
                .map(|s| s.name.clone()),
        );
        excluded
    }
}

// =============================================================================
// Node Configuration
// =============================================================================

/// Identity of this node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node identifier, used as `agent_id` for local evidence
    pub node_id: String,

    /// Deployment region
    pub region: String,

    /// Compliance regime tag stamped on local evidence
    pub compliance_tag: String,
}

impl NodeConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.node_id.trim().is_empty() {
            return Err(ConfigError::MissingField("node.node_id"));
        }
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "threatmesh-node-1".to_string(),
            region: "global".to_string(),
            compliance_tag: "global".to_string(),
        }
    }
}

// =============================================================================
// Consensus Configuration
// =============================================================================

/// Quorum vote parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Share of verifying votes needed for a positive verdict (inclusive)
    pub consensus_threshold: f64,

    /// Votes required for a non-degraded verdict
    pub minimum_quorum: usize,

    /// Vote window for the first round (milliseconds)
    pub vote_window_ms: u64,

    /// Window increment per additional round (milliseconds)
    pub window_delta_ms: u64,

    /// Upper bound on any round's window (milliseconds)
    pub window_max_ms: u64,

    /// Rounds attempted while the result stays undetermined
    pub max_rounds: u32,

    /// Random jitter added to each window, as a percentage
    #[serde(default)]
    pub jitter_percent: u8,

    /// Peer verifier nodes
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
}

impl ConsensusConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        check_unit("consensus_threshold", self.consensus_threshold)?;

        if self.minimum_quorum == 0 {
            return Err(ConfigError::InvalidQuorum(self.minimum_quorum));
        }

        if self.vote_window_ms == 0 {
            return Err(ConfigError::InvalidTimeout {
                name: "vote_window_ms",
                value: 0,
            });
        }

        if self.window_max_ms < self.vote_window_ms {
            return Err(ConfigError::InvalidWindowCap {
                base: self.vote_window_ms,
                max: self.window_max_ms,
            });
        }

        if self.max_rounds == 0 {
            return Err(ConfigError::InvalidRounds(self.max_rounds));
        }

        if self.jitter_percent > 100 {
            return Err(ConfigError::InvalidPercentage {
                name: "jitter_percent",
                value: self.jitter_percent,
            });
        }

        let mut seen = HashSet::new();
        for peer in &self.peers {
            peer.validate()?;
            if !seen.insert(peer.node_id.as_str()) {
                return Err(ConfigError::DuplicatePeer(peer.node_id.clone()));
            }
        }

        Ok(())
    }

    /// Vote window for a given round, capped at `window_max_ms`.
    pub fn vote_window(&self, round: u32) -> u64 {
        self.vote_window_ms
            .saturating_add(self.window_delta_ms.saturating_mul(round as u64))
            .min(self.window_max_ms)
    }

    /// Peers that take part in voting.
    pub fn enabled_peers(&self) -> impl Iterator<Item = &PeerConfig> {
        self.peers.iter().filter(|p| p.enabled)
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            consensus_threshold: 0.6,
            minimum_quorum: 3,
            vote_window_ms: 30_000,
            window_delta_ms: 5_000,
            window_max_ms: 60_000,
            max_rounds: 1,
            jitter_percent: 0,
            peers: (1..=3)
                .map(|i| PeerConfig::new(format!("peer-{i}")))
                .collect(),
        }
    }
}

/// A peer verifier node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Peer node identifier
    pub node_id: String,

    /// Addresses the peer already knows to be hostile
    #[serde(default)]
    pub known_threat_ips: Vec<String>,

    /// Whether the peer is asked to vote
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl PeerConfig {
    /// Create an enabled peer with no local threat knowledge.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            known_threat_ips: Vec::new(),
            enabled: true,
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.node_id.trim().is_empty() {
            return Err(ConfigError::MissingField("consensus.peers.node_id"));
        }
        for ip in &self.known_threat_ips {
            if ip.parse::<IpAddr>().is_err() {
                return Err(ConfigError::InvalidPeerIp {
                    peer: self.node_id.clone(),
                    ip: ip.clone(),
                });
            }
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Credibility Configuration
// =============================================================================

/// Credibility scoring parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredibilityConfig {
    /// Blend weights
    pub weights: CredibilityWeights,

    /// Rewrite threat levels from the final score
    #[serde(default)]
    pub adjust_threat_level: bool,

    /// Score at or above which the reported level is kept
    pub high_confidence: f64,

    /// Score at or above which the level is stepped down once; below it becomes Info
    pub medium_confidence: f64,
}

impl CredibilityConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.weights.validate()?;
        check_unit("high_confidence", self.high_confidence)?;
        check_unit("medium_confidence", self.medium_confidence)?;
        if self.medium_confidence > self.high_confidence {
            return Err(ConfigError::InvalidConfidenceBands {
                medium: self.medium_confidence,
                high: self.high_confidence,
            });
        }
        Ok(())
    }
}

impl Default for CredibilityConfig {
    fn default() -> Self {
        Self {
            weights: CredibilityWeights::default(),
            adjust_threat_level: false,
            high_confidence: 0.8,
            medium_confidence: 0.6,
        }
    }
}

/// Credibility blend weights.
///
/// The correlated branch applies when evidence carries an upstream
/// correlation; the uncorrelated branch otherwise. Each branch must sum to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredibilityWeights {
    /// Local detection weight, correlated branch
    pub correlated_local: f64,

    /// Upstream feed weight, correlated branch
    pub correlated_upstream: f64,

    /// Consensus weight, correlated branch
    pub correlated_consensus: f64,

    /// Local detection weight, uncorrelated branch
    pub uncorrelated_local: f64,

    /// Consensus weight, uncorrelated branch
    pub uncorrelated_consensus: f64,
}

impl CredibilityWeights {
    /// Validate that each branch sums to 1.0.
    pub fn validate(&self) -> ConfigResult<()> {
        for (name, value) in [
            ("correlated_local", self.correlated_local),
            ("correlated_upstream", self.correlated_upstream),
            ("correlated_consensus", self.correlated_consensus),
            ("uncorrelated_local", self.uncorrelated_local),
            ("uncorrelated_consensus", self.uncorrelated_consensus),
        ] {
            check_unit(name, value)?;
        }

        let correlated = self.correlated_local + self.correlated_upstream + self.correlated_consensus;
        // Allow small floating point tolerance
        if (correlated - 1.0).abs() > 0.0001 {
            return Err(ConfigError::InvalidCredibilityWeights {
                branch: "correlated",
                sum: correlated,
            });
        }

        let uncorrelated = self.uncorrelated_local + self.uncorrelated_consensus;
        if (uncorrelated - 1.0).abs() > 0.0001 {
            return Err(ConfigError::InvalidCredibilityWeights {
                branch: "uncorrelated",
                sum: uncorrelated,
            });
        }

        Ok(())
    }
}

impl Default for CredibilityWeights {
    fn default() -> Self {
        Self {
            correlated_local: 0.2,
            correlated_upstream: 0.5,
            correlated_consensus: 0.3,
            uncorrelated_local: 0.3,
            uncorrelated_consensus: 0.7,
        }
    }
}

// =============================================================================
// Policy Configuration
// =============================================================================

/// Policy gate parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Score at or above which evidence is blocked
    pub credibility_threshold: f64,

    /// Sources whose evidence is never acted on
    #[serde(default)]
    pub ignored_sources: Vec<String>,
}

impl PolicyConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        check_unit("credibility_threshold", self.credibility_threshold)
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            credibility_threshold: 0.7,
            ignored_sources: Vec::new(),
        }
    }
}

// =============================================================================
// Source Configuration
// =============================================================================

/// Payload format of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedFormat {
    /// JSON array of evidence drafts in the canonical field names
    #[default]
    Canonical,
    /// Generic indicator objects (`id`, `ip`, `type`, `level`, ...)
    Indicators,
    /// STIX 2.1 bundle or indicator array
    Stix,
    /// One IP per line, `#` comments
    Lines,
}

/// One evidence source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique source name
    pub name: String,

    /// Kind of collaborator behind the source
    pub kind: SourceKind,

    /// Whether the source is fetched
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Fetch order; lower first, ties broken by name
    #[serde(default)]
    pub priority: u32,

    /// Per-fetch timeout (milliseconds)
    #[serde(default = "default_source_timeout")]
    pub timeout_ms: u64,

    /// Payload format
    #[serde(default)]
    pub format: FeedFormat,

    /// Feed file location
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Initial score for entries that carry no confidence of their own
    #[serde(default = "default_confidence")]
    pub default_confidence: f64,
}

impl SourceConfig {
    /// Create an enabled source with default timing and confidence.
    pub fn new(name: impl Into<String>, kind: SourceKind, format: FeedFormat) -> Self {
        Self {
            name: name.into(),
            kind,
            enabled: true,
            priority: 0,
            timeout_ms: default_source_timeout(),
            format,
            path: None,
            default_confidence: default_confidence(),
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField("sources.name"));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout {
                name: "sources.timeout_ms",
                value: 0,
            });
        }
        check_unit("default_confidence", self.default_confidence)?;
        if self.enabled && self.path.is_none() {
            return Err(ConfigError::MissingSourcePath(self.name.clone()));
        }
        Ok(())
    }
}

fn default_source_timeout() -> u64 {
    10_000
}

fn default_confidence() -> f64 {
    0.5
}

// =============================================================================
// Store Configuration
// =============================================================================

/// Evidence store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON snapshot loaded on open and written on persist
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,

    /// Action records kept per entry; older records are dropped first
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Seconds an entry may go unreported before it is evicted (0 keeps entries forever)
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

fn default_max_history() -> usize {
    32
}

fn default_retention_secs() -> u64 {
    7 * 24 * 60 * 60
}

impl StoreConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_history == 0 {
            return Err(ConfigError::InvalidHistoryLimit);
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            max_history: default_max_history(),
            retention_secs: default_retention_secs(),
        }
    }
}

// =============================================================================
// Export Configuration
// =============================================================================

/// Decision sink outputs. Unset paths disable the sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Plain-text blocklist for firewall agents
    #[serde(default)]
    pub blocklist_file: Option<PathBuf>,

    /// JSON lines of `{ip, credibility_score}` for enforcement collaborators
    #[serde(default)]
    pub enforcement_file: Option<PathBuf>,

    /// Platform-named records for automation playbooks
    #[serde(default)]
    pub platform_file: Option<PathBuf>,

    /// Lowest severity written to the blocklist
    #[serde(default = "default_blocklist_level")]
    pub blocklist_min_level: ThreatLevel,
}

fn default_blocklist_level() -> ThreatLevel {
    ThreatLevel::Warning
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            blocklist_file: Some(PathBuf::from("./output/blocklist.txt")),
            enforcement_file: Some(PathBuf::from("./output/enforcement.jsonl")),
            platform_file: Some(PathBuf::from("./output/platform.json")),
            blocklist_min_level: default_blocklist_level(),
        }
    }
}

// =============================================================================
// Pipeline Configuration
// =============================================================================

/// Cycle scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Seconds between cycles
    pub cycle_interval_secs: u64,

    /// Evidence items evaluated concurrently
    pub max_concurrent_items: usize,

    /// Write the store snapshot after every cycle
    #[serde(default = "default_true")]
    pub persist_each_cycle: bool,
}

impl PipelineConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.cycle_interval_secs == 0 {
            return Err(ConfigError::InvalidTimeout {
                name: "cycle_interval_secs",
                value: 0,
            });
        }
        if self.max_concurrent_items == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 60,
            max_concurrent_items: 16,
            persist_each_cycle: true,
        }
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json, compact)
    pub format: String,
}

impl LoggingConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.level.clone()));
        }

        let valid_formats = ["text", "json", "compact"];
        if !valid_formats.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogFormat(self.format.clone()));
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

fn check_unit(name: &'static str, value: f64) -> ConfigResult<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidThreshold { name, value })
    }
}
