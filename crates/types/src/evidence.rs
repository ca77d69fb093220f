//! Threat evidence model.
//!
//! [`EvidenceDraft`] is the loosely-typed shape sources hand in;
//! [`ThreatEvidence`] is the validated record every other component works
//! with. Conversion is the single place required fields are enforced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use crate::hash::EvidenceHash;
use crate::threat::{ThreatLevel, ThreatType};
use crate::{Result, TypesError};

/// Target address used for items that are not tied to one protected host.
pub const GLOBAL_TARGET: &str = "global";

/// Placeholder for fields a source did not report.
pub const UNKNOWN: &str = "unknown";

/// Prefix of the context tag written by credibility enhancement.
pub const CREDIBILITY_TAG: &str = "[CREDIBILITY:";

/// Kind of collaborator that produced a piece of evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Detection on this node
    LocalSensor,
    /// Independent trusted external feed
    UpstreamFeed,
    /// Report relayed from another network node
    PeerNode,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::LocalSensor => write!(f, "local_sensor"),
            SourceKind::UpstreamFeed => write!(f, "upstream_feed"),
            SourceKind::PeerNode => write!(f, "peer_node"),
        }
    }
}

/// Where a piece of evidence came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvidenceOrigin {
    /// Configured source name
    pub source: String,
    /// Kind of source
    pub kind: SourceKind,
}

impl EvidenceOrigin {
    /// Create an origin.
    pub fn new(source: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            source: source.into(),
            kind,
        }
    }

    /// Whether this origin is an upstream trusted feed.
    pub fn is_upstream(&self) -> bool {
        self.kind == SourceKind::UpstreamFeed
    }
}

/// An independent trusted-feed hit matched against a piece of evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamCorrelation {
    /// Feed that reported the matching indicator
    pub feed: String,
    /// Id of the matching upstream evidence
    pub indicator_id: String,
    /// Feed confidence in [0, 1]
    pub confidence: f64,
}

/// Validated threat evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatEvidence {
    /// Content hash of the normalized payload (hex)
    pub id: String,
    /// Offending address
    pub source_ip: String,
    /// Targeted address, `global` for upstream items
    pub target_ip: String,
    /// Threat category
    pub threat_type: ThreatType,
    /// Threat severity
    pub threat_level: ThreatLevel,
    /// Observation time
    pub timestamp: DateTime<Utc>,
    /// Final credibility in [0, 1]; 0 until enhanced
    pub credibility_score: f64,
    /// Whether a quorum of peers verified this evidence
    pub consensus_verified: bool,
    /// Human readable description
    pub context: String,
    /// Digest over the full payload for tamper evidence
    pub evidence_hash: EvidenceHash,
    /// Geolocation of `source_ip`, if known
    pub geolocation: String,
    /// Flow or pattern the detection was based on
    pub network_flow: String,
    /// Reporting agent
    pub agent_id: String,
    /// Compliance regime tag
    pub compliance_tag: String,
    /// Deployment region
    pub region: String,
    /// Local detection confidence in [0, 1]
    pub initial_score: f64,
    /// Source that produced this evidence
    pub origin: EvidenceOrigin,
    /// Matched upstream correlation, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<UpstreamCorrelation>,
}

impl ThreatEvidence {
    /// Create evidence with defaults for the descriptive fields and a computed id.
    pub fn new(
        source_ip: impl Into<String>,
        threat_type: ThreatType,
        threat_level: ThreatLevel,
        origin: EvidenceOrigin,
    ) -> Self {
        let target_ip = if origin.is_upstream() {
            GLOBAL_TARGET
        } else {
            UNKNOWN
        };
        let mut evidence = Self {
            id: String::new(),
            source_ip: source_ip.into(),
            target_ip: target_ip.to_string(),
            threat_type,
            threat_level,
            timestamp: Utc::now(),
            credibility_score: 0.0,
            consensus_verified: false,
            context: String::new(),
            evidence_hash: EvidenceHash::ZERO,
            geolocation: UNKNOWN.to_string(),
            network_flow: String::new(),
            agent_id: origin.source.clone(),
            compliance_tag: "global".to_string(),
            region: "global".to_string(),
            initial_score: 0.5,
            origin,
            upstream: None,
        };
        evidence.seal();
        evidence
    }

    /// Set the target address.
    pub fn with_target(mut self, target_ip: impl Into<String>) -> Self {
        self.target_ip = target_ip.into();
        self.seal();
        self
    }

    /// Set the context text.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self.seal();
        self
    }

    /// Set the network flow / pattern.
    pub fn with_network_flow(mut self, flow: impl Into<String>) -> Self {
        self.network_flow = flow.into();
        self.seal();
        self
    }

    /// Set the local detection confidence.
    pub fn with_initial_score(mut self, score: f64) -> Self {
        self.initial_score = score;
        self.seal();
        self
    }

    /// Set the observation time.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self.seal();
        self
    }

    /// Set the reporting agent.
    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self.seal();
        self
    }

    /// Attach an upstream correlation.
    pub fn with_upstream(mut self, correlation: UpstreamCorrelation) -> Self {
        self.upstream = Some(correlation);
        self
    }

    /// Identity hash: the fields that make two reports "the same observation".
    ///
    /// Severity, context and timestamps are excluded so re-reports of one
    /// observation land on the same id and merge.
    pub fn content_id(&self) -> EvidenceHash {
        EvidenceHash::keccak256_concat(&[
            self.origin.source.as_bytes(),
            self.source_ip.as_bytes(),
            self.target_ip.as_bytes(),
            self.threat_type.as_str().as_bytes(),
            self.network_flow.as_bytes(),
        ])
    }

    /// Digest over the reported payload, excluding the observation time.
    ///
    /// Two reports with the same digest differ at most in when they were seen.
    pub fn report_digest(&self) -> EvidenceHash {
        let initial = self.initial_score.to_bits().to_be_bytes();
        EvidenceHash::keccak256_concat(&[
            self.id.as_bytes(),
            self.threat_level.as_str().as_bytes(),
            self.context.as_bytes(),
            self.geolocation.as_bytes(),
            self.agent_id.as_bytes(),
            self.compliance_tag.as_bytes(),
            self.region.as_bytes(),
            &initial,
        ])
    }

    /// Digest over the full reported payload.
    pub fn payload_hash(&self) -> EvidenceHash {
        let timestamp = self.timestamp.to_rfc3339();
        EvidenceHash::keccak256_concat(&[self.report_digest().as_bytes(), timestamp.as_bytes()])
    }

    /// Recompute `id` and `evidence_hash` from the current payload.
    pub fn seal(&mut self) {
        self.id = self.content_id().to_hex();
        self.evidence_hash = self.payload_hash();
    }

    /// Whether `evidence_hash` still matches the payload.
    pub fn verify_hash(&self) -> bool {
        self.evidence_hash == self.payload_hash()
    }

    /// Context text without a credibility tag.
    pub fn base_context(&self) -> &str {
        match self.context.find(CREDIBILITY_TAG) {
            Some(idx) => self.context[..idx].trim_end(),
            None => &self.context,
        }
    }

    /// Check the structural invariants a stored record must satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(TypesError::MissingField("id"));
        }
        if self.source_ip.parse::<IpAddr>().is_err() {
            return Err(TypesError::InvalidIp(self.source_ip.clone()));
        }
        check_unit("initial_score", self.initial_score)?;
        check_unit("credibility_score", self.credibility_score)?;
        if let Some(upstream) = &self.upstream {
            check_unit("upstream_confidence", upstream.confidence)?;
        }
        Ok(())
    }
}

/// Reject values that are NaN, infinite or outside [0, 1].
pub fn check_unit(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(TypesError::OutOfRange { field, value })
    }
}

/// Loosely-typed evidence as reported by a source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceDraft {
    /// Offending address (required)
    pub source_ip: Option<String>,
    /// Targeted address
    pub target_ip: Option<String>,
    /// Threat category name (required)
    pub threat_type: Option<String>,
    /// Threat severity name (required)
    pub threat_level: Option<String>,
    /// Observation time
    pub timestamp: Option<DateTime<Utc>>,
    /// Description
    pub context: Option<String>,
    /// Geolocation
    pub geolocation: Option<String>,
    /// Flow / pattern
    pub network_flow: Option<String>,
    /// Reporting agent
    pub agent_id: Option<String>,
    /// Compliance tag
    pub compliance_tag: Option<String>,
    /// Region
    pub region: Option<String>,
    /// Local detection confidence
    pub initial_score: Option<f64>,
}

impl EvidenceDraft {
    /// Names of required fields that are absent or blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        let mut missing = Vec::new();
        if blank(&self.source_ip) {
            missing.push("source_ip");
        }
        if blank(&self.threat_type) {
            missing.push("threat_type");
        }
        if blank(&self.threat_level) {
            missing.push("threat_level");
        }
        missing
    }

    /// Validate and normalize into [`ThreatEvidence`].
    pub fn into_evidence(self, origin: EvidenceOrigin, default_score: f64) -> Result<ThreatEvidence> {
        if let Some(field) = self.missing_fields().first() {
            return Err(TypesError::MissingField(field));
        }

        // Presence checked above.
        let source_ip = self.source_ip.unwrap_or_default().trim().to_string();
        if source_ip.parse::<IpAddr>().is_err() {
            return Err(TypesError::InvalidIp(source_ip));
        }
        let threat_type: ThreatType = self.threat_type.unwrap_or_default().trim().parse()?;
        let threat_level: ThreatLevel = self.threat_level.unwrap_or_default().trim().parse()?;

        let initial_score = self.initial_score.unwrap_or(default_score);
        check_unit("initial_score", initial_score)?;

        let mut evidence = ThreatEvidence::new(source_ip, threat_type, threat_level, origin);
        if let Some(target) = self.target_ip.filter(|s| !s.trim().is_empty()) {
            evidence.target_ip = target;
        }
        if let Some(ts) = self.timestamp {
            evidence.timestamp = ts;
        }
        evidence.context = self.context.unwrap_or_default();
        if let Some(geo) = self.geolocation {
            evidence.geolocation = geo;
        }
        evidence.network_flow = self.network_flow.unwrap_or_default();
        if let Some(agent) = self.agent_id {
            evidence.agent_id = agent;
        }
        if let Some(tag) = self.compliance_tag {
            evidence.compliance_tag = tag;
        }
        if let Some(region) = self.region {
            evidence.region = region;
        }
        evidence.initial_score = initial_score;
        evidence.seal();
        Ok(evidence)
    }
}

/// Lifecycle state of an evidence item inside the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStatus {
    /// Ingested, unscored
    Created,
    /// Awaiting a consensus round
    Pending,
    /// Quorum reached and verified
    Verified,
    /// Quorum reached and disputed
    Disputed,
    /// Quorum not reached
    Undetermined,
    /// Final credibility score attached
    Enhanced,
    /// Policy decision exported
    Actioned,
}

impl fmt::Display for EvidenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvidenceStatus::Created => "created",
            EvidenceStatus::Pending => "pending",
            EvidenceStatus::Verified => "verified",
            EvidenceStatus::Disputed => "disputed",
            EvidenceStatus::Undetermined => "undetermined",
            EvidenceStatus::Enhanced => "enhanced",
            EvidenceStatus::Actioned => "actioned",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> EvidenceOrigin {
        EvidenceOrigin::new("netflow", SourceKind::LocalSensor)
    }

    #[test]
    fn test_id_ignores_severity_and_context() {
        let a = ThreatEvidence::new("203.0.113.42", ThreatType::Malware, ThreatLevel::Warning, local())
            .with_context("first report");
        let b = ThreatEvidence::new("203.0.113.42", ThreatType::Malware, ThreatLevel::Critical, local())
            .with_context("second report");
        assert_eq!(a.id, b.id);
        assert_ne!(a.evidence_hash, b.evidence_hash);
    }

    #[test]
    fn test_upstream_defaults_to_global_target() {
        let origin = EvidenceOrigin::new("CISA_AIS", SourceKind::UpstreamFeed);
        let evidence = ThreatEvidence::new("198.51.100.7", ThreatType::IoCMatch, ThreatLevel::Info, origin);
        assert_eq!(evidence.target_ip, GLOBAL_TARGET);
    }

    #[test]
    fn test_tampering_detected() {
        let mut evidence =
            ThreatEvidence::new("203.0.113.42", ThreatType::DDoS, ThreatLevel::Emergency, local());
        assert!(evidence.verify_hash());
        evidence.context = "edited".to_string();
        assert!(!evidence.verify_hash());
    }

    #[test]
    fn test_draft_missing_fields() {
        let draft = EvidenceDraft {
            source_ip: Some("10.0.0.1".to_string()),
            threat_level: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(draft.missing_fields(), vec!["threat_type", "threat_level"]);
        assert!(matches!(
            draft.into_evidence(local(), 0.5),
            Err(TypesError::MissingField("threat_type"))
        ));
    }

    #[test]
    fn test_draft_rejects_out_of_range_score() {
        let draft = EvidenceDraft {
            source_ip: Some("10.0.0.1".to_string()),
            threat_type: Some("Phishing".to_string()),
            threat_level: Some("high".to_string()),
            initial_score: Some(1.5),
            ..Default::default()
        };
        assert!(matches!(
            draft.into_evidence(local(), 0.5),
            Err(TypesError::OutOfRange { field: "initial_score", .. })
        ));
    }

    #[test]
    fn test_base_context_strips_tag() {
        let evidence = ThreatEvidence::new("10.0.0.1", ThreatType::Phishing, ThreatLevel::Info, local())
            .with_context("login page clone [CREDIBILITY: 0.42]");
        assert_eq!(evidence.base_context(), "login page clone");
    }
}
