//! Threat classification enums.

use crate::TypesError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category of a reported threat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ThreatType {
    /// Volumetric or protocol flood
    DDoS,
    /// Malware delivery, C2 or infected host
    Malware,
    /// Credential phishing infrastructure
    Phishing,
    /// Repeated authentication attempts
    BruteForce,
    /// Connection to or from suspicious infrastructure
    SuspiciousConnection,
    /// Behavior deviating from the learned baseline
    AnomalousBehavior,
    /// Match against an indicator of compromise
    IoCMatch,
}

impl ThreatType {
    /// All variants, in declaration order.
    pub const ALL: [ThreatType; 7] = [
        ThreatType::DDoS,
        ThreatType::Malware,
        ThreatType::Phishing,
        ThreatType::BruteForce,
        ThreatType::SuspiciousConnection,
        ThreatType::AnomalousBehavior,
        ThreatType::IoCMatch,
    ];

    /// Canonical name, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatType::DDoS => "DDoS",
            ThreatType::Malware => "Malware",
            ThreatType::Phishing => "Phishing",
            ThreatType::BruteForce => "BruteForce",
            ThreatType::SuspiciousConnection => "SuspiciousConnection",
            ThreatType::AnomalousBehavior => "AnomalousBehavior",
            ThreatType::IoCMatch => "IoCMatch",
        }
    }

    /// Maps free-form feed labels onto a threat type.
    ///
    /// Unknown labels fall back to [`ThreatType::IoCMatch`]: an upstream feed
    /// listing an indicator is at minimum an IoC hit.
    pub fn from_feed_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "ddos" | "flood" => ThreatType::DDoS,
            "malware" | "c2" | "botnet" => ThreatType::Malware,
            "phishing" => ThreatType::Phishing,
            "bruteforce" | "brute-force" | "brute_force" => ThreatType::BruteForce,
            "malicious-activity" | "scanner" | "suspicious" => ThreatType::SuspiciousConnection,
            "anomaly" | "anomalous" => ThreatType::AnomalousBehavior,
            _ => ThreatType::IoCMatch,
        }
    }
}

impl fmt::Display for ThreatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThreatType {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ThreatType::ALL
            .iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| TypesError::UnknownThreatType(s.to_string()))
    }
}

/// Severity of a threat, totally ordered `Info < Warning < Critical < Emergency`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum ThreatLevel {
    /// Informational only
    Info = 0,
    /// Worth watching
    #[default]
    Warning = 1,
    /// Likely active threat
    Critical = 2,
    /// Confirmed, ongoing, high impact
    Emergency = 3,
}

impl ThreatLevel {
    /// All variants in ascending severity.
    pub const ALL: [ThreatLevel; 4] = [
        ThreatLevel::Info,
        ThreatLevel::Warning,
        ThreatLevel::Critical,
        ThreatLevel::Emergency,
    ];

    /// Canonical name, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Info => "Info",
            ThreatLevel::Warning => "Warning",
            ThreatLevel::Critical => "Critical",
            ThreatLevel::Emergency => "Emergency",
        }
    }

    /// Numeric severity rank.
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    /// One level less severe, saturating at `Info`.
    pub fn step_down(&self) -> Self {
        match self {
            ThreatLevel::Emergency => ThreatLevel::Critical,
            ThreatLevel::Critical => ThreatLevel::Warning,
            ThreatLevel::Warning | ThreatLevel::Info => ThreatLevel::Info,
        }
    }

    /// Maps a 0-100 feed confidence onto a level.
    pub fn from_feed_confidence(confidence: u64) -> Self {
        match confidence {
            0..=49 => ThreatLevel::Info,
            50..=74 => ThreatLevel::Warning,
            75..=89 => ThreatLevel::Critical,
            _ => ThreatLevel::Emergency,
        }
    }

    /// Parses canonical names plus the low/medium/high/severe aliases used by feeds.
    pub fn from_feed_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "info" | "low" => Some(ThreatLevel::Info),
            "warning" | "medium" => Some(ThreatLevel::Warning),
            "critical" | "high" => Some(ThreatLevel::Critical),
            "emergency" | "severe" => Some(ThreatLevel::Emergency),
            _ => None,
        }
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThreatLevel {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ThreatLevel::from_feed_label(s).ok_or_else(|| TypesError::UnknownThreatLevel(s.to_string()))
    }
}
