//! # ThreatMesh Policy
//!
//! Turns enhanced evidence into enforcement decisions and renders them for
//! downstream collaborators.
//!
//! The gate never enforces anything itself. Firewall agents receive
//! `{ip, credibility_score}` pairs or a plain-text blocklist and apply their
//! own thresholds.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod export;
pub mod gate;

pub use export::{enforcement_entries, render_blocklist};
pub use gate::PolicyGate;
