//! # ThreatMesh Sources
//!
//! Pulls raw alerts from independently configured sources and normalizes
//! them into validated evidence.
//!
//! ## Features
//!
//! - **Concurrent fetch**: every enabled source is fetched at once, each under
//!   its own timeout
//! - **Degraded mode**: a failing source is reported, never fatal
//! - **Formats**: canonical drafts, generic indicator JSON, STIX 2.x
//!   indicators and plain IP lists
//! - **Deterministic order**: sources by priority, then name
//!
//! ## Example
//!
//! ```rust,ignore
//! use threatmesh_sources::{FeedAggregator, SourceAggregator};
//!
//! let aggregator = FeedAggregator::from_config(&config);
//! let report = aggregator.fetch_all_sources().await;
//! if report.degraded {
//!     eprintln!("unavailable: {:?}", report.unavailable_sources());
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod aggregator;
pub mod feed;
pub mod mock;
pub mod normalize;

pub use aggregator::FeedAggregator;
pub use feed::FileFeed;
pub use mock::{MockFeed, MockSourceAggregator};
pub use normalize::{extract_ip_from_pattern, normalize, Normalized};

pub use threatmesh_core::{
    AggregationReport, SourceAggregator, SourceDescriptor, SourceError, SourceOutcome,
    SourceResult, SourceStatus, ThreatFeed,
};
