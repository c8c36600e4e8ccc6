//! # privacy-guard
//!
//! Rule-driven privacy classification, sanitization, and aggregation for
//! intercepted web traffic.
//!
//! ## Overview
//!
//! `privacy-guard` decides, for each intercepted HTTP exchange, whether a
//! known tracker was contacted, whether PII or fingerprinting payloads
//! rode along, and what the interceptor should do about it: allow, block,
//! or rewrite the body with PII redacted. Findings are appended to a
//! line-delimited JSON event log shared with external producers, and the
//! same log answers per-site aggregation queries.
//!
//! ## Quick Start
//!
//! ```rust
//! use privacy_guard::{PrivacyMonitor, TrafficRecord};
//! use privacy_guard::log::MemoryEventStore;
//! use privacy_guard::rules::RuleSet;
//!
//! # async fn example() -> privacy_guard::Result<()> {
//! // Compile a ruleset and build a monitor over an in-memory log
//! let rules = RuleSet::from_json(
//!     r#"{
//!         "version": "2025.1",
//!         "tracker_domains": ["ads.tracking.example"],
//!         "actions": {"proxy": "block"}
//!     }"#,
//! )?
//! .rules;
//! let monitor = PrivacyMonitor::new(rules, MemoryEventStore::new());
//!
//! // Inspect an outbound request
//! let record = TrafficRecord::new(
//!     "ads.tracking.example",
//!     "https://ads.tracking.example/v1/collect",
//! );
//! let inspection = monitor.inspect_request(&record).await;
//!
//! println!("verdict: {:?}", inspection.verdict);
//! # Ok(())
//! # }
//! ```
//!
//! ## Event sources
//!
//! - **proxy**: records produced by [`PrivacyMonitor::inspect_request`]
//!   and [`PrivacyMonitor::inspect_response`]
//! - **extension**: producer events accepted through
//!   [`PrivacyMonitor::ingest`]
//!
//! Both land in the same log; [`aggregate::normalize`] folds their
//! differing shapes into one canonical record before any counting.
//!
//! ## Architecture
//!
//! - **RuleSet**: immutable compiled rules, swapped wholesale on reload
//! - **classify**: pure detectors for trackers, PII, tracking
//!   parameters, and fingerprinting
//! - **sanitize**: fail-open PII redaction for request bodies
//! - **EventStore** trait: append-only log abstraction (file or memory)
//! - **aggregate**: windowed, deduplicated per-site statistics
//! - **PrivacyMonitor**: high-level API tying all of it together

pub mod aggregate;
pub mod classify;
pub mod error;
pub mod log;
pub mod metrics;
pub mod monitor;
pub mod rules;
pub mod sanitize;
pub mod types;

// Re-export core types
pub use error::{GuardError, Result};
pub use log::{EventStore, FileEventStore, MemoryEventStore};
pub use metrics::{Metrics, MetricsSnapshot};
pub use monitor::{Inspection, PrivacyMonitor};
pub use rules::{Action, LoadWarning, LoadedRuleSet, RuleSet, RulesDocument};
pub use types::{
    BlockResponse, ClassificationResult, LogRecord, RawEvent, ResponseRecord, SiteDump,
    SiteSnapshot, SiteStats, TrafficRecord, Verdict,
};
