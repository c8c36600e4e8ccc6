//! High-level privacy monitor tying rules, classification, and the log
//!
//! `PrivacyMonitor` is the single entry point an intercepting proxy or
//! ingestion endpoint needs: it classifies traffic against the active
//! rule set, decides the verdict for each flow, appends findings to the
//! event log, and answers the aggregation queries. Thread-safe via
//! internal locks; rule sets swap atomically under live traffic.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::RwLock;

use crate::aggregate::{build_site_stats, normalize, summarize};
use crate::classify::{classify, is_tracking_pixel};
use crate::error::Result;
use crate::log::{EventStore, FileEventStore};
use crate::metrics::Metrics;
use crate::rules::{Action, LoadWarning, RuleSet};
use crate::sanitize::sanitize_body;
use crate::types::{
    now_iso, strip_www, BlockResponse, ClassificationResult, LogRecord, RawEvent, ResponseRecord,
    SiteDump, SiteSnapshot, SiteStats, TrafficRecord, Verdict,
};

/// Outcome of inspecting one request or response
///
/// Logging is fail-open: records that could not be appended are still
/// listed here, the failure is counted and logged, and the verdict is
/// unaffected.
#[derive(Debug, Clone)]
pub struct Inspection {
    /// What the detectors found
    pub result: ClassificationResult,

    /// What the caller should do with the flow
    pub verdict: Verdict,

    /// Records produced for this flow, in append order
    pub records: Vec<LogRecord>,
}

/// Privacy monitor backed by a pluggable event store
///
/// Wraps the rule engine and an `EventStore` with flow inspection,
/// ingestion, and query methods. Rule sets are swapped wholesale, so a
/// reload never observes a half-updated set.
pub struct PrivacyMonitor {
    rules: RwLock<Arc<RuleSet>>,

    store: Box<dyn EventStore>,

    metrics: Metrics,
}

impl PrivacyMonitor {
    /// Create a monitor from a rule set and an event store
    pub fn new(rules: RuleSet, store: impl EventStore + 'static) -> Self {
        Self {
            rules: RwLock::new(Arc::new(rules)),
            store: Box::new(store),
            metrics: Metrics::new(),
        }
    }

    /// Create a monitor logging to a line-delimited JSON file
    pub fn file_backed(rules: RuleSet, log_path: impl Into<PathBuf>) -> Self {
        Self::new(rules, FileEventStore::new(log_path))
    }

    /// Get the active rule set
    pub async fn rules(&self) -> Arc<RuleSet> {
        self.rules.read().await.clone()
    }

    /// Swap in a new rule set
    pub async fn replace_rules(&self, rules: RuleSet) {
        let version = rules.version().to_string();
        *self.rules.write().await = Arc::new(rules);
        tracing::info!(version = %version, "Rule set replaced");
    }

    /// Reload the rule set from a file and swap it in
    ///
    /// On any load error the active rule set stays in place.
    pub async fn reload_rules(&self, path: impl AsRef<Path>) -> Result<Vec<LoadWarning>> {
        let loaded = RuleSet::load(path)?;
        let warnings = loaded.warnings;
        self.replace_rules(loaded.rules).await;
        Ok(warnings)
    }

    /// Get the monitor metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Inspect an outbound request and decide what to do with it
    ///
    /// Runs every detector, appends a finding record (and a separate
    /// fingerprinting record) when anything matched, then picks the
    /// verdict: block when the active action is `block` and a tracker
    /// domain matched, otherwise sanitize the body when PII rode along
    /// to a tracker domain, otherwise allow. Blocking wins over
    /// sanitization. Callers replacing the body own updating any length
    /// header.
    pub async fn inspect_request(&self, record: &TrafficRecord) -> Inspection {
        self.metrics.record_request();
        let rules = self.rules().await;

        let result = classify(record, &rules);
        let visited_site = record
            .visited_site()
            .unwrap_or_else(|| "unknown".to_string());
        let hostname = record.host.to_lowercase();
        let url = record.url.to_lowercase();

        let mut records = Vec::new();

        if result.tracker_matched
            || !result.pii_types.is_empty()
            || !result.tracking_params.is_empty()
        {
            records.push(LogRecord {
                timestamp: now_iso(),
                visited_site: visited_site.clone(),
                hostname: hostname.clone(),
                url: url.clone(),
                tracker: result.tracker_matched,
                pii: !result.pii_types.is_empty(),
                pii_types: result.pii_types.iter().cloned().collect(),
                tracking_parameters: result.tracking_params.clone(),
                session: record.session.clone(),
                source: "proxy".to_string(),
                method: record.method.clone(),
                content_type: record.content_type.to_lowercase(),
                ..LogRecord::default()
            });
        }

        if let Some(tag) = &result.fingerprinting {
            records.push(LogRecord {
                timestamp: now_iso(),
                visited_site: visited_site.clone(),
                hostname: hostname.clone(),
                url,
                fingerprinting: true,
                session: record.session.clone(),
                source: "proxy".to_string(),
                method: record.method.clone(),
                content_type: record.content_type.to_lowercase(),
                event_type: "fingerprinting".to_string(),
                detail: tag.clone(),
                ..LogRecord::default()
            });
        }

        for entry in &records {
            self.append_record(entry).await;
        }

        let verdict = if rules.action() == Action::Block && result.tracker_matched {
            self.metrics.record_block();
            tracing::info!(host = %hostname, site = %visited_site, "Blocked tracking request");
            Verdict::Block(BlockResponse::tracking_domain())
        } else if !result.pii_types.is_empty() && result.tracker_matched {
            let sanitized = sanitize_body(&record.body, &record.content_type, &rules);
            if sanitized != record.body {
                self.metrics.record_sanitize();
                tracing::info!(
                    host = %hostname,
                    kinds = ?result.pii_types,
                    "Sanitized outbound request body"
                );
                Verdict::ReplaceBody(sanitized)
            } else {
                Verdict::Allow
            }
        } else {
            Verdict::Allow
        };

        Inspection {
            result,
            verdict,
            records,
        }
    }

    /// Inspect a response for tracking-pixel delivery
    ///
    /// Responses are never blocked or rewritten; a pixel-shaped response
    /// only produces a tracker record attributed to the request's site.
    pub async fn inspect_response(
        &self,
        request: &TrafficRecord,
        response: &ResponseRecord,
    ) -> Inspection {
        self.metrics.record_response();

        let mut result = ClassificationResult::default();
        let mut records = Vec::new();

        if is_tracking_pixel(response) {
            result.tracker_matched = true;
            let record = LogRecord {
                timestamp: now_iso(),
                visited_site: request
                    .visited_site()
                    .unwrap_or_else(|| "unknown".to_string()),
                hostname: request.host.to_lowercase(),
                url: request.url.to_lowercase(),
                tracker: true,
                session: request.session.clone(),
                source: "proxy".to_string(),
                method: "tracking_pixel".to_string(),
                content_type: response.content_type.to_lowercase(),
                ..LogRecord::default()
            };
            self.append_record(&record).await;
            tracing::debug!(host = %record.hostname, "Tracking pixel response");
            records.push(record);
        }

        Inspection {
            result,
            verdict: Verdict::Allow,
            records,
        }
    }

    /// Accept an event from an external producer
    ///
    /// The event is normalized, stamped with the current time and an
    /// `extension` source regardless of what the producer claimed, then
    /// appended. Returns the record as written.
    pub async fn ingest(&self, event: RawEvent) -> Result<LogRecord> {
        let mut record = normalize(&event);
        record.timestamp = now_iso();
        record.source = "extension".to_string();

        self.store.append(&record).await?;
        self.metrics.record_ingest();
        tracing::debug!(
            site = %record.visited_site,
            kind = %record.event_type,
            "Event ingested"
        );
        Ok(record)
    }

    /// Aggregate per-site stats over an optional window
    pub async fn site_stats(&self, window: Option<Duration>) -> Result<HashMap<String, SiteStats>> {
        let events = self.store.read_all().await?;
        Ok(build_site_stats(&events, window, Utc::now()))
    }

    /// Per-site stats for the last 24 hours
    pub async fn latest(&self) -> Result<HashMap<String, SiteStats>> {
        self.site_stats(Some(Duration::hours(24))).await
    }

    /// Stats and summary for one site over the last hour
    ///
    /// The hostname is tried as given (lowercased) first, then with any
    /// leading `www.` stripped; an unknown site gets all-zero stats and
    /// the no-issues summary.
    pub async fn current_site(&self, hostname: &str) -> Result<SiteSnapshot> {
        let mut stats = self.site_stats(Some(Duration::hours(1))).await?;

        let lowered = hostname.to_lowercase();
        let stripped = strip_www(&lowered);
        let site = stats
            .remove(&lowered)
            .or_else(|| stats.remove(stripped))
            .unwrap_or_default();

        let summary = summarize(&site);
        Ok(SiteSnapshot {
            stats: site,
            summary,
        })
    }

    /// Dump raw log records whose site or hostname contains a pattern
    ///
    /// Matches are case-insensitive substring tests against the raw,
    /// unnormalized records; the dump carries the total match count and
    /// the last ten matches in log order.
    pub async fn debug_site(&self, pattern: &str) -> Result<SiteDump> {
        let events = self.store.read_all().await?;
        let needle = pattern.to_lowercase();

        let mut matching: Vec<RawEvent> = events
            .into_iter()
            .filter(|event| {
                let visited = event.visited_site.as_deref().unwrap_or("");
                let hostname = event.hostname.as_deref().unwrap_or("");
                visited.to_lowercase().contains(&needle)
                    || hostname.to_lowercase().contains(&needle)
            })
            .collect();

        let total_events = matching.len() as u64;
        if matching.len() > 10 {
            matching.drain(..matching.len() - 10);
        }

        Ok(SiteDump {
            hostname: pattern.to_string(),
            total_events,
            recent_events: matching,
        })
    }

    /// Delete every logged event
    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await?;
        tracing::info!("Event log cleared");
        Ok(())
    }

    async fn append_record(&self, record: &LogRecord) {
        match self.store.append(record).await {
            Ok(()) => self.metrics.record_finding(),
            Err(error) => {
                self.metrics.record_log_failure();
                tracing::error!(
                    error = %error,
                    site = %record.visited_site,
                    "Failed to append event record"
                );
            }
        }
    }
}
