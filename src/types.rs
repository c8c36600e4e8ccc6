//! Core traffic and event types for the privacy monitor
//!
//! Persisted records use snake_case JSON serialization for wire
//! compatibility with both log producers (traffic interceptor and
//! browser extension).

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// An intercepted HTTP request as seen by the traffic collaborator
///
/// Ephemeral: one per exchange, never persisted itself. The interceptor
/// builds one of these, asks the monitor for a verdict, and applies it.
#[derive(Debug, Clone, Default)]
pub struct TrafficRecord {
    /// Contacted host (no scheme or path)
    pub host: String,

    /// Full request URL
    pub url: String,

    /// HTTP method
    pub method: String,

    /// Request headers
    pub headers: HashMap<String, String>,

    /// Raw request body
    pub body: Bytes,

    /// Content-Type header value
    pub content_type: String,

    /// Session token attached by the interceptor, empty when absent
    pub session: String,

    /// Referer header value
    pub referer: String,
}

impl TrafficRecord {
    /// Create a record for a contacted host and URL
    pub fn new(host: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            url: url.into(),
            method: "GET".to_string(),
            ..Self::default()
        }
    }

    /// Set the HTTP method
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Set the request body and its content type
    pub fn with_body(mut self, body: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        self.body = body.into();
        self.content_type = content_type.into();
        self
    }

    /// Set the session token
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = session.into();
        self
    }

    /// Set the Referer header value
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = referer.into();
        self
    }

    /// Add a request header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Site the user was browsing, derived from the Referer header
    ///
    /// Returns the host portion after the scheme separator, lowercased,
    /// with any leading `www.` stripped. `None` when the referer carries
    /// no `://` separator (including the empty referer).
    pub fn visited_site(&self) -> Option<String> {
        let referer = self.referer.to_lowercase();
        let (_, rest) = referer.split_once("://")?;
        let host = rest.split('/').next().unwrap_or("");
        Some(strip_www(host).to_string())
    }
}

/// An intercepted HTTP response paired with its originating request
#[derive(Debug, Clone, Default)]
pub struct ResponseRecord {
    /// Response status code
    pub status: u16,

    /// Content-Type header value
    pub content_type: String,

    /// Raw response body
    pub body: Bytes,
}

impl ResponseRecord {
    /// Create a response record
    pub fn new(status: u16, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            body: body.into(),
        }
    }
}

/// Outcome of classifying one traffic record against a ruleset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationResult {
    /// The contacted host matched a known tracker domain
    pub tracker_matched: bool,

    /// Deduplicated PII tags: literal pattern, regex name, or `form_field_<name>`
    pub pii_types: BTreeSet<String>,

    /// Tracking parameter names found in the URL, in ruleset order
    pub tracking_params: Vec<String>,

    /// Fingerprinting detail tag when an attempt was detected
    pub fingerprinting: Option<String>,
}

impl ClassificationResult {
    /// True when any detector fired
    pub fn has_findings(&self) -> bool {
        self.tracker_matched
            || !self.pii_types.is_empty()
            || !self.tracking_params.is_empty()
            || self.fingerprinting.is_some()
    }
}

/// The fixed rejection served when the block action fires
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockResponse {
    /// HTTP status code
    pub status: u16,

    /// Content-Type of the rejection body
    pub content_type: &'static str,

    /// Plaintext explanation shown to the user
    pub body: &'static str,
}

impl BlockResponse {
    /// The rejection for a blocked tracking domain
    pub fn tracking_domain() -> Self {
        Self {
            status: 403,
            content_type: "text/plain",
            body: "Blocked by Privacy Tool - Tracking domain detected.",
        }
    }
}

/// What the interceptor must do with an inspected exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Let the exchange proceed untouched
    Allow,

    /// Short-circuit the exchange with the fixed rejection response
    Block(BlockResponse),

    /// Forward the request with a redacted body
    ///
    /// The caller owns updating any length header to the new body's size.
    ReplaceBody(Bytes),
}

impl Verdict {
    /// True for any verdict other than `Allow`
    pub fn is_intervention(&self) -> bool {
        !matches!(self, Verdict::Allow)
    }
}

/// Canonical persisted classification event
///
/// One JSON object per line in the event log, immutable once appended.
/// Consumers must tolerate extra fields and missing optional fields; the
/// tolerant counterpart for reads is [`RawEvent`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// ISO-8601 timestamp
    pub timestamp: String,

    /// Canonical site the user was browsing (lowercase, no leading `www.`)
    pub visited_site: String,

    /// Contacted host (lowercase)
    pub hostname: String,

    /// Full request URL (lowercase; empty for extension events)
    #[serde(default)]
    pub url: String,

    /// A known tracker domain was contacted
    #[serde(default)]
    pub tracker: bool,

    /// PII was found in the request
    #[serde(default)]
    pub pii: bool,

    /// PII tags backing the `pii` flag
    #[serde(default)]
    pub pii_types: Vec<String>,

    /// Tracking parameter names found in the URL
    #[serde(default)]
    pub tracking_parameters: Vec<String>,

    /// A fingerprinting attempt was observed
    #[serde(default)]
    pub fingerprinting: bool,

    /// Local storage access was observed
    #[serde(default)]
    pub storage: bool,

    /// Session token, empty when absent
    #[serde(default)]
    pub session: String,

    /// Producing side: "proxy" or "extension" (free-form values tolerated)
    #[serde(default)]
    pub source: String,

    /// HTTP method, or "tracking_pixel" for pixel responses
    #[serde(default)]
    pub method: String,

    /// Content-Type of the request (lowercase)
    #[serde(default)]
    pub content_type: String,

    /// Finding discriminator: "fingerprinting", "storage", "pii", or empty
    #[serde(rename = "type", default)]
    pub event_type: String,

    /// Finding detail (fingerprinting tag, storage method name, ...)
    #[serde(default)]
    pub detail: String,
}

/// An event as read from the log or received from a producer, before
/// normalization
///
/// Producers disagree on which fields they send, so every field is
/// optional here and [`crate::aggregate::normalize`] owns the defaults.
/// Unknown fields are retained in `extra` so debug dumps reproduce
/// producer payloads verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visited_site: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pii: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pii_types: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_parameters: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprinting: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Finding discriminator under the wire key `type`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Fingerprint detail under the key the traffic producer historically
    /// used; folded into `detail` during normalization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint_type: Option<String>,

    /// Unknown producer fields, preserved as-is
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl From<&LogRecord> for RawEvent {
    fn from(record: &LogRecord) -> Self {
        RawEvent {
            timestamp: Some(record.timestamp.clone()),
            visited_site: Some(record.visited_site.clone()),
            hostname: Some(record.hostname.clone()),
            url: Some(record.url.clone()),
            session: Some(record.session.clone()),
            tracker: Some(record.tracker),
            pii: Some(record.pii),
            pii_types: Some(record.pii_types.clone()),
            tracking_parameters: Some(record.tracking_parameters.clone()),
            fingerprinting: Some(record.fingerprinting),
            storage: Some(record.storage),
            source: Some(record.source.clone()),
            method: Some(record.method.clone()),
            content_type: Some(record.content_type.clone()),
            event_type: Some(record.event_type.clone()),
            detail: Some(record.detail.clone()),
            fingerprint_type: None,
            extra: HashMap::new(),
        }
    }
}

/// Aggregated privacy findings for one visited site
///
/// Derived fresh from the event log on every query; never cached across
/// queries. Detail sets are ordered so serialized output is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteStats {
    /// Tracker contacts counted in the window
    pub tracker: u64,

    /// PII-bearing requests counted in the window
    pub pii: u64,

    /// Fingerprinting attempts counted in the window
    pub fingerprinting: u64,

    /// Local storage accesses counted in the window
    pub storage: u64,

    /// Distinct tracker hostnames contacted
    pub trackers: BTreeSet<String>,

    /// Distinct PII tags observed
    pub pii_types: BTreeSet<String>,

    /// Distinct fingerprinting details observed
    pub fingerprint_apis: BTreeSet<String>,

    /// Distinct storage access methods observed
    pub storage_methods: BTreeSet<String>,

    /// Distinct session tokens observed
    pub sessions: BTreeSet<String>,

    /// Number of distinct sessions
    pub session_count: u64,

    /// Timestamp of the last record counted for this site, scan order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
}

/// Single-site query result: stats plus the generated summary sentence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSnapshot {
    /// Aggregated findings, flattened into the top-level object
    #[serde(flatten)]
    pub stats: SiteStats,

    /// Human-readable one-sentence summary of the findings
    pub summary: String,
}

/// Raw-record debug dump for a hostname substring query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteDump {
    /// The query pattern as given
    pub hostname: String,

    /// Total matching records in the log
    pub total_events: u64,

    /// Up to the last 10 matching records, unnormalized
    pub recent_events: Vec<RawEvent>,
}

/// Strip every leading `www.` prefix from a hostname
pub(crate) fn strip_www(host: &str) -> &str {
    let mut host = host;
    while let Some(rest) = host.strip_prefix("www.") {
        host = rest;
    }
    host
}

/// Current time as an RFC 3339 UTC timestamp with microsecond precision
pub(crate) fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
