//! Rules document loading and the compiled, immutable ruleset
//!
//! The matching rules are produced externally as a JSON document and
//! compiled here into a [`RuleSet`]. A ruleset is never mutated after
//! construction; hot reload builds a fresh one and swaps the whole
//! snapshot so concurrent readers always see one consistent version.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{GuardError, Result};

/// URL substrings that indicate fingerprint collection endpoints
pub const FINGERPRINTING_URL_PATTERNS: &[&str] = &[
    "fingerprint",
    "fp-collect",
    "device-id",
    "browser-id",
    "client-id",
    "visitor-id",
    "canvas-hash",
    "webgl-hash",
    "digital-fingerprint",
];

/// Request body parameter names specific to fingerprint payloads
pub const FINGERPRINTING_PARAMS: &[&str] = &[
    "canvas_hash",
    "webgl_vendor",
    "webgl_renderer",
    "screen_resolution",
    "timezone_offset",
    "browser_plugins",
    "font_list",
    "hardware_concurrency",
    "device_memory",
    "user_agent_hash",
    "audio_hash",
    "client_rects",
    "touch_support",
    "webgl_params",
    "canvas_fingerprint",
    "audio_fingerprint",
];

/// Domain fragments that imitate well-known services
pub const SUSPICIOUS_DOMAIN_PATTERNS: &[&str] = &[
    "googletourist",
    "googleanalytic",
    "facebookcdn",
    "twitterapi",
    "amazonapi",
    "microsoftapi",
];

/// Hosts never flagged by the suspicious-domain stage
pub const LEGITIMATE_DOMAINS: &[&str] = &["google.com", "facebook.com", "twitter.com"];

/// Generic indicator substrings counted by the fingerprinting fallback stage
pub const FINGERPRINT_INDICATORS: &[&str] =
    &["canvas", "webgl", "screen", "plugin", "font", "audio"];

/// Form field name keywords always treated as PII-bearing by detection
pub const PII_FIELD_KEYWORDS: &[&str] = &["email", "phone", "address", "name", "birth", "ssn"];

/// Form field name keywords whose values the sanitizer always redacts
pub const REDACT_FIELD_KEYWORDS: &[&str] = &["email", "phone", "address", "ssn", "credit"];

/// Replacement token written over redacted values
pub const REDACTION_TOKEN: &str = "[REDACTED]";

/// Policy applied when a tracker-domain match coincides with other findings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Record the finding and let the exchange through
    #[default]
    Log,
    /// Short-circuit matched tracker exchanges with the fixed rejection
    Block,
    /// Redact detected PII from matched requests
    Sanitize,
}

impl Action {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "log" => Some(Action::Log),
            "block" => Some(Action::Block),
            "sanitize" => Some(Action::Sanitize),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Log => write!(f, "log"),
            Action::Block => write!(f, "block"),
            Action::Sanitize => write!(f, "sanitize"),
        }
    }
}

/// On-disk rules document schema
///
/// Every field is optional and unknown fields are ignored, so rule
/// producers can add sections without breaking older consumers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesDocument {
    /// Version string stamped by the rules producer
    #[serde(default)]
    pub version: String,

    /// Known tracker domains (lowercase, no scheme or path)
    #[serde(default)]
    pub tracker_domains: Vec<String>,

    /// Domain fragments of known fingerprinting services
    #[serde(default)]
    pub fingerprinting_domains: Vec<String>,

    /// Literal substrings that indicate PII in request content
    #[serde(default)]
    pub pii_patterns: Vec<String>,

    /// Named regex patterns for PII, compiled case-insensitive
    #[serde(default)]
    pub pii_regex_patterns: HashMap<String, String>,

    /// Substrings of form field names considered sensitive
    #[serde(default)]
    pub suspicious_form_fields: Vec<String>,

    /// Query parameter names used for tracking
    #[serde(default)]
    pub tracking_parameters: Vec<String>,

    /// Per-component action assignments
    #[serde(default)]
    pub actions: ActionsSection,
}

/// The `actions` section of the rules document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionsSection {
    /// Action for the traffic interception side; empty means `log`
    #[serde(default)]
    pub proxy: String,
}

/// A non-fatal problem encountered while loading a rules document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadWarning {
    /// A PII regex entry failed to compile and was skipped
    InvalidPattern {
        name: String,
        pattern: String,
        reason: String,
    },
    /// The document carried an unrecognized proxy action; `log` is used
    UnknownAction { value: String },
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadWarning::InvalidPattern { name, reason, .. } => {
                write!(f, "invalid regex pattern for '{name}': {reason}")
            }
            LoadWarning::UnknownAction { value } => {
                write!(f, "unknown proxy action '{value}', defaulting to log")
            }
        }
    }
}

/// A compiled ruleset together with any warnings raised while loading it
#[derive(Debug)]
pub struct LoadedRuleSet {
    /// The usable ruleset
    pub rules: RuleSet,

    /// Entries that were skipped or coerced, in document order
    pub warnings: Vec<LoadWarning>,
}

/// Compiled, immutable matching rules
///
/// Regex entries are compiled case-insensitive and kept in name order so
/// classification output is deterministic. Fingerprinting domains keep
/// their document order, deduplicated, for the same reason.
#[derive(Debug, Default)]
pub struct RuleSet {
    version: String,
    tracker_domains: HashSet<String>,
    fingerprinting_domains: Vec<String>,
    pii_patterns: Vec<String>,
    pii_regex: Vec<(String, Regex)>,
    suspicious_form_fields: Vec<String>,
    tracking_parameters: Vec<String>,
    action: Action,
}

impl RuleSet {
    /// Load and compile a rules document from disk
    ///
    /// Fails when the file is missing or not valid JSON; individual bad
    /// regex entries are skipped and reported as warnings instead.
    pub fn load(path: impl AsRef<Path>) -> Result<LoadedRuleSet> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GuardError::RulesNotFound(path.to_path_buf()));
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|e| GuardError::io(format!("reading rules file {}", path.display()), e))?;

        Self::from_json(&raw).map_err(|err| match err {
            GuardError::Serialization(e) => GuardError::RulesMalformed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
            other => other,
        })
    }

    /// Compile a rules document from a JSON string
    pub fn from_json(raw: &str) -> Result<LoadedRuleSet> {
        let document: RulesDocument = serde_json::from_str(raw)?;
        Ok(Self::compile(document))
    }

    /// Compile an already-parsed rules document
    pub fn compile(document: RulesDocument) -> LoadedRuleSet {
        let mut warnings = Vec::new();

        // Name order keeps regex evaluation and tag output deterministic.
        let mut regex_entries: Vec<(String, String)> =
            document.pii_regex_patterns.into_iter().collect();
        regex_entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut pii_regex = Vec::with_capacity(regex_entries.len());
        for (name, pattern) in regex_entries {
            match RegexBuilder::new(&pattern).case_insensitive(true).build() {
                Ok(regex) => pii_regex.push((name, regex)),
                Err(e) => {
                    warn!(name = %name, error = %e, "skipping invalid PII regex pattern");
                    warnings.push(LoadWarning::InvalidPattern {
                        name,
                        pattern,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let action = if document.actions.proxy.is_empty() {
            Action::Log
        } else {
            match Action::parse(&document.actions.proxy) {
                Some(action) => action,
                None => {
                    warn!(value = %document.actions.proxy, "unknown proxy action, defaulting to log");
                    warnings.push(LoadWarning::UnknownAction {
                        value: document.actions.proxy,
                    });
                    Action::Log
                }
            }
        };

        let mut seen = HashSet::new();
        let fingerprinting_domains: Vec<String> = document
            .fingerprinting_domains
            .into_iter()
            .filter(|domain| seen.insert(domain.clone()))
            .collect();

        let rules = RuleSet {
            version: document.version,
            tracker_domains: document.tracker_domains.into_iter().collect(),
            fingerprinting_domains,
            pii_patterns: document
                .pii_patterns
                .into_iter()
                .map(|p| p.to_lowercase())
                .collect(),
            pii_regex,
            suspicious_form_fields: document.suspicious_form_fields,
            tracking_parameters: document.tracking_parameters,
            action,
        };

        info!(
            tracker_domains = rules.tracker_domains.len(),
            pii_patterns = rules.pii_patterns.len(),
            pii_regex = rules.pii_regex.len(),
            fingerprinting_domains = rules.fingerprinting_domains.len(),
            action = %rules.action,
            "loaded privacy rules"
        );

        LoadedRuleSet { rules, warnings }
    }

    /// Version string from the source document, empty when absent
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Policy for matched tracker traffic
    pub fn action(&self) -> Action {
        self.action
    }

    /// Known tracker domains
    pub fn tracker_domains(&self) -> &HashSet<String> {
        &self.tracker_domains
    }

    /// Fingerprinting service domain fragments, document order
    pub fn fingerprinting_domains(&self) -> &[String] {
        &self.fingerprinting_domains
    }

    /// Literal PII substrings, lowercased
    pub fn pii_patterns(&self) -> &[String] {
        &self.pii_patterns
    }

    /// Compiled PII regexes, name order
    pub fn pii_regex(&self) -> &[(String, Regex)] {
        &self.pii_regex
    }

    /// Sensitive form field name substrings
    pub fn suspicious_form_fields(&self) -> &[String] {
        &self.suspicious_form_fields
    }

    /// Tracking query parameter names
    pub fn tracking_parameters(&self) -> &[String] {
        &self.tracking_parameters
    }
}
