//! Pure classification of traffic records against a ruleset
//!
//! Every function here is a deterministic, total function over its
//! inputs: no I/O, no shared state. Callers hand in the ruleset
//! snapshot they want to classify against.

use std::collections::{BTreeSet, HashMap};

use crate::rules::{self, RuleSet};
use crate::types::{ClassificationResult, ResponseRecord, TrafficRecord};

/// True iff `host` equals a tracker domain or is a subdomain of one
///
/// Exact-or-subdomain matching only. A host that merely shares characters
/// with a listed domain ("evilgoogle.com" vs "google.com") does not match.
pub fn is_tracker_domain(host: &str, rules: &RuleSet) -> bool {
    let host = host.to_lowercase();
    rules
        .tracker_domains()
        .iter()
        .any(|domain| match host.strip_suffix(domain.as_str()) {
            Some(prefix) => prefix.is_empty() || prefix.ends_with('.'),
            None => false,
        })
}

/// Detect PII in request content, returning a deduplicated set of tags
///
/// Tags are literal pattern names (with `=` stripped), regex pattern
/// names, and `form_field_<name>` entries for form-encoded bodies whose
/// field names look sensitive.
pub fn detect_pii(content: &str, content_type: &str, rules: &RuleSet) -> BTreeSet<String> {
    let mut detected = BTreeSet::new();
    let content_lower = content.to_lowercase();

    for pattern in rules.pii_patterns() {
        if content_lower.contains(pattern.as_str()) {
            detected.insert(pattern.replace('=', ""));
        }
    }

    // Compiled case-insensitive, so these run on the original content.
    for (name, regex) in rules.pii_regex() {
        if regex.is_match(content) {
            detected.insert(name.clone());
        }
    }

    if is_form_content(content_type) {
        for (field, _) in parse_form_pairs(content) {
            let field_lower = field.to_lowercase();
            let suspicious = rules
                .suspicious_form_fields()
                .iter()
                .any(|entry| field_lower.contains(entry.as_str()));
            let keyword = rules::PII_FIELD_KEYWORDS
                .iter()
                .any(|keyword| field_lower.contains(keyword));
            if suspicious || keyword {
                detected.insert(format!("form_field_{field_lower}"));
            }
        }
    }

    detected
}

/// Report configured tracking parameter names present in the URL
///
/// Literal substring matching on `<name>=`, which can false-positive
/// inside longer parameter names or opaque encoded values. Kept as
/// documented behavior rather than tightened.
pub fn detect_tracking_parameters(url: &str, rules: &RuleSet) -> Vec<String> {
    let url_lower = url.to_lowercase();
    rules
        .tracking_parameters()
        .iter()
        .filter(|param| {
            url_lower.contains(&format!("{param}=")) || url_lower.contains(&format!("&{param}="))
        })
        .cloned()
        .collect()
}

/// Detect fingerprinting attempts; first matching stage wins
///
/// Stages in priority order: known service domains, suspicious domain
/// fragments (minus a fixed legitimate-domain allowlist), URL patterns,
/// specific body parameters, then a generic indicator count. A specific
/// match always outranks the generic fallback, even when both hold.
///
/// `headers` is part of the detection contract but unused by the
/// current stages.
pub fn detect_fingerprinting(
    url: &str,
    body: &str,
    _headers: &HashMap<String, String>,
    rules: &RuleSet,
) -> Option<String> {
    let url_lower = url.to_lowercase();
    let body_lower = body.to_lowercase();
    let hostname = if url_lower.contains("//") {
        url_lower.split('/').nth(2).unwrap_or("")
    } else {
        url_lower.split('/').next().unwrap_or("")
    };

    for domain in rules.fingerprinting_domains() {
        if hostname.contains(domain.as_str()) {
            return Some(format!("fingerprinting_service_{domain}"));
        }
    }

    for pattern in rules::SUSPICIOUS_DOMAIN_PATTERNS {
        if hostname.contains(pattern)
            && !rules::LEGITIMATE_DOMAINS
                .iter()
                .any(|legit| hostname.contains(legit))
        {
            return Some(format!("suspicious_domain_{pattern}"));
        }
    }

    for pattern in rules::FINGERPRINTING_URL_PATTERNS {
        if url_lower.contains(pattern) {
            return Some(format!("fingerprinting_url_{pattern}"));
        }
    }

    let matched_params: Vec<&str> = rules::FINGERPRINTING_PARAMS
        .iter()
        .copied()
        .filter(|param| body_lower.contains(param))
        .collect();
    if !matched_params.is_empty() {
        let shown = matched_params.len().min(3);
        return Some(format!(
            "fingerprinting_params_{}",
            matched_params[..shown].join(",")
        ));
    }

    let indicator_count = rules::FINGERPRINT_INDICATORS
        .iter()
        .filter(|indicator| body_lower.contains(*indicator))
        .count();
    if indicator_count >= 3 {
        return Some(format!("fingerprinting_indicators_{indicator_count}"));
    }

    None
}

/// Run every detector over one traffic record
pub fn classify(record: &TrafficRecord, rules: &RuleSet) -> ClassificationResult {
    let host = record.host.to_lowercase();
    let url = record.url.to_lowercase();
    let body = String::from_utf8_lossy(&record.body);
    let content_type = record.content_type.to_lowercase();

    ClassificationResult {
        tracker_matched: is_tracker_domain(&host, rules),
        pii_types: detect_pii(&body, &content_type, rules),
        tracking_params: detect_tracking_parameters(&url, rules),
        fingerprinting: detect_fingerprinting(&url, &body, &record.headers, rules),
    }
}

/// True when a response looks like a tracking pixel
///
/// Status 200, an image content type, and a body under 100 bytes.
pub fn is_tracking_pixel(response: &ResponseRecord) -> bool {
    response.status == 200
        && response.content_type.to_lowercase().contains("image")
        && response.body.len() < 100
}

fn is_form_content(content_type: &str) -> bool {
    let content_type = content_type.to_lowercase();
    content_type.contains("application/x-www-form-urlencoded")
        || content_type.contains("multipart/form-data")
}

/// Decode a form-encoded body into name/value pairs
///
/// Mirrors the permissive query-string rules both producers rely on:
/// pairs split on `&`, names and values percent-decoded with `+` as
/// space, and pairs with a missing or empty value dropped.
pub(crate) fn parse_form_pairs(content: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for chunk in content.split('&') {
        if chunk.is_empty() {
            continue;
        }
        let (name, value) = match chunk.split_once('=') {
            Some(pair) => pair,
            None => continue,
        };
        if value.is_empty() {
            continue;
        }
        pairs.push((percent_decode(name), percent_decode(value)));
    }
    pairs
}

/// Percent-decode one form component, treating `+` as space
///
/// Invalid escapes pass through unchanged; non-UTF-8 decode results are
/// replaced rather than rejected.
pub(crate) fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2]))
            {
                (Some(hi), Some(lo)) => {
                    out.push(hi * 16 + lo);
                    i += 3;
                }
                _ => {
                    out.push(b'%');
                    i += 1;
                }
            },
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|v| v as u8)
}
