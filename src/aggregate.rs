//! Event normalization and per-site aggregation
//!
//! The two producers emit different event shapes; everything funnels
//! through [`normalize`] into the canonical record before any counting.
//! Aggregation recomputes from the full event history on every query,
//! trading throughput for results that are always consistent with the
//! log's current contents.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet};

use crate::types::{now_iso, strip_www, LogRecord, RawEvent, SiteStats};

/// Map a raw producer event onto the canonical record shape
///
/// Missing fields default: timestamp to now, visited site to the url
/// field and then "unknown", session to empty, flags to false, source
/// to "extension". A `type` discriminator of `fingerprinting`,
/// `storage`, or `pii` forces the matching flag true regardless of its
/// raw value. The visited site is lowercased, trimmed, and stripped of
/// every leading `www.`; stripping repeatedly keeps normalization
/// idempotent even for `www.www.` hostnames.
pub fn normalize(event: &RawEvent) -> LogRecord {
    let visited_site = match &event.visited_site {
        Some(site) => site.clone(),
        None => match &event.url {
            Some(url) => url.clone(),
            None => "unknown".to_string(),
        },
    };
    let visited_site = strip_www(visited_site.to_lowercase().trim()).to_string();

    let hostname = match &event.hostname {
        Some(host) => host.clone(),
        None => event.url.clone().unwrap_or_else(|| "unknown".to_string()),
    }
    .to_lowercase();

    let event_type = event.event_type.clone().unwrap_or_default();
    let mut fingerprinting = event.fingerprinting.unwrap_or(false);
    let mut storage = event.storage.unwrap_or(false);
    let mut pii = event.pii.unwrap_or(false);
    match event_type.as_str() {
        "fingerprinting" => fingerprinting = true,
        "storage" => storage = true,
        "pii" => pii = true,
        _ => {}
    }

    // The traffic producer historically sent the fingerprint detail
    // under its own key; fold it in so the canonical record always
    // carries the finding detail.
    let detail = match event.detail.clone().filter(|detail| !detail.is_empty()) {
        Some(detail) => detail,
        None => event.fingerprint_type.clone().unwrap_or_default(),
    };

    LogRecord {
        timestamp: event.timestamp.clone().unwrap_or_else(now_iso),
        visited_site,
        hostname,
        url: event.url.clone().unwrap_or_default(),
        tracker: event.tracker.unwrap_or(false),
        pii,
        pii_types: event.pii_types.clone().unwrap_or_default(),
        tracking_parameters: event.tracking_parameters.clone().unwrap_or_default(),
        fingerprinting,
        storage,
        session: event.session.clone().unwrap_or_default(),
        source: event
            .source
            .clone()
            .unwrap_or_else(|| "extension".to_string()),
        method: event.method.clone().unwrap_or_default(),
        content_type: event.content_type.clone().unwrap_or_default(),
        event_type,
        detail,
    }
}

/// Windowed per-site aggregation over already-read raw events
///
/// Each event is normalized, window-filtered when a nonzero window is
/// given (`None` or a zero window includes records of any age), then
/// deduplicated per site on the `(hostname, type, detail)` tuple. A
/// repeated key within one computation is skipped entirely, so the
/// same finding observed twice counts once. Records whose timestamps
/// fail to parse are skipped only when a cutoff is active. Recomputed
/// from scratch on every call; nothing persists between calls.
pub fn build_site_stats(
    events: &[RawEvent],
    window: Option<Duration>,
    now: DateTime<Utc>,
) -> HashMap<String, SiteStats> {
    let cutoff = window.filter(|window| !window.is_zero()).map(|window| now - window);

    let mut stats: HashMap<String, SiteStats> = HashMap::new();
    let mut seen: HashMap<String, HashSet<(String, String, String)>> = HashMap::new();

    for event in events {
        let record = normalize(event);

        if let Some(cutoff) = cutoff {
            match parse_timestamp(&record.timestamp) {
                Some(stamp) if stamp >= cutoff => {}
                _ => continue,
            }
        }

        let site = stats.entry(record.visited_site.clone()).or_default();
        let site_seen = seen.entry(record.visited_site.clone()).or_default();

        let key = (
            record.hostname.clone(),
            record.event_type.clone(),
            record.detail.clone(),
        );
        if !site_seen.insert(key) {
            continue;
        }

        if record.tracker {
            site.tracker += 1;
            site.trackers.insert(record.hostname.clone());
        }
        if record.pii {
            site.pii += 1;
            site.pii_types.extend(record.pii_types.iter().cloned());
        }
        if record.fingerprinting {
            site.fingerprinting += 1;
            site.fingerprint_apis.insert(record.detail.clone());
        }
        if record.storage {
            site.storage += 1;
            site.storage_methods.insert(record.detail.clone());
        }
        if !record.session.is_empty() {
            site.sessions.insert(record.session.clone());
        }
        site.last_seen = Some(record.timestamp.clone());
    }

    for site in stats.values_mut() {
        site.session_count = site.sessions.len() as u64;
    }

    stats
}

/// One sentence describing a site's findings, fixed priority order
///
/// Trackers first, then PII (naming up to three tags), then
/// fingerprinting, then storage access; a fixed no-issues sentence when
/// every counter is zero.
pub fn summarize(stats: &SiteStats) -> String {
    let mut parts = Vec::new();

    if stats.tracker > 0 {
        parts.push(format!("{} trackers detected", stats.tracker));
    }

    if stats.pii > 0 {
        if stats.pii_types.is_empty() {
            parts.push("PII extraction detected".to_string());
        } else {
            let shown: Vec<&str> = stats.pii_types.iter().take(3).map(String::as_str).collect();
            parts.push(format!("PII extracted: {}", shown.join(", ")));
        }
    }

    if stats.fingerprinting > 0 {
        parts.push("fingerprinting detected".to_string());
    }

    if stats.storage > 0 {
        parts.push("local storage accessed".to_string());
    }

    if parts.is_empty() {
        return "No privacy issues detected".to_string();
    }

    capitalize_first(&parts.join(", "))
}

/// Parse a producer timestamp into UTC
///
/// Accepts RFC 3339 as well as the naive `YYYY-MM-DDTHH:MM:SS[.ffffff]`
/// shape the traffic producer historically wrote; naive stamps are
/// assumed UTC.
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    value
        .parse::<NaiveDateTime>()
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: &str) -> RawEvent {
        serde_json::from_str(json).unwrap()
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_normalize_defaults_for_empty_event() {
        let record = normalize(&raw("{}"));

        assert_eq!(record.visited_site, "unknown");
        assert_eq!(record.hostname, "unknown");
        assert_eq!(record.source, "extension");
        assert_eq!(record.session, "");
        assert!(!record.tracker && !record.pii && !record.fingerprinting && !record.storage);
        assert!(!record.timestamp.is_empty());
    }

    #[test]
    fn test_normalize_falls_back_to_url() {
        let record = normalize(&raw(r#"{"url": "WWW.Example.COM"}"#));

        // visited_site is stripped; hostname is only lowercased.
        assert_eq!(record.visited_site, "example.com");
        assert_eq!(record.hostname, "www.example.com");
        assert_eq!(record.url, "WWW.Example.COM");
    }

    #[test]
    fn test_normalize_present_empty_visited_site_is_kept() {
        let record = normalize(&raw(r#"{"visited_site": "", "url": "example.com"}"#));
        assert_eq!(record.visited_site, "");
    }

    #[test]
    fn test_normalize_strips_repeated_www() {
        let record = normalize(&raw(r#"{"visited_site": "  WWW.www.News.Example.ORG  "}"#));
        assert_eq!(record.visited_site, "news.example.org");
    }

    #[test]
    fn test_normalize_type_forces_flags() {
        let fp = normalize(&raw(r#"{"type": "fingerprinting", "fingerprinting": false}"#));
        assert!(fp.fingerprinting);

        let storage = normalize(&raw(r#"{"type": "storage"}"#));
        assert!(storage.storage);

        let pii = normalize(&raw(r#"{"type": "pii"}"#));
        assert!(pii.pii);

        let plain = normalize(&raw(r#"{"type": "navigation"}"#));
        assert!(!plain.fingerprinting && !plain.storage && !plain.pii);
    }

    #[test]
    fn test_normalize_folds_fingerprint_type_into_detail() {
        let record = normalize(&raw(
            r#"{"fingerprinting": true, "fingerprint_type": "fingerprinting_url_fp-collect"}"#,
        ));
        assert_eq!(record.detail, "fingerprinting_url_fp-collect");

        let explicit = normalize(&raw(
            r#"{"detail": "canvas.toDataURL", "fingerprint_type": "ignored"}"#,
        ));
        assert_eq!(explicit.detail, "canvas.toDataURL");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let event = raw(
            r#"{
                "timestamp": "2024-06-01T10:00:00Z",
                "visited_site": "  WWW.www.Shop.Example.COM  ",
                "hostname": "Tracker.Example.NET",
                "type": "fingerprinting",
                "fingerprint_type": "fingerprinting_indicators_4",
                "session": "sess-9"
            }"#,
        );

        let once = normalize(&event);
        let twice = normalize(&RawEvent::from(&once));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_stats_same_finding_counts_once() {
        let line = r#"{
            "timestamp": "2024-06-01T11:55:00Z",
            "visited_site": "example.com",
            "hostname": "tracker.example.net",
            "tracker": true
        }"#;
        let events = vec![raw(line), raw(line)];

        let stats = build_site_stats(&events, Some(Duration::hours(24)), fixed_now());
        assert_eq!(stats["example.com"].tracker, 1);
    }

    #[test]
    fn test_stats_dedup_spans_sources() {
        let proxy = r#"{
            "timestamp": "2024-06-01T11:00:00Z",
            "visited_site": "example.com",
            "hostname": "api.example.net",
            "type": "fingerprinting",
            "detail": "fingerprinting_indicators_3",
            "source": "proxy"
        }"#;
        let extension = r#"{
            "timestamp": "2024-06-01T11:30:00Z",
            "visited_site": "example.com",
            "hostname": "api.example.net",
            "type": "fingerprinting",
            "detail": "fingerprinting_indicators_3",
            "source": "extension"
        }"#;

        let stats = build_site_stats(&[raw(proxy), raw(extension)], None, fixed_now());
        assert_eq!(stats["example.com"].fingerprinting, 1);
    }

    #[test]
    fn test_stats_distinct_details_count_separately() {
        let first = r#"{
            "visited_site": "example.com",
            "hostname": "api.example.net",
            "type": "storage",
            "detail": "localStorage.setItem"
        }"#;
        let second = r#"{
            "visited_site": "example.com",
            "hostname": "api.example.net",
            "type": "storage",
            "detail": "sessionStorage.setItem"
        }"#;

        let stats = build_site_stats(&[raw(first), raw(second)], None, fixed_now());
        let site = &stats["example.com"];
        assert_eq!(site.storage, 2);
        assert_eq!(site.storage_methods.len(), 2);
    }

    #[test]
    fn test_stats_window_excludes_old_records() {
        let old = r#"{
            "timestamp": "2024-06-01T09:00:00Z",
            "visited_site": "example.com",
            "hostname": "old.example.net",
            "tracker": true
        }"#;
        let fresh = r#"{
            "timestamp": "2024-06-01T11:50:00Z",
            "visited_site": "example.com",
            "hostname": "fresh.example.net",
            "tracker": true
        }"#;
        let events = vec![raw(old), raw(fresh)];

        let windowed = build_site_stats(&events, Some(Duration::hours(1)), fixed_now());
        assert_eq!(windowed["example.com"].tracker, 1);
        assert!(windowed["example.com"]
            .trackers
            .contains("fresh.example.net"));

        let unwindowed = build_site_stats(&events, None, fixed_now());
        assert_eq!(unwindowed["example.com"].tracker, 2);

        let zero = build_site_stats(&events, Some(Duration::zero()), fixed_now());
        assert_eq!(zero["example.com"].tracker, 2);
    }

    #[test]
    fn test_stats_unparseable_timestamp_skipped_only_under_window() {
        let event = r#"{
            "timestamp": "not-a-timestamp",
            "visited_site": "example.com",
            "hostname": "t.example.net",
            "tracker": true
        }"#;

        let windowed = build_site_stats(&[raw(event)], Some(Duration::hours(1)), fixed_now());
        assert!(windowed.is_empty());

        let unwindowed = build_site_stats(&[raw(event)], None, fixed_now());
        assert_eq!(unwindowed["example.com"].tracker, 1);
    }

    #[test]
    fn test_stats_counters_sets_and_sessions() {
        let events = vec![
            raw(r#"{
                "timestamp": "2024-06-01T11:00:00Z",
                "visited_site": "example.com",
                "hostname": "ads.tracking.net",
                "tracker": true,
                "session": "s1"
            }"#),
            raw(r#"{
                "timestamp": "2024-06-01T11:05:00Z",
                "visited_site": "example.com",
                "hostname": "collect.tracking.net",
                "pii": true,
                "pii_types": ["email_patterns", "form_field_email"],
                "session": "s2"
            }"#),
            raw(r#"{
                "timestamp": "2024-06-01T11:10:00Z",
                "visited_site": "example.com",
                "hostname": "collect.tracking.net",
                "type": "fingerprinting",
                "detail": "canvas.toDataURL",
                "session": "s1"
            }"#),
        ];

        let stats = build_site_stats(&events, Some(Duration::hours(24)), fixed_now());
        let site = &stats["example.com"];

        assert_eq!(site.tracker, 1);
        assert_eq!(site.pii, 1);
        assert_eq!(site.fingerprinting, 1);
        assert_eq!(site.storage, 0);
        assert!(site.trackers.contains("ads.tracking.net"));
        assert!(site.pii_types.contains("email_patterns"));
        assert!(site.fingerprint_apis.contains("canvas.toDataURL"));
        assert_eq!(site.session_count, 2);
        assert_eq!(site.last_seen.as_deref(), Some("2024-06-01T11:10:00Z"));
    }

    #[test]
    fn test_stats_buckets_by_visited_site() {
        let events = vec![
            raw(r#"{"visited_site": "one.example.com", "hostname": "t.net", "tracker": true}"#),
            raw(r#"{"visited_site": "two.example.com", "hostname": "t.net", "tracker": true}"#),
        ];

        let stats = build_site_stats(&events, None, fixed_now());
        assert_eq!(stats.len(), 2);
        assert_eq!(stats["one.example.com"].tracker, 1);
        assert_eq!(stats["two.example.com"].tracker, 1);
    }

    #[test]
    fn test_summarize_full_priority_order() {
        let stats = SiteStats {
            tracker: 3,
            pii: 2,
            pii_types: ["email_patterns", "phone_patterns"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            fingerprinting: 1,
            storage: 1,
            ..SiteStats::default()
        };

        assert_eq!(
            summarize(&stats),
            "3 trackers detected, PII extracted: email_patterns, phone_patterns, \
             fingerprinting detected, local storage accessed"
        );
    }

    #[test]
    fn test_summarize_capitalizes_first_letter_only() {
        let stats = SiteStats {
            fingerprinting: 2,
            ..SiteStats::default()
        };
        assert_eq!(summarize(&stats), "Fingerprinting detected");

        let pii_only = SiteStats {
            pii: 1,
            pii_types: ["email_patterns"].iter().map(|s| s.to_string()).collect(),
            ..SiteStats::default()
        };
        assert_eq!(summarize(&pii_only), "PII extracted: email_patterns");
    }

    #[test]
    fn test_summarize_pii_without_types() {
        let stats = SiteStats {
            pii: 1,
            ..SiteStats::default()
        };
        assert_eq!(summarize(&stats), "PII extraction detected");
    }

    #[test]
    fn test_summarize_names_at_most_three_pii_types() {
        let stats = SiteStats {
            pii: 4,
            pii_types: ["a_tag", "b_tag", "c_tag", "d_tag"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ..SiteStats::default()
        };
        assert_eq!(summarize(&stats), "PII extracted: a_tag, b_tag, c_tag");
    }

    #[test]
    fn test_summarize_no_issues() {
        assert_eq!(summarize(&SiteStats::default()), "No privacy issues detected");
    }

    #[test]
    fn test_parse_timestamp_variants() {
        assert!(parse_timestamp("2024-06-01T10:00:00Z").is_some());
        assert!(parse_timestamp("2024-06-01T12:00:00+02:00").is_some());
        assert!(parse_timestamp("2024-06-01T10:00:00.123456").is_some());
        assert!(parse_timestamp("yesterday").is_none());

        let offset = parse_timestamp("2024-06-01T12:00:00+02:00").unwrap();
        let naive = parse_timestamp("2024-06-01T10:00:00").unwrap();
        assert_eq!(offset, naive);
    }
}
