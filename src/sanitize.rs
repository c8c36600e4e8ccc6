//! Request body sanitization
//!
//! Redaction is fail-open by policy: anything that cannot be decoded or
//! parsed passes through unchanged. This is an advisory monitoring tool,
//! and a redaction shortfall must degrade to "field not redacted", never
//! to a broken request.

use bytes::Bytes;

use crate::classify::parse_form_pairs;
use crate::rules::{RuleSet, REDACTION_TOKEN, REDACT_FIELD_KEYWORDS};

/// Redact detected PII from a request body
///
/// Form-encoded bodies are decoded into fields; any field whose name
/// matches a suspicious entry or a fixed keyword has its values replaced
/// with the redaction token, and the body is re-encoded in first-seen
/// field order. Every other content type gets each compiled PII regex
/// applied as a global substitution; when nothing matches, the original
/// bytes come back untouched.
///
/// Callers own updating any length header to the returned body's size.
pub fn sanitize_body(body: &Bytes, content_type: &str, rules: &RuleSet) -> Bytes {
    if body.is_empty() {
        return body.clone();
    }

    if content_type
        .to_lowercase()
        .contains("application/x-www-form-urlencoded")
    {
        let text = String::from_utf8_lossy(body);
        return Bytes::from(sanitize_form(&text, rules));
    }

    let text = String::from_utf8_lossy(body);
    let mut redacted = text.to_string();
    let mut changed = false;
    for (_, regex) in rules.pii_regex() {
        if regex.is_match(&redacted) {
            redacted = regex.replace_all(&redacted, REDACTION_TOKEN).into_owned();
            changed = true;
        }
    }

    if changed {
        Bytes::from(redacted)
    } else {
        body.clone()
    }
}

/// Redact and re-encode a form body
///
/// Values are grouped per field at its first occurrence, so a redacted
/// multi-valued field collapses to a single token entry.
fn sanitize_form(content: &str, rules: &RuleSet) -> String {
    let mut fields: Vec<(String, Vec<String>)> = Vec::new();
    for (name, value) in parse_form_pairs(content) {
        match fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, values)) => values.push(value),
            None => fields.push((name, vec![value])),
        }
    }

    for (name, values) in &mut fields {
        let name_lower = name.to_lowercase();
        let suspicious = rules
            .suspicious_form_fields()
            .iter()
            .any(|entry| name_lower.contains(entry.as_str()));
        let keyword = REDACT_FIELD_KEYWORDS
            .iter()
            .any(|keyword| name_lower.contains(keyword));
        if suspicious || keyword {
            *values = vec![REDACTION_TOKEN.to_string()];
        }
    }

    let mut encoded = String::new();
    for (name, values) in &fields {
        for value in values {
            if !encoded.is_empty() {
                encoded.push('&');
            }
            encoded.push_str(&percent_encode(name));
            encoded.push('=');
            encoded.push_str(&percent_encode(value));
        }
    }
    encoded
}

/// Encode one form component the way the producers' encoder does:
/// alphanumerics and `_.-~` pass through, space becomes `+`, everything
/// else is percent-encoded.
fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'.' | b'-' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::detect_pii;

    const FORM: &str = "application/x-www-form-urlencoded";

    fn rules_from(json: &str) -> RuleSet {
        RuleSet::from_json(json).unwrap().rules
    }

    #[test]
    fn test_empty_body_unchanged() {
        let rules = rules_from(r#"{"suspicious_form_fields": ["email"]}"#);
        let body = Bytes::new();
        assert!(sanitize_body(&body, FORM, &rules).is_empty());
    }

    #[test]
    fn test_form_suspicious_field_redacted_in_place() {
        let rules = rules_from(r#"{"suspicious_form_fields": ["email"]}"#);
        let body = Bytes::from_static(b"email=joe@example.com&item=42");

        let sanitized = sanitize_body(&body, FORM, &rules);
        assert_eq!(sanitized.as_ref(), b"email=%5BREDACTED%5D&item=42");
    }

    #[test]
    fn test_form_keyword_field_redacted_without_ruleset_entry() {
        let rules = rules_from("{}");
        let body = Bytes::from_static(b"credit_card=4111111111111111&qty=1");

        let sanitized = sanitize_body(&body, FORM, &rules);
        assert_eq!(sanitized.as_ref(), b"credit_card=%5BREDACTED%5D&qty=1");
    }

    #[test]
    fn test_form_multi_valued_field_collapses_to_one_token() {
        let rules = rules_from(r#"{"suspicious_form_fields": ["email"]}"#);
        let body = Bytes::from_static(b"email=a@b.com&item=7&email=c@d.com");

        let sanitized = sanitize_body(&body, FORM, &rules);
        // Values group at the field's first occurrence before redaction.
        assert_eq!(sanitized.as_ref(), b"email=%5BREDACTED%5D&item=7");
    }

    #[test]
    fn test_form_blank_fields_dropped_by_decoder() {
        let rules = rules_from(r#"{"suspicious_form_fields": ["email"]}"#);
        let body = Bytes::from_static(b"a=&email=x@y.example");

        let sanitized = sanitize_body(&body, FORM, &rules);
        assert_eq!(sanitized.as_ref(), b"email=%5BREDACTED%5D");
    }

    #[test]
    fn test_form_untouched_fields_reencoded_faithfully() {
        let rules = rules_from("{}");
        let body = Bytes::from_static(b"full+name=Joe+Smith&q=a%26b");

        let sanitized = sanitize_body(&body, FORM, &rules);
        assert_eq!(sanitized.as_ref(), b"full+name=Joe+Smith&q=a%26b");
    }

    #[test]
    fn test_regex_substitution_for_other_content_types() {
        let rules = rules_from(
            r#"{"pii_regex_patterns": {"email_patterns": "[a-z0-9._%+-]+@[a-z0-9.-]+\\.[a-z]{2,}"}}"#,
        );
        let body = Bytes::from_static(b"{\"email\":\"joe@example.com\",\"n\":1}");

        let sanitized = sanitize_body(&body, "application/json", &rules);
        assert_eq!(sanitized.as_ref(), b"{\"email\":\"[REDACTED]\",\"n\":1}");
    }

    #[test]
    fn test_no_regex_match_returns_identical_bytes() {
        let rules = rules_from(
            r#"{"pii_regex_patterns": {"email_patterns": "[a-z0-9._%+-]+@[a-z0-9.-]+\\.[a-z]{2,}"}}"#,
        );
        // Not valid UTF-8; must come back byte-for-byte, not re-decoded.
        let body = Bytes::from_static(b"\xff\xfe opaque payload");

        let sanitized = sanitize_body(&body, "application/octet-stream", &rules);
        assert_eq!(sanitized.as_ref(), body.as_ref());
    }

    #[test]
    fn test_sanitized_value_no_longer_detected() {
        let rules = rules_from(
            r#"{
                "pii_regex_patterns": {"email_patterns": "[a-z0-9._%+-]+@[a-z0-9.-]+\\.[a-z]{2,}"},
                "suspicious_form_fields": ["email"]
            }"#,
        );
        let body = Bytes::from_static(b"email=joe@example.com");

        let sanitized = sanitize_body(&body, FORM, &rules);
        let text = String::from_utf8(sanitized.to_vec()).unwrap();
        let detected = detect_pii(&text, FORM, &rules);
        assert!(!detected.contains("email_patterns"));
    }
}
