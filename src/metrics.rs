//! Telemetry for monitor operations

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    pub requests_inspected: AtomicU64,
    pub responses_inspected: AtomicU64,
    pub findings_logged: AtomicU64,
    pub requests_blocked: AtomicU64,
    pub bodies_sanitized: AtomicU64,
    pub events_ingested: AtomicU64,
    pub log_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self { Self::default() }

    pub fn record_request(&self) { self.requests_inspected.fetch_add(1, Ordering::Relaxed); }
    pub fn record_response(&self) { self.responses_inspected.fetch_add(1, Ordering::Relaxed); }
    pub fn record_finding(&self) { self.findings_logged.fetch_add(1, Ordering::Relaxed); }
    pub fn record_block(&self) { self.requests_blocked.fetch_add(1, Ordering::Relaxed); }
    pub fn record_sanitize(&self) { self.bodies_sanitized.fetch_add(1, Ordering::Relaxed); }
    pub fn record_ingest(&self) { self.events_ingested.fetch_add(1, Ordering::Relaxed); }
    pub fn record_log_failure(&self) { self.log_failures.fetch_add(1, Ordering::Relaxed); }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_inspected: self.requests_inspected.load(Ordering::Relaxed),
            responses_inspected: self.responses_inspected.load(Ordering::Relaxed),
            findings_logged: self.findings_logged.load(Ordering::Relaxed),
            requests_blocked: self.requests_blocked.load(Ordering::Relaxed),
            bodies_sanitized: self.bodies_sanitized.load(Ordering::Relaxed),
            events_ingested: self.events_ingested.load(Ordering::Relaxed),
            log_failures: self.log_failures.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.requests_inspected.store(0, Ordering::Relaxed);
        self.responses_inspected.store(0, Ordering::Relaxed);
        self.findings_logged.store(0, Ordering::Relaxed);
        self.requests_blocked.store(0, Ordering::Relaxed);
        self.bodies_sanitized.store(0, Ordering::Relaxed);
        self.events_ingested.store(0, Ordering::Relaxed);
        self.log_failures.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub requests_inspected: u64,
    pub responses_inspected: u64,
    pub findings_logged: u64,
    pub requests_blocked: u64,
    pub bodies_sanitized: u64,
    pub events_ingested: u64,
    pub log_failures: u64,
}
