//! Interception Metrics
//!
//! Lock-free counters describing what the interception stage saw. Counters
//! only grow; take a [`MetricsSnapshot`] to read them consistently enough for
//! reporting.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct InterceptionMetrics {
    // Requests
    authenticated_requests: AtomicU64,
    unauthenticated_requests: AtomicU64,
    extraction_failures: AtomicU64,
    malformed_chains: AtomicU64,

    // Attributes
    attributes_accepted: AtomicU64,
    attribute_certificates_rejected: AtomicU64,

    // Resolution latency
    resolution_latency_sum_nanos: AtomicU64,
    resolution_latency_count: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    pub authenticated_requests: u64,
    pub unauthenticated_requests: u64,
    pub extraction_failures: u64,
    pub malformed_chains: u64,
    pub attributes_accepted: u64,
    pub attribute_certificates_rejected: u64,
    pub average_resolution_latency_nanos: u64,
}

impl InterceptionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_authenticated(&self, latency: Duration, accepted: usize, rejected: usize) {
        self.authenticated_requests.fetch_add(1, Ordering::Relaxed);
        self.attributes_accepted
            .fetch_add(accepted as u64, Ordering::Relaxed);
        self.attribute_certificates_rejected
            .fetch_add(rejected as u64, Ordering::Relaxed);
        self.record_resolution_latency(latency);
    }

    pub fn record_unauthenticated(&self) {
        self.unauthenticated_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Peer certificates could not be read from the connection
    pub fn record_extraction_failure(&self) {
        self.extraction_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// The chain was presented but could not be resolved; the request still
    /// proceeds unauthenticated
    pub fn record_malformed_chain(&self) {
        self.malformed_chains.fetch_add(1, Ordering::Relaxed);
        self.unauthenticated_requests.fetch_add(1, Ordering::Relaxed);
    }

    fn record_resolution_latency(&self, latency: Duration) {
        self.resolution_latency_sum_nanos
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);
        self.resolution_latency_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.authenticated_requests.load(Ordering::Relaxed)
            + self.unauthenticated_requests.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency_count = self.resolution_latency_count.load(Ordering::Relaxed);
        let average_resolution_latency_nanos = if latency_count > 0 {
            self.resolution_latency_sum_nanos.load(Ordering::Relaxed) / latency_count
        } else {
            0
        };

        MetricsSnapshot {
            authenticated_requests: self.authenticated_requests.load(Ordering::Relaxed),
            unauthenticated_requests: self.unauthenticated_requests.load(Ordering::Relaxed),
            extraction_failures: self.extraction_failures.load(Ordering::Relaxed),
            malformed_chains: self.malformed_chains.load(Ordering::Relaxed),
            attributes_accepted: self.attributes_accepted.load(Ordering::Relaxed),
            attribute_certificates_rejected: self
                .attribute_certificates_rejected
                .load(Ordering::Relaxed),
            average_resolution_latency_nanos,
        }
    }
}
