//! Metrics: named counters (request totals by endpoint & outcome, cache
//! hits/misses, rate-limit rejections) backed by `std::sync::atomic`,
//! rendered as a Prometheus text exposition by
//! `GET /auth-server/v1/oauth/metrics`.
//!
//! Uses a constant-named-counter convention (`pub mod names`) with
//! hand-rolled atomics rather than pulling in an external metrics-crate
//! recorder, since this core has no external metrics backend to install.

use std::sync::atomic::{AtomicU64, Ordering};

pub mod names {
    pub const REQUESTS_TOTAL: &str = "portcullis_requests_total";
    pub const CACHE_HITS_TOTAL: &str = "portcullis_cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "portcullis_cache_misses_total";
    pub const RATE_LIMIT_REJECTED_TOTAL: &str = "portcullis_rate_limit_rejected_total";
}

#[derive(Debug, Default)]
struct EndpointCounters {
    issue: AtomicU64,
    one_time_token: AtomicU64,
    validate: AtomicU64,
    revoke: AtomicU64,
}

#[derive(Debug, Default)]
struct OutcomeCounters {
    success: AtomicU64,
    failure: AtomicU64,
}

/// Process-wide request/cache/rate-limit counters, owned by the Lifecycle
/// Supervisor and shared via `AppState` as explicit values, not module-level
/// singletons.
#[derive(Debug, Default)]
pub struct Metrics {
    issue: OutcomeCounters,
    one_time_token: OutcomeCounters,
    validate: OutcomeCounters,
    revoke: OutcomeCounters,
    rate_limit_rejected: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Issue,
    OneTimeToken,
    Validate,
    Revoke,
}

impl Endpoint {
    fn label(self) -> &'static str {
        match self {
            Endpoint::Issue => "issue",
            Endpoint::OneTimeToken => "one_time_token",
            Endpoint::Validate => "validate",
            Endpoint::Revoke => "revoke",
        }
    }
}

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn outcome_for(&self, endpoint: Endpoint) -> &OutcomeCounters {
        match endpoint {
            Endpoint::Issue => &self.issue,
            Endpoint::OneTimeToken => &self.one_time_token,
            Endpoint::Validate => &self.validate,
            Endpoint::Revoke => &self.revoke,
        }
    }

    pub fn record_request(&self, endpoint: Endpoint, success: bool) {
        let counters = self.outcome_for(endpoint);
        if success {
            counters.success.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.failure.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rate_limit_rejected(&self) {
        self.rate_limit_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Renders all counters as a Prometheus text exposition snippet.
    /// `cache_hits`/`cache_misses` are pulled live from the Cache Fabric at
    /// render time rather than mirrored into this struct, since the
    /// fabric's own `DashMap`-backed caches are the source of truth for
    /// them.
    #[must_use]
    pub fn render_prometheus(&self, cache_hits: u64, cache_misses: u64) -> String {
        let mut out = String::new();
        let endpoints = [
            Endpoint::Issue,
            Endpoint::OneTimeToken,
            Endpoint::Validate,
            Endpoint::Revoke,
        ];

        out.push_str("# HELP portcullis_requests_total Requests by endpoint and outcome\n");
        out.push_str("# TYPE portcullis_requests_total counter\n");
        for endpoint in endpoints {
            let counters = self.outcome_for(endpoint);
            out.push_str(&format!(
                "{}{{endpoint=\"{}\",outcome=\"success\"}} {}\n",
                names::REQUESTS_TOTAL,
                endpoint.label(),
                counters.success.load(Ordering::Relaxed)
            ));
            out.push_str(&format!(
                "{}{{endpoint=\"{}\",outcome=\"failure\"}} {}\n",
                names::REQUESTS_TOTAL,
                endpoint.label(),
                counters.failure.load(Ordering::Relaxed)
            ));
        }

        out.push_str("# HELP portcullis_cache_hits_total Cache fabric hits\n");
        out.push_str("# TYPE portcullis_cache_hits_total counter\n");
        out.push_str(&format!("{} {}\n", names::CACHE_HITS_TOTAL, cache_hits));

        out.push_str("# HELP portcullis_cache_misses_total Cache fabric misses\n");
        out.push_str("# TYPE portcullis_cache_misses_total counter\n");
        out.push_str(&format!("{} {}\n", names::CACHE_MISSES_TOTAL, cache_misses));

        out.push_str("# HELP portcullis_rate_limit_rejected_total Requests rejected at admission\n");
        out.push_str("# TYPE portcullis_rate_limit_rejected_total counter\n");
        out.push_str(&format!(
            "{} {}\n",
            names::RATE_LIMIT_REJECTED_TOTAL,
            self.rate_limit_rejected.load(Ordering::Relaxed)
        ));

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_split_by_endpoint_and_outcome() {
        let m = Metrics::new();
        m.record_request(Endpoint::Issue, true);
        m.record_request(Endpoint::Issue, false);
        m.record_request(Endpoint::Validate, true);

        let rendered = m.render_prometheus(0, 0);
        assert!(rendered.contains("endpoint=\"issue\",outcome=\"success\"} 1"));
        assert!(rendered.contains("endpoint=\"issue\",outcome=\"failure\"} 1"));
        assert!(rendered.contains("endpoint=\"validate\",outcome=\"success\"} 1"));
    }

    #[test]
    fn rate_limit_rejections_are_counted() {
        let m = Metrics::new();
        m.record_rate_limit_rejected();
        m.record_rate_limit_rejected();
        assert!(m
            .render_prometheus(0, 0)
            .contains(&format!("{} 2", names::RATE_LIMIT_REJECTED_TOTAL)));
    }
}
