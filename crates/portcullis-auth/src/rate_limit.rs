//! Rate Limiter: global + per-client token-bucket admission, checked in
//! order. The per-client bucket registry is a `DashMap` keyed by principal,
//! paired with `governor`'s token-bucket implementation for the actual
//! admission decision.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use governor::{Quota, RateLimiter as GovernorLimiter};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate and burst for one admission layer. Defaults: global 100 rps /
/// burst 10, per-client 10 rps / burst 2.
#[derive(Debug, Clone, Copy)]
pub struct RateConfig {
    pub rate_per_sec: u32,
    pub burst: u32,
}

impl RateConfig {
    fn quota(self) -> Quota {
        let rate = NonZeroU32::new(self.rate_per_sec.max(1)).unwrap();
        let burst = NonZeroU32::new(self.burst.max(1)).unwrap();
        Quota::per_second(rate).allow_burst(burst)
    }
}

struct ClientBucket {
    limiter: DirectLimiter,
    last_used: std::sync::Mutex<Instant>,
}

impl ClientBucket {
    fn new(config: RateConfig) -> Self {
        Self {
            limiter: GovernorLimiter::direct(config.quota()),
            last_used: std::sync::Mutex::new(Instant::now()),
        }
    }

    fn check(&self) -> bool {
        *self.last_used.lock().expect("bucket lock poisoned") = Instant::now();
        self.limiter.check().is_ok()
    }

    fn last_used(&self) -> Instant {
        *self.last_used.lock().expect("bucket lock poisoned")
    }
}

/// Two token-bucket layers admitted in order: global, then per-principal.
/// The per-client map is bounded via periodic pruning rather than a hard
/// cap, so admission never blocks on eviction.
pub struct RateLimiter {
    enabled: bool,
    global: DirectLimiter,
    per_client_config: RateConfig,
    per_client: DashMap<String, Arc<ClientBucket>>,
    map_soft_cap: usize,
    rejections: AtomicUsize,
}

impl RateLimiter {
    #[must_use]
    pub fn new(
        enabled: bool,
        global: RateConfig,
        per_client: RateConfig,
        map_soft_cap: usize,
    ) -> Self {
        Self {
            enabled,
            global: GovernorLimiter::direct(global.quota()),
            per_client_config: per_client,
            per_client: DashMap::new(),
            map_soft_cap,
            rejections: AtomicUsize::new(0),
        }
    }

    /// Admission decision for `principal`: admitted iff the global bucket
    /// consumes a token AND the per-client bucket for the identified
    /// principal consumes a token, else rejected. When disabled via the
    /// explicit enabled/disabled flag, every request is admitted.
    pub fn admit(&self, principal: &str) -> bool {
        if !self.enabled {
            return true;
        }

        if self.global.check().is_err() {
            self.rejections.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let bucket = self
            .per_client
            .entry(principal.to_string())
            .or_insert_with(|| Arc::new(ClientBucket::new(self.per_client_config)))
            .clone();

        let admitted = bucket.check();
        if !admitted {
            self.rejections.fetch_add(1, Ordering::Relaxed);
        }
        admitted
    }

    #[must_use]
    pub fn rejections(&self) -> usize {
        self.rejections.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn tracked_principals(&self) -> usize {
        self.per_client.len()
    }

    /// Batched eviction when the map exceeds its soft cap: removes 10% of
    /// entries or 100, whichever is larger, oldest-by-last-use first.
    /// Evicted principals start with a full bucket on their next request —
    /// acceptable because rate limits are soft.
    pub fn prune(&self) {
        let len = self.per_client.len();
        if len <= self.map_soft_cap {
            return;
        }

        let target_evictions = (len / 10).max(100).min(len);

        let mut candidates: Vec<(String, Instant)> = self
            .per_client
            .iter()
            .map(|e| (e.key().clone(), e.value().last_used()))
            .collect();
        candidates.sort_by_key(|(_, last_used)| *last_used);

        for (key, _) in candidates.into_iter().take(target_evictions) {
            self.per_client.remove(&key);
        }
    }
}
