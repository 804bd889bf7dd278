//! Cache Fabric: three thread-safe maps backed by `DashMap` (sharded
//! internal locking, constant-time expectation, no I/O under any lock).
//!
//! `ClientCache` and `EndpointCache` are simple populate-on-read maps with
//! no TTL: admin-managed, explicit eviction only. `TokenStatusCache`
//! carries the load-bearing asymmetry: it is authoritative for "revoked",
//! never for "not revoked".

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration as StdDuration, Instant};

use dashmap::DashMap;

use portcullis_core::{Client, Scope, TokenKind};

/// Hit/miss counters shared by every cache in the fabric, exported via
/// `GET /auth-server/v1/oauth/metrics`.
#[derive(Debug, Default)]
struct HitMissCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl HitMissCounters {
    fn record(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn totals(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

/// `id -> Client`. Populated on first read; no TTL.
#[derive(Debug, Default)]
pub struct ClientCache {
    entries: DashMap<String, Client>,
    counters: HitMissCounters,
}

impl ClientCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Client> {
        let found = self.entries.get(id).map(|e| e.value().clone());
        self.counters.record(found.is_some());
        found
    }

    pub fn put(&self, client: Client) {
        self.entries.insert(client.id.clone(), client);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evicts everything. Called at shutdown or on an administrative
    /// signal — neither of which this core exposes as an endpoint yet, but
    /// the Lifecycle Supervisor calls this during teardown.
    pub fn clear(&self) {
        self.entries.clear();
    }

    fn hit_miss_totals(&self) -> (u64, u64) {
        self.counters.totals()
    }
}

/// `url -> Scope`. Same discipline as `ClientCache`.
#[derive(Debug, Default)]
pub struct EndpointCache {
    entries: DashMap<String, Scope>,
    counters: HitMissCounters,
}

impl EndpointCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, url: &str) -> Option<Scope> {
        let found = self.entries.get(url).map(|e| e.value().clone());
        self.counters.record(found.is_some());
        found
    }

    pub fn put(&self, url: String, scope: Scope) {
        self.entries.insert(url, scope);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    fn hit_miss_totals(&self) -> (u64, u64) {
        self.counters.totals()
    }
}

#[derive(Debug, Clone, Copy)]
struct TokenStatusEntry {
    revoked: bool,
    kind: TokenKind,
    inserted_at: Instant,
}

/// `id -> (revoked, kind, inserted_at)`. TTL = 1 hour; swept every 10
/// minutes by a background worker.
///
/// **Coherence rule (critical):** this cache is authoritative for
/// "revoked=true" — a positive revoke observed here is never stale. It is
/// NOT authoritative for "revoked=false": a miss, or a cached `false`, only
/// means "no revoke seen on this node within the TTL window"; the caller
/// must still consult the store on a cache miss.
#[derive(Debug)]
pub struct TokenStatusCache {
    entries: DashMap<String, TokenStatusEntry>,
    ttl: StdDuration,
    evictions: AtomicUsize,
    counters: HitMissCounters,
}

impl TokenStatusCache {
    #[must_use]
    pub fn new(ttl: StdDuration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            evictions: AtomicUsize::new(0),
            counters: HitMissCounters::default(),
        }
    }

    /// Returns `Some((revoked, kind))` if a live (non-expired) cache entry
    /// exists, `None` on a cache miss (never seen, or past its TTL).
    #[must_use]
    pub fn get(&self, id: &str) -> Option<(bool, TokenKind)> {
        let result = self.entries.get(id).and_then(|entry| {
            if entry.inserted_at.elapsed() > self.ttl {
                None
            } else {
                Some((entry.revoked, entry.kind))
            }
        });
        self.counters.record(result.is_some());
        result
    }

    /// Records a store read's result. Called on a store-confirmed
    /// `revoked=false`: the entry is written, so subsequent reads hit
    /// the cache.
    pub fn put(&self, id: String, revoked: bool, kind: TokenKind) {
        self.entries.insert(
            id,
            TokenStatusEntry {
                revoked,
                kind,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Marks an entry revoked immediately and unconditionally — this is the
    /// only write path that is authoritative regardless of what was cached
    /// before: on a successful revoke, the entry is immediately written
    /// with `revoked=true`. `kind` defaults to the prior entry's
    /// kind if known, else `Normal` (a freshly-submitted-but-not-yet-synced
    /// token has no prior cache entry to read `kind` from; the Token
    /// Service always has `kind` in hand at the revoke call site and should
    /// prefer the overload that takes it explicitly — see `mark_revoked_as`).
    pub fn mark_revoked(&self, id: String) {
        let kind = self.entries.get(&id).map(|e| e.kind).unwrap_or(TokenKind::Normal);
        self.mark_revoked_as(id, kind);
    }

    /// Same as `mark_revoked` but with an explicit `kind`, avoiding the
    /// lookup-then-default dance when the caller already knows it.
    pub fn mark_revoked_as(&self, id: String, kind: TokenKind) {
        self.entries.insert(
            id,
            TokenStatusEntry {
                revoked: true,
                kind,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Sweeps entries past their TTL. Intended to run on a 10-minute tick
    /// from a background worker.
    pub fn sweep(&self) {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.inserted_at.elapsed() <= ttl);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.evictions.fetch_add(removed, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn evictions(&self) -> usize {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    fn hit_miss_totals(&self) -> (u64, u64) {
        self.counters.totals()
    }
}

/// Groups the three caches the Token Service and Scope Authorizer share,
/// constructed once by the Lifecycle Supervisor as explicit values rather
/// than module-level singletons.
pub struct CacheFabric {
    pub clients: ClientCache,
    /// Shared via `Arc` so the Scope Authorizer reads and writes the exact
    /// same endpoint-scope cache the fabric reports metrics for, rather
    /// than a disconnected copy of its own.
    pub endpoints: std::sync::Arc<EndpointCache>,
    /// Shared via `Arc` so the revocation queue's background worker marks
    /// the exact same cache instance the Token Service reads from in
    /// `status_of` — not a lookalike copy.
    pub token_status: std::sync::Arc<TokenStatusCache>,
}

impl CacheFabric {
    #[must_use]
    pub fn new(token_status_ttl: StdDuration) -> Self {
        Self {
            clients: ClientCache::new(),
            endpoints: std::sync::Arc::new(EndpointCache::new()),
            token_status: std::sync::Arc::new(TokenStatusCache::new(token_status_ttl)),
        }
    }

    /// Called by the Lifecycle Supervisor at shutdown.
    pub fn clear_all(&self) {
        self.clients.clear();
        self.endpoints.clear();
        self.token_status.clear();
    }

    /// Aggregate hit/miss totals across all three caches, rendered by
    /// `portcullis-server`'s `/metrics` endpoint.
    #[must_use]
    pub fn hit_miss_totals(&self) -> (u64, u64) {
        let (ch, cm) = self.clients.hit_miss_totals();
        let (eh, em) = self.endpoints.hit_miss_totals();
        let (th, tm) = self.token_status.hit_miss_totals();
        (ch + eh + th, cm + em + tm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread::sleep;
    use time::Duration;

    fn client(id: &str) -> Client {
        Client {
            id: id.into(),
            secret: "s".into(),
            token_ttl: Duration::hours(1),
            allowed_scopes: HashSet::new(),
        }
    }

    #[test]
    fn client_cache_put_then_get() {
        let cache = ClientCache::new();
        assert!(cache.get("c1").is_none());
        cache.put(client("c1"));
        assert_eq!(cache.get("c1").unwrap().id, "c1");
    }

    #[test]
    fn token_status_cache_expires_after_ttl() {
        let cache = TokenStatusCache::new(StdDuration::from_millis(10));
        cache.put("tok-1".into(), false, TokenKind::Normal);
        assert_eq!(cache.get("tok-1"), Some((false, TokenKind::Normal)));
        sleep(StdDuration::from_millis(30));
        assert_eq!(cache.get("tok-1"), None);
    }

    #[test]
    fn mark_revoked_overrides_cached_false_immediately() {
        let cache = TokenStatusCache::new(StdDuration::from_secs(3600));
        cache.put("tok-1".into(), false, TokenKind::OneTime);
        cache.mark_revoked("tok-1".into());
        assert_eq!(cache.get("tok-1"), Some((true, TokenKind::OneTime)));
    }

    #[test]
    fn mark_revoked_without_prior_entry_works_for_unflushed_tokens() {
        // Revoke racing ahead of the batch flush must still mark the
        // cache, even though the store has nothing to update yet.
        let cache = TokenStatusCache::new(StdDuration::from_secs(3600));
        cache.mark_revoked_as("tok-2".into(), TokenKind::OneTime);
        assert_eq!(cache.get("tok-2"), Some((true, TokenKind::OneTime)));
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let cache = TokenStatusCache::new(StdDuration::from_millis(10));
        cache.put("old".into(), false, TokenKind::Normal);
        sleep(StdDuration::from_millis(30));
        cache.put("fresh".into(), false, TokenKind::Normal);
        cache.sweep();
        assert_eq!(cache.len(), 1);
        assert!(cache.get("fresh").is_some());
    }
}
