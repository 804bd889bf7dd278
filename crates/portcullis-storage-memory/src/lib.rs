//! In-memory `Store` implementation.
//!
//! This backend is used by the integration test suite (so tests need no
//! database) and is suitable for local development. It has no durability
//! across process restarts — the tradeoff is acceptable here because the
//! Store trait already models "not found" and "transient failure" as first
//! class, and nothing in the core depends on cross-restart persistence.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use portcullis_core::{Client, ResourceEndpoint, Token, TokenStatus};
use portcullis_storage::{Store, StoreError};
use time::OffsetDateTime;

/// In-memory storage backend using `DashMap` for lock-free concurrent
/// access, matching the concurrency posture the Cache Fabric expects from
/// its Store reads.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    clients: DashMap<String, Client>,
    endpoints: DashMap<String, ResourceEndpoint>,
    tokens: DashMap<String, Token>,
    /// Count of `insert_tokens_batch` calls that actually touched the
    /// store, exposed so tests can assert that a revoke-then-validate
    /// cycle intercepts at the cache without a store read.
    batch_write_calls: AtomicU64,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an administrator-managed client. Out-of-band in production
    ///; exposed here so tests and local dev can populate the store.
    pub fn seed_client(&self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    /// Seeds an administrator-managed resource endpoint.
    pub fn seed_endpoint(&self, endpoint: ResourceEndpoint) {
        self.endpoints.insert(endpoint.url.clone(), endpoint);
    }

    /// Number of times `insert_tokens_batch` has run against this store.
    /// Used in tests to assert that cache hits avoid store reads.
    #[must_use]
    pub fn batch_write_calls(&self) -> u64 {
        self.batch_write_calls.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn from_seed(
        clients: impl IntoIterator<Item = Client>,
        endpoints: impl IntoIterator<Item = ResourceEndpoint>,
    ) -> Self {
        let store = Self::new();
        for c in clients {
            store.seed_client(c);
        }
        for e in endpoints {
            store.seed_endpoint(e);
        }
        store
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_client(&self, id: &str) -> Result<Client, StoreError> {
        self.clients
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound)
    }

    async fn get_endpoint_scope(&self, url: &str) -> Result<portcullis_core::Scope, StoreError> {
        self.endpoints
            .get(url)
            .filter(|entry| entry.active)
            .map(|entry| entry.required_scope.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn get_token_status(&self, id: &str) -> Result<TokenStatus, StoreError> {
        self.tokens
            .get(id)
            .map(|entry| TokenStatus {
                revoked: entry.revoked,
                kind: entry.kind,
            })
            .ok_or(StoreError::NotFound)
    }

    async fn insert_tokens_batch(&self, tokens: &[Token]) -> Result<(), StoreError> {
        // Single "transaction": stage into a scratch map first so a
        // mid-batch failure (there is none here, but a real backend can
        // fail partway) never leaves a partial batch visible.
        let mut staged: HashMap<String, Token> = HashMap::with_capacity(tokens.len());
        for t in tokens {
            staged.insert(t.id.clone(), t.clone());
        }
        for (id, token) in staged {
            self.tokens.insert(id, token);
        }
        self.batch_write_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn revoke_token(&self, id: &str, revoked_at: OffsetDateTime) -> Result<(), StoreError> {
        // Idempotent, and a token not yet flushed by the Batch Writer
        // touches zero rows and still succeeds.
        if let Some(mut entry) = self.tokens.get_mut(id) {
            entry.revoked = true;
            entry.revoked_at = Some(revoked_at);
        }
        Ok(())
    }
}
