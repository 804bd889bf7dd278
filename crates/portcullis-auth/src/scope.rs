//! Scope Authorizer: maps an incoming resource URL to its required scope
//! via cache-then-store lookup, then checks set-membership against the
//! token's scopes. Matching is exact-string; no hierarchy, no wildcard.

use std::collections::HashSet;
use std::sync::Arc;

use portcullis_core::Scope;
use portcullis_storage::{Store, StoreError};

use crate::cache::EndpointCache;

pub struct ScopeAuthorizer {
    endpoints: Arc<EndpointCache>,
    store: Arc<dyn Store>,
}

impl ScopeAuthorizer {
    #[must_use]
    pub fn new(endpoints: Arc<EndpointCache>, store: Arc<dyn Store>) -> Self {
        Self { endpoints, store }
    }

    /// Resolves the scope required by `resource_url`, consulting the cache
    /// (shared with the rest of the Cache Fabric) before falling back to
    /// the store.
    pub async fn required_scope(&self, resource_url: &str) -> Result<Scope, StoreError> {
        if let Some(scope) = self.endpoints.get(resource_url) {
            return Ok(scope);
        }
        let scope = self.store.get_endpoint_scope(resource_url).await?;
        self.endpoints.put(resource_url.to_string(), scope.clone());
        Ok(scope)
    }

    /// Authorization succeeds iff the required scope is a member of the
    /// token's scope set.
    #[must_use]
    pub fn permits(required: &Scope, token_scopes: &HashSet<Scope>) -> bool {
        token_scopes.contains(required)
    }
}
