//! The `Store` trait: the only component that performs I/O against the
//! canonical record. Stateless between calls; implementations own a
//! bounded connection pool internally.

use async_trait::async_trait;
use portcullis_core::{Client, Scope, Token, TokenStatus};

use crate::error::StoreError;

/// Parameterized access to the canonical record of clients, endpoint
/// scopes, and tokens. No business logic lives here.
///
/// Every method carries an implicit deadline chosen by the implementation
/// per the call class named in its doc comment (quick-read ≈1s,
/// read-write ≈3s, batch-write ≈10s). Implementations bind all parameters
/// positionally; the core never interpolates user input into query text —
/// this is a load-bearing security invariant, not a style preference.
#[async_trait]
pub trait Store: Send + Sync {
    /// Exact-match client lookup. Quick-read deadline.
    async fn get_client(&self, id: &str) -> Result<Client, StoreError>;

    /// Exact-match lookup over active endpoints by resource URL.
    /// Quick-read deadline.
    async fn get_endpoint_scope(&self, url: &str) -> Result<Scope, StoreError>;

    /// Returns `(revoked, kind)` in a single round-trip — collapsing what a
    /// naive design would issue as two reads, because token validation is
    /// the hottest path. Quick-read deadline.
    async fn get_token_status(&self, id: &str) -> Result<TokenStatus, StoreError>;

    /// Inserts all of `tokens` in a single transaction; all succeed or none
    /// do. Batch-write deadline.
    async fn insert_tokens_batch(&self, tokens: &[Token]) -> Result<(), StoreError>;

    /// A single-row UPDATE inside a transaction, committed before
    /// returning. Idempotent: revoking an already-revoked token (or one not
    /// yet durably written) succeeds silently, touching zero rows in the
    /// latter case. Read-write deadline.
    async fn revoke_token(
        &self,
        id: &str,
        revoked_at: time::OffsetDateTime,
    ) -> Result<(), StoreError>;

    /// Closes the connection pool. Called last in the Lifecycle
    /// Supervisor's shutdown sequence, after every other component has
    /// stopped. The in-memory backend has no pool and leaves this a no-op.
    async fn close(&self) {}
}
