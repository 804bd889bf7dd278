//! Token Service: the lifecycle state machine orchestrating issue,
//! validate, and revoke over the Store, Cache Fabric, Token Codec, Batch
//! Writer, and Scope Authorizer.

use std::collections::HashSet;
use std::sync::Arc;

use time::OffsetDateTime;

use portcullis_core::{Client, Scope, Token, TokenKind, MAX_CREDENTIAL_LEN};
use portcullis_storage::{Store, StoreError};

use crate::audit::{emit, AuditEvent};
use crate::batch_writer::BatchWriter;
use crate::cache::CacheFabric;
use crate::codec::{Claims, TokenCodec};
use crate::error::ServiceError;
use crate::revocation_queue::RevocationQueue;
use crate::scope::ScopeAuthorizer;

/// `POST /auth-server/v1/oauth/token` and `.../one-time-token` request body.
/// The only supported `grant_type` is `client_credentials`.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub client_id: String,
    pub client_secret: String,
    pub grant_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

const SUPPORTED_GRANT_TYPE: &str = "client_credentials";

pub struct TokenService {
    store: Arc<dyn Store>,
    caches: Arc<CacheFabric>,
    codec: TokenCodec,
    batch_writer: BatchWriter,
    scope_authorizer: ScopeAuthorizer,
    revocation_queue: RevocationQueue,
}

impl TokenService {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        caches: Arc<CacheFabric>,
        codec: TokenCodec,
        batch_writer: BatchWriter,
        scope_authorizer: ScopeAuthorizer,
        revocation_queue: RevocationQueue,
    ) -> Self {
        Self {
            store,
            caches,
            codec,
            batch_writer,
            scope_authorizer,
            revocation_queue,
        }
    }

    /// Issues a fresh token of `kind` for the request's client.
    pub async fn issue(
        &self,
        request: &IssueRequest,
        kind: TokenKind,
    ) -> Result<IssueResponse, ServiceError> {
        validate_shape(request)?;

        if request.grant_type != SUPPORTED_GRANT_TYPE {
            return Err(ServiceError::UnsupportedGrantType);
        }

        let client = self.lookup_client(&request.client_id).await?;

        // Same error class for unknown client and wrong secret, to defeat
        // enumeration.
        if !client.secret_matches(&request.client_secret) {
            return Err(ServiceError::InvalidClient);
        }

        let now = OffsetDateTime::now_utc();
        let token_id = Token::new_id();
        let expires_at = now + kind.ttl();

        let claims = Claims {
            client_id: client.id.clone(),
            token_id: token_id.clone(),
            kind,
            scopes: client.allowed_scopes.clone(),
            issued_at: now,
            not_before: now,
            expires_at,
            issuer: self.codec.issuer().to_string(),
        };

        let signed_form = self
            .codec
            .sign(&claims)
            .map_err(|_| ServiceError::ServerError("token signing failed".into()))?;

        let record = Token {
            id: token_id,
            kind,
            client_id: client.id.clone(),
            issued_at: now,
            expires_at,
            scopes: client.allowed_scopes.clone(),
            revoked: false,
            revoked_at: None,
            signed_form: signed_form.clone(),
        };

        // The client receives the token before it is durably written —
        // submission never blocks on I/O.
        self.batch_writer.submit(record).await;

        emit(&AuditEvent::TokenIssued {
            client_id: &client.id,
            token_id: &claims.token_id,
            kind,
        });

        Ok(IssueResponse {
            access_token: signed_form,
            token_type: "Bearer",
            expires_in: kind.ttl().whole_seconds(),
        })
    }

    /// Validates a presented bearer token against `resource_url`.
    pub async fn validate(&self, bearer_token: &str, resource_url: &str) -> Result<(), ServiceError> {
        let claims = self.codec.verify(bearer_token)?;

        let (revoked, _kind) = self.status_of(&claims.token_id, claims.kind).await?;
        if revoked {
            return Err(ServiceError::Unauthorized);
        }

        if claims.kind == TokenKind::OneTime {
            // Scheduled, not awaited — the validation result below is
            // based on current state.
            self.revocation_queue
                .schedule(claims.token_id.clone(), claims.kind);
        }

        let required_scope = self
            .scope_authorizer
            .required_scope(resource_url)
            .await
            .map_err(|err| match err {
                StoreError::NotFound => ServiceError::Forbidden,
                other => ServiceError::ServerError(other.to_string()),
            })?;

        let permitted = ScopeAuthorizer::permits(&required_scope, &claims.scopes);
        emit(&AuditEvent::TokenValidated {
            token_id: &claims.token_id,
            resource_url,
            permitted,
        });

        if !permitted {
            return Err(ServiceError::Forbidden);
        }

        Ok(())
    }

    /// Revokes a presented bearer token: synchronous store
    /// write, then cache mark, both awaited before responding.
    pub async fn revoke(&self, bearer_token: &str) -> Result<(), ServiceError> {
        let claims = self.codec.verify(bearer_token)?;

        let now = OffsetDateTime::now_utc();
        self.store
            .revoke_token(&claims.token_id, now)
            .await
            .map_err(|err| ServiceError::ServerError(err.to_string()))?;

        self.caches
            .token_status
            .mark_revoked_as(claims.token_id.clone(), claims.kind);

        emit(&AuditEvent::TokenRevoked {
            token_id: &claims.token_id,
            revoked_at: now,
        });

        Ok(())
    }

    /// Forces an immediate flush of any buffered, not-yet-durable tokens.
    /// Used by the Lifecycle Supervisor's shutdown sequence and by
    /// tests that need a deterministic store state.
    pub async fn flush_pending(&self) {
        self.batch_writer.flush_now().await;
    }

    /// Aggregate Cache Fabric hit/miss totals, surfaced by the HTTP metrics
    /// endpoint.
    #[must_use]
    pub fn cache_hit_miss_totals(&self) -> (u64, u64) {
        self.caches.hit_miss_totals()
    }

    /// `(revoked, kind)` via cache-then-store: a cached positive revoke
    /// is authoritative; everything else falls through to the store.
    async fn status_of(
        &self,
        token_id: &str,
        claimed_kind: TokenKind,
    ) -> Result<(bool, TokenKind), ServiceError> {
        // A live cache entry is used as-is, whichever way it reads: a
        // cached `true` is authoritative, and a cached `false` is the
        // accepted up-to-TTL staleness window for cross-node revokes. Only
        // a genuine miss falls through to the store.
        if let Some((revoked, kind)) = self.caches.token_status.get(token_id) {
            return Ok((revoked, kind));
        }

        match self.store.get_token_status(token_id).await {
            Ok(status) => {
                self.caches
                    .token_status
                    .put(token_id.to_string(), status.revoked, status.kind);
                Ok((status.revoked, status.kind))
            }
            Err(StoreError::NotFound) => {
                // A token handed to the client before its batch flush
                // completes is unknown to the store yet still valid by
                // signature alone. Absent a cached positive revoke, treat
                // an un-persisted-but-signature-valid token as not revoked.
                Ok((false, claimed_kind))
            }
            Err(err) => Err(ServiceError::ServerError(err.to_string())),
        }
    }

    async fn lookup_client(&self, client_id: &str) -> Result<Client, ServiceError> {
        if let Some(client) = self.caches.clients.get(client_id) {
            return Ok(client);
        }
        match self.store.get_client(client_id).await {
            Ok(client) => {
                self.caches.clients.put(client.clone());
                Ok(client)
            }
            Err(StoreError::NotFound) => Err(ServiceError::InvalidClient),
            Err(err) => Err(ServiceError::ServerError(err.to_string())),
        }
    }
}

/// Parses the `Authorization: Bearer <token>` header value used by both
/// validate and revoke. Missing or malformed → `unauthorized`.
#[must_use]
pub fn parse_bearer(header_value: Option<&str>) -> Result<&str, ServiceError> {
    let value = header_value.ok_or(ServiceError::Unauthorized)?;
    value
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
        .ok_or(ServiceError::Unauthorized)
}

fn validate_shape(request: &IssueRequest) -> Result<(), ServiceError> {
    if request.client_id.is_empty() || request.client_id.len() > MAX_CREDENTIAL_LEN {
        return Err(ServiceError::InvalidRequest("invalid client_id length".into()));
    }
    if request.client_secret.is_empty() || request.client_secret.len() > MAX_CREDENTIAL_LEN {
        return Err(ServiceError::InvalidRequest(
            "invalid client_secret length".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch_writer::BatchWriterConfig;
    use portcullis_core::ResourceEndpoint;
    use portcullis_storage_memory::InMemoryStore;
    use std::time::Duration as StdDuration;

    fn secret() -> Vec<u8> {
        b"0123456789abcdef0123456789abcdef".to_vec()
    }

    fn build_service(store: Arc<InMemoryStore>) -> TokenService {
        let caches = Arc::new(CacheFabric::new(StdDuration::from_secs(3600)));
        let codec = TokenCodec::new(&secret(), "portcullis").unwrap();
        let batch_writer = BatchWriter::new(
            store.clone(),
            BatchWriterConfig {
                max_batch: 1000,
                flush_interval: StdDuration::from_secs(3600),
            },
        );
        let scope_authorizer = ScopeAuthorizer::new(caches.endpoints.clone(), store.clone());
        let (revocation_queue, _shutdown) = RevocationQueue::start(
            store.clone(),
            caches.token_status.clone(),
            64,
        );
        TokenService::new(
            store,
            caches,
            codec,
            batch_writer,
            scope_authorizer,
            revocation_queue,
        )
    }

    fn seed_client(store: &InMemoryStore) {
        store.seed_client(Client {
            id: "test-client".into(),
            secret: "test-secret-123".into(),
            token_ttl: time::Duration::hours(1),
            allowed_scopes: HashSet::from(["read:ltp".to_string(), "read:quote".to_string()]),
        });
    }

    fn seed_endpoint(store: &InMemoryStore) {
        store.seed_endpoint(ResourceEndpoint {
            url: "http://localhost:8082/resource1".into(),
            required_scope: "read:ltp".into(),
            active: true,
        });
    }

    fn issue_req() -> IssueRequest {
        IssueRequest {
            client_id: "test-client".into(),
            client_secret: "test-secret-123".into(),
            grant_type: "client_credentials".into(),
        }
    }

    #[tokio::test]
    async fn issue_then_validate_permits() {
        let store = Arc::new(InMemoryStore::new());
        seed_client(&store);
        seed_endpoint(&store);
        let service = build_service(store);

        let resp = service.issue(&issue_req(), TokenKind::Normal).await.unwrap();
        assert_eq!(resp.expires_in, 3600);

        service
            .validate(&resp.access_token, "http://localhost:8082/resource1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn validate_against_unrequired_scope_is_forbidden() {
        let store = Arc::new(InMemoryStore::new());
        seed_client(&store);
        store.seed_endpoint(ResourceEndpoint {
            url: "http://localhost:8082/resource2".into(),
            required_scope: "write:quote".into(),
            active: true,
        });
        let service = build_service(store);

        let resp = service.issue(&issue_req(), TokenKind::Normal).await.unwrap();
        let err = service
            .validate(&resp.access_token, "http://localhost:8082/resource2")
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "forbidden");
    }

    #[tokio::test]
    async fn unsupported_grant_type_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        seed_client(&store);
        let service = build_service(store);

        let mut req = issue_req();
        req.grant_type = "authorization_code".into();
        let err = service.issue(&req, TokenKind::Normal).await.unwrap_err();
        assert_eq!(err.oauth_error_code(), "unsupported_grant_type");
    }

    #[tokio::test]
    async fn wrong_secret_and_unknown_client_share_error_class() {
        let store = Arc::new(InMemoryStore::new());
        seed_client(&store);
        let service = build_service(store);

        let mut wrong_secret = issue_req();
        wrong_secret.client_secret = "nope".into();
        let err_a = service.issue(&wrong_secret, TokenKind::Normal).await.unwrap_err();

        let mut unknown_client = issue_req();
        unknown_client.client_id = "ghost".into();
        let err_b = service.issue(&unknown_client, TokenKind::Normal).await.unwrap_err();

        assert_eq!(err_a.oauth_error_code(), "invalid_client");
        assert_eq!(err_b.oauth_error_code(), "invalid_client");
    }

    #[tokio::test]
    async fn revoke_then_validate_denies_via_cache_without_store_read() {
        let store = Arc::new(InMemoryStore::new());
        seed_client(&store);
        seed_endpoint(&store);
        let service = build_service(store.clone());

        let resp = service.issue(&issue_req(), TokenKind::Normal).await.unwrap();
        service.flush_pending().await;

        service.revoke(&resp.access_token).await.unwrap();

        let err = service
            .validate(&resp.access_token, "http://localhost:8082/resource1")
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "unauthorized");
    }

    #[tokio::test]
    async fn l3_revoke_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        seed_client(&store);
        let service = build_service(store);

        let resp = service.issue(&issue_req(), TokenKind::Normal).await.unwrap();
        service.revoke(&resp.access_token).await.unwrap();
        service.revoke(&resp.access_token).await.unwrap();
    }

    #[tokio::test]
    async fn boundary_256_char_client_id_is_invalid_request() {
        let store = Arc::new(InMemoryStore::new());
        let service = build_service(store);

        let mut req = issue_req();
        req.client_id = "a".repeat(256);
        let err = service.issue(&req, TokenKind::Normal).await.unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_request");
    }

    #[tokio::test]
    async fn boundary_empty_secret_is_invalid_request() {
        let store = Arc::new(InMemoryStore::new());
        let service = build_service(store);

        let mut req = issue_req();
        req.client_secret = String::new();
        let err = service.issue(&req, TokenKind::Normal).await.unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_request");
    }

    #[test]
    fn parse_bearer_requires_prefix() {
        assert!(parse_bearer(Some("Bearer abc")).is_ok());
        assert!(parse_bearer(Some("abc")).is_err());
        assert!(parse_bearer(Some("Bearer ")).is_err());
        assert!(parse_bearer(None).is_err());
    }

    #[tokio::test]
    async fn expired_token_is_unauthorized_on_validate() {
        let store = Arc::new(InMemoryStore::new());
        seed_client(&store);
        seed_endpoint(&store);
        let service = build_service(store);

        let codec = TokenCodec::new(&secret(), "portcullis").unwrap();
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            client_id: "test-client".into(),
            token_id: "expired-tok".into(),
            kind: TokenKind::Normal,
            scopes: HashSet::from(["read:ltp".to_string()]),
            issued_at: now - time::Duration::hours(2),
            not_before: now - time::Duration::hours(2),
            expires_at: now - time::Duration::milliseconds(1),
            issuer: "portcullis".into(),
        };
        let token = codec.sign(&claims).unwrap();

        let err = service
            .validate(&token, "http://localhost:8082/resource1")
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "unauthorized");
    }

    /// Delegates every call to the wrapped store except `get_endpoint_scope`,
    /// which always fails with a transient, non-`NotFound` error — used to
    /// assert that scope-resolution failures other than `NotFound` surface
    /// as `server_error`, not `forbidden`.
    struct FaultyScopeStore(Arc<InMemoryStore>);

    #[async_trait::async_trait]
    impl portcullis_storage::Store for FaultyScopeStore {
        async fn get_client(&self, id: &str) -> Result<Client, portcullis_storage::StoreError> {
            self.0.get_client(id).await
        }

        async fn get_endpoint_scope(
            &self,
            _url: &str,
        ) -> Result<Scope, portcullis_storage::StoreError> {
            Err(portcullis_storage::StoreError::DeadlineExceeded)
        }

        async fn get_token_status(
            &self,
            id: &str,
        ) -> Result<portcullis_core::TokenStatus, portcullis_storage::StoreError> {
            self.0.get_token_status(id).await
        }

        async fn insert_tokens_batch(
            &self,
            tokens: &[Token],
        ) -> Result<(), portcullis_storage::StoreError> {
            self.0.insert_tokens_batch(tokens).await
        }

        async fn revoke_token(
            &self,
            id: &str,
            revoked_at: OffsetDateTime,
        ) -> Result<(), portcullis_storage::StoreError> {
            self.0.revoke_token(id, revoked_at).await
        }
    }

    #[tokio::test]
    async fn transient_scope_lookup_failure_is_server_error_not_forbidden() {
        let inner = Arc::new(InMemoryStore::new());
        seed_client(&inner);
        let store: Arc<dyn portcullis_storage::Store> = Arc::new(FaultyScopeStore(inner));

        let caches = Arc::new(CacheFabric::new(StdDuration::from_secs(3600)));
        let codec = TokenCodec::new(&secret(), "portcullis").unwrap();
        let batch_writer = BatchWriter::new(
            store.clone(),
            BatchWriterConfig {
                max_batch: 1000,
                flush_interval: StdDuration::from_secs(3600),
            },
        );
        let scope_authorizer = ScopeAuthorizer::new(caches.endpoints.clone(), store.clone());
        let (revocation_queue, _shutdown) =
            RevocationQueue::start(store.clone(), caches.token_status.clone(), 64);
        let service = TokenService::new(
            store,
            caches,
            codec,
            batch_writer,
            scope_authorizer,
            revocation_queue,
        );

        let resp = service.issue(&issue_req(), TokenKind::Normal).await.unwrap();
        let err = service
            .validate(&resp.access_token, "http://localhost:8082/resource1")
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "server_error");
    }
}
