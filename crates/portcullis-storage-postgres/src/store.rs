//! `Store` implementation against PostgreSQL.
//!
//! Every method is wrapped in `tokio::time::timeout` per its call class
//! (quick-read / read-write / batch-write); a tripped deadline surfaces as
//! `StoreError::DeadlineExceeded`, a retryable transport error the caller
//! (the Token Service) decides policy on. All parameters bind positionally
//! — the core never interpolates user input into query text.

use std::collections::HashSet;
use std::time::Duration as StdDuration;

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::row::Row;
use sqlx_postgres::{PgPool, PgRow};
use time::OffsetDateTime;
use tracing::instrument;

use async_trait::async_trait;
use portcullis_core::{Client, Scope, Token, TokenKind, TokenStatus};
use portcullis_storage::{Store, StoreError};

use crate::config::PostgresConfig;
use crate::error::map_sqlx_error;

pub struct PostgresStore {
    pool: PgPool,
    quick_read_timeout: StdDuration,
    read_write_timeout: StdDuration,
    batch_write_timeout: StdDuration,
}

impl PostgresStore {
    #[must_use]
    pub fn new(pool: PgPool, config: &PostgresConfig) -> Self {
        Self {
            pool,
            quick_read_timeout: StdDuration::from_millis(config.quick_read_timeout_ms),
            read_write_timeout: StdDuration::from_millis(config.read_write_timeout_ms),
            batch_write_timeout: StdDuration::from_millis(config.batch_write_timeout_ms),
        }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn with_deadline<F, T>(deadline: StdDuration, fut: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(deadline, fut)
            .await
            .unwrap_or(Err(StoreError::DeadlineExceeded))
    }
}

fn kind_to_str(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Normal => "normal",
        TokenKind::OneTime => "one_time",
    }
}

fn kind_from_str(s: &str) -> TokenKind {
    match s {
        "one_time" => TokenKind::OneTime,
        _ => TokenKind::Normal,
    }
}

fn scopes_to_json(scopes: &HashSet<Scope>) -> String {
    let v: Vec<&Scope> = scopes.iter().collect();
    serde_json::to_string(&v).unwrap_or_else(|_| "[]".to_string())
}

fn scopes_from_json(s: &str) -> HashSet<Scope> {
    serde_json::from_str::<Vec<String>>(s)
        .unwrap_or_default()
        .into_iter()
        .collect()
}

#[async_trait]
impl Store for PostgresStore {
    #[instrument(skip(self))]
    async fn get_client(&self, id: &str) -> Result<Client, StoreError> {
        Self::with_deadline(self.quick_read_timeout, async {
            let row: PgRow = query(
                "SELECT client_id, client_secret, access_token_ttl, allowed_scopes \
                 FROM clients WHERE client_id = $1 AND active",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .ok_or(StoreError::NotFound)?;

            let ttl_secs: i64 = row.try_get("access_token_ttl").map_err(map_sqlx_error)?;
            let scopes_json: String =
                row.try_get("allowed_scopes").map_err(map_sqlx_error)?;

            Ok(Client {
                id: row.try_get("client_id").map_err(map_sqlx_error)?,
                secret: row.try_get("client_secret").map_err(map_sqlx_error)?,
                token_ttl: time::Duration::seconds(ttl_secs),
                allowed_scopes: scopes_from_json(&scopes_json),
            })
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_endpoint_scope(&self, url: &str) -> Result<Scope, StoreError> {
        Self::with_deadline(self.quick_read_timeout, async {
            let scope: String = query_as::<_, (String,)>(
                "SELECT scope FROM endpoints WHERE endpoint_url = $1 AND active",
            )
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .ok_or(StoreError::NotFound)?
            .0;
            Ok(scope)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_token_status(&self, id: &str) -> Result<TokenStatus, StoreError> {
        Self::with_deadline(self.quick_read_timeout, async {
            let row: (bool, String) = query_as(
                "SELECT revoked, token_type FROM tokens WHERE token_id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .ok_or(StoreError::NotFound)?;
            Ok(TokenStatus {
                revoked: row.0,
                kind: kind_from_str(&row.1),
            })
        })
        .await
    }

    #[instrument(skip(self, tokens))]
    async fn insert_tokens_batch(&self, tokens: &[Token]) -> Result<(), StoreError> {
        Self::with_deadline(self.batch_write_timeout, async {
            let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
            for t in tokens {
                query(
                    "INSERT INTO tokens \
                     (token_id, token_type, jwt_token, client_id, issued_at, expires_at, scopes, revoked, revoked_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                )
                .bind(&t.id)
                .bind(kind_to_str(t.kind))
                .bind(&t.signed_form)
                .bind(&t.client_id)
                .bind(t.issued_at)
                .bind(t.expires_at)
                .bind(scopes_to_json(&t.scopes))
                .bind(t.revoked)
                .bind(t.revoked_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::batch_insert_failed(e.to_string()))?;
            }
            tx.commit().await.map_err(map_sqlx_error)?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn revoke_token(&self, id: &str, revoked_at: OffsetDateTime) -> Result<(), StoreError> {
        Self::with_deadline(self.read_write_timeout, async {
            let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
            // Idempotent: touches zero rows if the token was never flushed
            // or is already revoked, and still succeeds.
            query("UPDATE tokens SET revoked = TRUE, revoked_at = $2 WHERE token_id = $1")
                .bind(id)
                .bind(revoked_at)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            tx.commit().await.map_err(map_sqlx_error)?;
            Ok(())
        })
        .await
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_json_round_trips() {
        let scopes: HashSet<Scope> = ["read:ltp".to_string(), "read:quote".to_string()]
            .into_iter()
            .collect();
        let json = scopes_to_json(&scopes);
        assert_eq!(scopes_from_json(&json), scopes);
    }

    #[test]
    fn kind_round_trips_through_str() {
        assert_eq!(kind_from_str(kind_to_str(TokenKind::Normal)), TokenKind::Normal);
        assert_eq!(kind_from_str(kind_to_str(TokenKind::OneTime)), TokenKind::OneTime);
    }
}
