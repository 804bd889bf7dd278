//! Schema management for the PostgreSQL backend.
//!
//! The schema is owned by the store and consumed by the core; this module
//! applies the three tables (`clients`, `tokens`, `endpoints`) as a single
//! idempotent DDL batch. A real deployment is expected to run this via
//! `sqlx-cli`/a migrations pipeline; `ensure_schema` exists so local
//! development and the integration test suite can stand up a throwaway
//! database without a separate tool.

use sqlx_postgres::PgPool;
use tracing::{info, instrument};

use crate::error::map_sqlx_error;
use portcullis_storage::StoreError;

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS clients (
    client_id          TEXT PRIMARY KEY,
    client_secret       TEXT NOT NULL,
    client_name         TEXT,
    access_token_ttl    BIGINT NOT NULL,
    allowed_scopes      TEXT NOT NULL,
    active              BOOLEAN NOT NULL DEFAULT TRUE
);

CREATE TABLE IF NOT EXISTS endpoints (
    id              BIGSERIAL PRIMARY KEY,
    client_id       TEXT REFERENCES clients(client_id),
    scope           TEXT NOT NULL,
    method          TEXT,
    endpoint_url    TEXT NOT NULL,
    description     TEXT,
    active          BOOLEAN NOT NULL DEFAULT TRUE
);

CREATE UNIQUE INDEX IF NOT EXISTS endpoints_url_idx ON endpoints (endpoint_url) WHERE active;

CREATE TABLE IF NOT EXISTS tokens (
    token_id        TEXT PRIMARY KEY,
    token_type      TEXT NOT NULL,
    jwt_token       TEXT NOT NULL,
    client_id       TEXT NOT NULL REFERENCES clients(client_id),
    issued_at       TIMESTAMPTZ NOT NULL,
    expires_at      TIMESTAMPTZ NOT NULL,
    scopes          TEXT NOT NULL,
    revoked         BOOLEAN NOT NULL DEFAULT FALSE,
    revoked_at      TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS tokens_client_id_idx ON tokens (client_id);
CREATE INDEX IF NOT EXISTS tokens_expires_at_idx ON tokens (expires_at);
CREATE INDEX IF NOT EXISTS tokens_revoked_idx ON tokens (revoked);
"#;

#[instrument(skip(pool))]
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    info!("applying Portcullis schema (clients, endpoints, tokens)");
    sqlx_core::query::query(DDL)
        .execute(pool)
        .await
        .map_err(map_sqlx_error)?;
    Ok(())
}
