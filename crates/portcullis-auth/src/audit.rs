//! Audit log: OAuth-significant events logged through a dedicated
//! `tracing` target distinct from ordinary request logs, carving audit
//! records out of the request-log stream.

use portcullis_core::TokenKind;
use time::OffsetDateTime;

/// The dedicated `tracing` target operators can route separately from
/// request logs.
pub const AUDIT_TARGET: &str = "portcullis::audit";

#[derive(Debug, Clone)]
pub enum AuditEvent<'a> {
    TokenIssued {
        client_id: &'a str,
        token_id: &'a str,
        kind: TokenKind,
    },
    TokenValidated {
        token_id: &'a str,
        resource_url: &'a str,
        permitted: bool,
    },
    TokenRevoked {
        token_id: &'a str,
        revoked_at: OffsetDateTime,
    },
    RateLimitRejected {
        principal: &'a str,
    },
}

/// Emits `event` on the audit target. Never passes a client secret, bearer
/// token, or raw `Authorization` header value as a field — only derived
/// identifiers (client id, token id) ever reach this log.
pub fn emit(event: &AuditEvent<'_>) {
    match event {
        AuditEvent::TokenIssued {
            client_id,
            token_id,
            kind,
        } => {
            tracing::info!(
                target: AUDIT_TARGET,
                client_id = %client_id,
                token_id = %token_id,
                kind = ?kind,
                "token issued"
            );
        }
        AuditEvent::TokenValidated {
            token_id,
            resource_url,
            permitted,
        } => {
            tracing::info!(
                target: AUDIT_TARGET,
                token_id = %token_id,
                resource_url = %resource_url,
                permitted = permitted,
                "token validated"
            );
        }
        AuditEvent::TokenRevoked {
            token_id,
            revoked_at,
        } => {
            tracing::info!(
                target: AUDIT_TARGET,
                token_id = %token_id,
                revoked_at = %revoked_at,
                "token revoked"
            );
        }
        AuditEvent::RateLimitRejected { principal } => {
            tracing::warn!(
                target: AUDIT_TARGET,
                principal = %principal,
                "rate limit rejected request"
            );
        }
    }
}
