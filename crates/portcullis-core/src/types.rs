//! Domain entities for the token lifecycle: clients, scopes, resource
//! endpoints, and tokens.
//!
//! These types carry no I/O and no business logic; they are the shapes that
//! flow between the Store, the Cache Fabric, and the Token Service.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Maximum length, in characters, of a client id or client secret.
pub const MAX_CREDENTIAL_LEN: usize = 255;

/// Fixed TTL for `Normal` tokens.
pub const NORMAL_TOKEN_TTL_SECS: i64 = 3600;

/// Fixed TTL for `OneTime` tokens.
pub const ONE_TIME_TOKEN_TTL_SECS: i64 = 1800;

/// A capability label. Opaque; equality is the only operation.
pub type Scope = String;

/// The principal that authenticates with a shared secret.
///
/// Read-only from the core's perspective: rows are created out-of-band by an
/// administrator and only ever read here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub secret: String,
    pub token_ttl: Duration,
    pub allowed_scopes: HashSet<Scope>,
}

impl Client {
    /// Byte-for-byte comparison of the presented secret against this
    /// client's stored secret, in constant time so the admission path
    /// cannot be timed to recover the secret.
    #[must_use]
    pub fn secret_matches(&self, presented: &str) -> bool {
        use subtle::ConstantTimeEq;
        self.secret.as_bytes().ct_eq(presented.as_bytes()).into()
    }

    #[must_use]
    pub fn allows_scope(&self, scope: &str) -> bool {
        self.allowed_scopes.contains(scope)
    }
}

/// A resource the core can authorize access to. Only `active` rows
/// participate in authorization; matching is exact-string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEndpoint {
    pub url: String,
    pub required_scope: Scope,
    pub active: bool,
}

/// The two token lifetimes the core issues. TTLs are fixed core policy, not
/// configurable per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Normal,
    OneTime,
}

impl TokenKind {
    #[must_use]
    pub fn ttl(self) -> Duration {
        match self {
            TokenKind::Normal => Duration::seconds(NORMAL_TOKEN_TTL_SECS),
            TokenKind::OneTime => Duration::seconds(ONE_TIME_TOKEN_TTL_SECS),
        }
    }
}

/// A token's durable record. The signed form is carried by the client; this
/// struct is what the server stores and mutates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    pub kind: TokenKind,
    pub client_id: String,
    pub issued_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub scopes: HashSet<Scope>,
    pub revoked: bool,
    pub revoked_at: Option<OffsetDateTime>,
    pub signed_form: String,
}

impl Token {
    /// Generates a fresh token id with at least 16 bytes of entropy.
    #[must_use]
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// A token whose expiry is past is treated identically to revoked for
    /// authorization purposes.
    #[must_use]
    pub fn is_rejected_at(&self, now: OffsetDateTime) -> bool {
        self.revoked || self.is_expired_at(now)
    }
}

/// The (revoked, kind) pair the Store's hot validation read returns in a
/// single round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenStatus {
    pub revoked: bool,
    pub kind: TokenKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(secret: &str) -> Client {
        Client {
            id: "c1".into(),
            secret: secret.into(),
            token_ttl: Duration::seconds(NORMAL_TOKEN_TTL_SECS),
            allowed_scopes: HashSet::from(["read:ltp".to_string()]),
        }
    }

    #[test]
    fn secret_matches_exact_bytes_only() {
        let c = client("s3cret");
        assert!(c.secret_matches("s3cret"));
        assert!(!c.secret_matches("s3cre"));
        assert!(!c.secret_matches("S3cret"));
    }

    #[test]
    fn allows_scope_checks_membership() {
        let c = client("x");
        assert!(c.allows_scope("read:ltp"));
        assert!(!c.allows_scope("write:ltp"));
    }

    #[test]
    fn one_time_token_has_half_hour_ttl() {
        assert_eq!(TokenKind::OneTime.ttl(), Duration::seconds(1800));
        assert_eq!(TokenKind::Normal.ttl(), Duration::seconds(3600));
    }

    #[test]
    fn token_is_rejected_when_expired_even_if_not_revoked() {
        let now = OffsetDateTime::now_utc();
        let t = Token {
            id: Token::new_id(),
            kind: TokenKind::Normal,
            client_id: "c1".into(),
            issued_at: now - Duration::hours(2),
            expires_at: now - Duration::hours(1),
            scopes: HashSet::new(),
            revoked: false,
            revoked_at: None,
            signed_form: "x".into(),
        };
        assert!(t.is_rejected_at(now));
    }
}
