//! Token Codec: encodes/decodes the claims object into a compact,
//! URL-safe, authenticated string using a symmetric MAC (HMAC-SHA256 via
//! `jsonwebtoken`'s `HS256`) over a pre-shared secret.
//!
//! Pure: no I/O, no state beyond the secret. The secret is loaded once at
//! process start (`portcullis-server::config`); absence or length < 32
//! bytes is a fatal startup error there, not here — this module only
//! refuses to construct a codec from a short secret.

use std::collections::HashSet;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use portcullis_core::{Scope, TokenKind};

use crate::error::CodecError;

/// Minimum pre-shared secret length.
pub const MIN_SECRET_LEN: usize = 32;

/// The claims object carried inside the signed token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub client_id: String,
    pub token_id: String,
    pub kind: TokenKind,
    pub scopes: HashSet<Scope>,
    #[serde(with = "time::serde::timestamp")]
    pub issued_at: OffsetDateTime,
    #[serde(with = "time::serde::timestamp")]
    pub not_before: OffsetDateTime,
    #[serde(with = "time::serde::timestamp")]
    pub expires_at: OffsetDateTime,
    pub issuer: String,
}

/// A pure, stateless HMAC-signed claims codec.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl TokenCodec {
    /// Builds a codec from a pre-shared secret. Returns `None` if the
    /// secret is shorter than `MIN_SECRET_LEN` — callers (the Lifecycle
    /// Supervisor) treat that as a fatal startup error.
    #[must_use]
    pub fn new(secret: &[u8], issuer: impl Into<String>) -> Option<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return None;
        }
        Some(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
        })
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Signs `claims` into a compact, URL-safe, authenticated string.
    /// Tamper-evident: any payload modification invalidates verification.
    pub fn sign(&self, claims: &Claims) -> Result<String, CodecError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|_| CodecError::MalformedToken)
    }

    /// Verifies signature, expiry, and not-before; returns the embedded
    /// claims or a typed error.
    ///
    /// `Claims` uses descriptive field names (`expires_at`, `not_before`,
    /// `issued_at`, `issuer`), not the registered JWT claim names
    /// (`exp`/`nbf`/`iat`/`iss`) `jsonwebtoken`'s own `validate_exp`/
    /// `validate_nbf` inspect — those flags would silently no-op against
    /// this claims shape. Signature verification is left to `decode`;
    /// expiry and not-before are checked explicitly against the decoded
    /// claims instead.
    pub fn verify(&self, token: &str) -> Result<Claims, CodecError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.set_required_spec_claims::<&str>(&[]);

        let claims = match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(data) => data.claims,
            Err(err) => return Err(classify(err.kind())),
        };

        let now = OffsetDateTime::now_utc();
        if claims.expires_at <= now {
            return Err(CodecError::Expired);
        }
        if claims.not_before > now {
            return Err(CodecError::NotYetValid);
        }

        Ok(claims)
    }
}

fn classify(kind: &jsonwebtoken::errors::ErrorKind) -> CodecError {
    use jsonwebtoken::errors::ErrorKind;
    match kind {
        ErrorKind::ExpiredSignature => CodecError::Expired,
        ErrorKind::ImmatureSignature => CodecError::NotYetValid,
        ErrorKind::InvalidSignature => CodecError::BadSignature,
        _ => CodecError::MalformedToken,
    }
}
