//! Token lifecycle core for the Portcullis OAuth 2.0 client-credentials
//! authorization server.
//!
//! This crate is the whole lifecycle core: the Cache Fabric, Rate Limiter,
//! Token Codec, Batch Writer, Token Service, Scope Authorizer, the bounded
//! one-time-token revocation queue, and the audit log. It has no HTTP
//! surface of its own — `portcullis-server` wires these pieces to axum.

mod audit;
mod batch_writer;
mod cache;
mod codec;
mod error;
mod rate_limit;
mod revocation_queue;
mod scope;
mod service;

pub use audit::{emit as emit_audit_event, AuditEvent, AUDIT_TARGET};
pub use batch_writer::{BatchWriter, BatchWriterConfig};
pub use cache::{CacheFabric, ClientCache, EndpointCache, TokenStatusCache};
pub use codec::{Claims, TokenCodec, MIN_SECRET_LEN};
pub use error::{CodecError, ServiceError};
pub use rate_limit::{RateConfig, RateLimiter};
pub use revocation_queue::RevocationQueue;
pub use scope::ScopeAuthorizer;
pub use service::{parse_bearer, IssueRequest, IssueResponse, TokenService};
