//! Shared application state: explicit values held by the Lifecycle
//! Supervisor and threaded through the Token Service by construction,
//! rather than module-level mutable singletons. Built once by
//! `supervisor::Supervisor::start` and cloned cheaply into every request
//! (every field is an `Arc`).

use std::sync::Arc;

use portcullis_auth::{RateLimiter, TokenService};

use crate::config::AppConfig;
use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub token_service: Arc<TokenService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics: Arc<Metrics>,
    pub config: Arc<AppConfig>,
}
