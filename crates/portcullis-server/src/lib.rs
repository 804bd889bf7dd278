//! HTTP front end and Lifecycle Supervisor for the Portcullis OAuth 2.0
//! client-credentials authorization server. Wires `portcullis-auth`'s
//! Token Service to axum, owns process-level config, observability, and
//! metrics, and drives startup/shutdown ordering.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod observability;
pub mod router;
pub mod state;
pub mod supervisor;
