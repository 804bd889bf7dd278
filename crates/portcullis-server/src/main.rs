use std::net::SocketAddr;

use portcullis_server::config::{load_signing_secret, AppConfig};
use portcullis_server::observability::{init_tracing, shutdown_tracing};
use portcullis_server::supervisor::Supervisor;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = match AppConfig::load(None) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging);

    let signing_secret = match load_signing_secret() {
        Ok(secret) => secret,
        Err(err) => {
            tracing::error!(error = %err, "fatal startup error");
            std::process::exit(1);
        }
    };

    let addr: SocketAddr = match format!("{}:{}", config.server.host, config.server.port).parse() {
        Ok(addr) => addr,
        Err(err) => {
            tracing::error!(error = %err, "invalid server.host/server.port");
            std::process::exit(1);
        }
    };

    let supervisor = match Supervisor::start(config, &signing_secret).await {
        Ok(supervisor) => supervisor,
        Err(err) => {
            tracing::error!(error = %err, "fatal startup error");
            std::process::exit(1);
        }
    };

    if let Err(err) = supervisor.run(addr).await {
        tracing::error!(error = %err, "server error");
    }

    shutdown_tracing();
}
