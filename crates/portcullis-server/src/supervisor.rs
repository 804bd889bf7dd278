//! Lifecycle Supervisor: owns every long-lived resource and background
//! worker explicitly, rather than through module-level singletons.
//! Startup and shutdown both happen in a fixed order so that, e.g., the
//! batch writer never outlives the store pool it writes to.
//!
//! A builder step assembles everything fallibly, and a run step owns the
//! listener and the graceful-shutdown signal.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use tokio::sync::watch;

use portcullis_auth::{
    BatchWriter, BatchWriterConfig, CacheFabric, RateConfig, RateLimiter,
    RevocationQueue, ScopeAuthorizer, TokenCodec, TokenService,
};
use portcullis_storage::{Store, StoreError};
use portcullis_storage_memory::InMemoryStore;
use portcullis_storage_postgres::{create_pool, ensure_schema, health_ping, PostgresConfig, PostgresStore};

use crate::config::{AppConfig, StoreBackend};
use crate::metrics::Metrics;
use crate::state::AppState;

/// Background workers and shutdown handles the supervisor must stop, in
/// order, during teardown.
struct Background {
    batch_writer_shutdown: watch::Sender<bool>,
    revocation_queue_shutdown: watch::Sender<bool>,
    sweeper_shutdown: watch::Sender<bool>,
    pruner_shutdown: watch::Sender<bool>,
}

pub struct Supervisor {
    state: AppState,
    background: Background,
    store: Arc<dyn Store>,
}

impl Supervisor {
    /// Startup order: load the signing secret, open the store (with a
    /// health ping for Postgres), build the Cache Fabric, start the batch
    /// writer and revocation queue, then the cache sweeper and rate-limiter
    /// pruner. Nothing accepts traffic until every step here has succeeded.
    pub async fn start(config: AppConfig, signing_secret: &[u8]) -> Result<Self, anyhow::Error> {
        let store: Arc<dyn Store> = match config.store.backend {
            StoreBackend::Memory => {
                tracing::info!("using in-memory store backend");
                Arc::new(InMemoryStore::new())
            }
            StoreBackend::Postgres => {
                let store_url = crate::config::load_store_url(&config.store)
                    .map_err(|e| anyhow::anyhow!(e))?;
                let pg_config = PostgresConfig {
                    url: store_url,
                    max_open: config.store.max_open,
                    max_idle: config.store.max_idle,
                    conn_max_lifetime_secs: config.store.conn_max_lifetime_secs,
                    quick_read_timeout_ms: config.store.quick_read_timeout_ms,
                    read_write_timeout_ms: config.store.read_write_timeout_ms,
                    batch_write_timeout_ms: config.store.batch_write_timeout_ms,
                    run_migrations: config.store.run_migrations,
                };
                let pool = create_pool(&pg_config).await.map_err(pg_err)?;
                health_ping(&pool).await.map_err(pg_err)?;
                tracing::info!("PostgreSQL store pool is healthy");
                if pg_config.run_migrations {
                    ensure_schema(&pool).await.map_err(pg_err)?;
                }
                Arc::new(PostgresStore::new(pool, &pg_config))
            }
        };

        let codec = TokenCodec::new(signing_secret, config.token.issuer.clone())
            .ok_or_else(|| anyhow::anyhow!("signing secret is shorter than the minimum length"))?;

        let caches = Arc::new(CacheFabric::new(StdDuration::from_secs(
            config.cache.token_status_ttl_secs,
        )));

        let batch_writer = BatchWriter::new(
            store.clone(),
            BatchWriterConfig {
                max_batch: config.batch_writer.max_batch,
                flush_interval: StdDuration::from_secs(config.batch_writer.flush_interval_secs),
            },
        );
        let batch_writer_shutdown = batch_writer.start();

        // Shares the Cache Fabric's own `TokenStatusCache` instance so the
        // revocation queue's auto-revoke marks are visible to every
        // subsequent `validate()` call, not just to a lookalike copy.
        let (revocation_queue, revocation_queue_shutdown) =
            RevocationQueue::start(store.clone(), caches.token_status.clone(), 1024);

        let scope_authorizer = ScopeAuthorizer::new(caches.endpoints.clone(), store.clone());

        let token_service = Arc::new(TokenService::new(
            store.clone(),
            caches.clone(),
            codec,
            batch_writer,
            scope_authorizer,
            revocation_queue,
        ));

        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit.enabled,
            RateConfig {
                rate_per_sec: config.rate_limit.global_rate,
                burst: config.rate_limit.global_burst,
            },
            RateConfig {
                rate_per_sec: config.rate_limit.per_client_rate,
                burst: config.rate_limit.per_client_burst,
            },
            config.rate_limit.map_soft_cap,
        ));

        let sweeper_shutdown = spawn_cache_sweeper(
            caches,
            StdDuration::from_secs(config.cache.sweep_interval_secs),
        );
        let pruner_shutdown = spawn_rate_limiter_pruner(
            rate_limiter.clone(),
            StdDuration::from_secs(config.cache.sweep_interval_secs),
        );

        let metrics = Arc::new(Metrics::new());

        Ok(Self {
            state: AppState {
                token_service,
                rate_limiter,
                metrics,
                config: Arc::new(config),
            },
            background: Background {
                batch_writer_shutdown,
                revocation_queue_shutdown,
                sweeper_shutdown,
                pruner_shutdown,
            },
            store,
        })
    }

    #[must_use]
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Serves HTTP until `shutdown_signal` resolves, then tears everything
    /// down in reverse startup order: stop admitting new background
    /// work, let the batch writer perform its final synchronous flush,
    /// then exit.
    pub async fn run(self, addr: SocketAddr) -> Result<(), anyhow::Error> {
        let router = crate::router::build_router(self.state.clone());
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "listening");

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(self) {
        tracing::info!("shutting down background workers");
        let _ = self.background.pruner_shutdown.send(true);
        let _ = self.background.sweeper_shutdown.send(true);
        let _ = self.background.revocation_queue_shutdown.send(true);

        self.state.token_service.flush_pending().await;
        let _ = self.background.batch_writer_shutdown.send(true);

        self.store.close().await;

        tracing::info!("shutdown complete");
    }
}

fn pg_err(err: StoreError) -> anyhow::Error {
    anyhow::anyhow!("postgres store startup failed: {err}")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}

/// Background sweeper for the Token Status cache, swept on the configured
/// `sweep_interval_secs` tick.
fn spawn_cache_sweeper(caches: Arc<CacheFabric>, interval: StdDuration) -> watch::Sender<bool> {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    caches.token_status.sweep();
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    });
    shutdown_tx
}

/// Background pruner for the rate limiter's per-client bucket map: batched
/// eviction once the soft cap is exceeded.
fn spawn_rate_limiter_pruner(limiter: Arc<RateLimiter>, interval: StdDuration) -> watch::Sender<bool> {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    limiter.prune();
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    });
    shutdown_tx
}
