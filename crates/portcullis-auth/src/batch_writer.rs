//! Batch Writer: buffered, asynchronous durable write of newly
//! issued tokens, using a `watch::channel(false)` + `tokio::select!` shutdown
//! pattern against a ticking `interval`.
//!
//! Submission never blocks on I/O: `submit` only appends under a
//! mutex and, past `max_batch`, fires a detached flush. Flushing copies the
//! buffer out from under the lock before touching the store, so multiple
//! flushes may be in flight concurrently — the lock is never held across
//! an `.await` on store I/O.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::interval;
use tracing::{error, info, warn};

use portcullis_core::Token;
use portcullis_storage::Store;

pub struct BatchWriterConfig {
    pub max_batch: usize,
    pub flush_interval: Duration,
}

struct Inner {
    store: Arc<dyn Store>,
    buffer: Mutex<Vec<Token>>,
    config: BatchWriterConfig,
}

/// Handle shared between the caller-facing `submit` path and the background
/// flush worker.
#[derive(Clone)]
pub struct BatchWriter {
    inner: Arc<Inner>,
}

impl BatchWriter {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: BatchWriterConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                buffer: Mutex::new(Vec::new()),
                config,
            }),
        }
    }

    /// Appends `token` to the pending buffer. Never blocks on I/O — a flush
    /// triggered by crossing `max_batch` is detached.
    pub async fn submit(&self, token: Token) {
        let should_flush = {
            let mut buffer = self.inner.buffer.lock().await;
            buffer.push(token);
            buffer.len() >= self.inner.config.max_batch
        };

        if should_flush {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                flush_once(&inner).await;
            });
        }
    }

    /// Starts the background flush-interval worker. Returns a `watch`
    /// sender; dropping it or sending `true` requests shutdown, after which
    /// the worker performs one final synchronous flush and exits.
    pub fn start(&self) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        let flush_interval = self.inner.config.flush_interval;

        tokio::spawn(async move {
            let mut ticker = interval(flush_interval);
            // First tick fires immediately; skip it so we don't flush an
            // empty buffer at startup.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        flush_once(&inner).await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("batch writer shutting down, performing final flush");
                            flush_once(&inner).await;
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    /// Synchronous flush used directly by shutdown paths that don't go
    /// through the `watch` channel (e.g. tests).
    pub async fn flush_now(&self) {
        flush_once(&self.inner).await;
    }

    #[must_use]
    pub async fn pending_len(&self) -> usize {
        self.inner.buffer.lock().await.len()
    }
}

async fn flush_once(inner: &Inner) {
    let batch = {
        let mut buffer = inner.buffer.lock().await;
        if buffer.is_empty() {
            return;
        }
        std::mem::take(&mut *buffer)
    };

    let len = batch.len();
    match inner.store.insert_tokens_batch(&batch).await {
        Ok(()) => info!(count = len, "flushed token batch to store"),
        Err(err) => {
            // The client already has the token; a failed batch write is
            // logged and counted, not retried here. Validation of such
            // tokens still succeeds by signature alone until expiry.
            warn!(count = len, error = %err, "batch write failed, tokens remain un-persisted");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(buffer) = self.buffer.try_lock() {
            if !buffer.is_empty() {
                error!(
                    count = buffer.len(),
                    "batch writer dropped with a non-empty buffer — tokens were never flushed"
                );
            }
        }
    }
}
