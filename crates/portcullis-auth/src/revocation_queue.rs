//! Bounded revocation queue backing the OneTime-token auto-revoke path: a
//! dedicated worker drains queued revocations instead of spawning a
//! detached task per request, giving backpressure, observable depth, and
//! clean shutdown semantics. Uses the same `watch`-channel shutdown shape
//! as `BatchWriter::start`.
//!
//! The worker performs both the durable store write and the
//! `TokenStatusCache` mark when it dequeues an item, not at schedule time,
//! so a second presentation of the same one-time token racing ahead of the
//! revoke can still observe the pre-revoke state until the worker catches
//! up — this is an accepted, bounded window tied to the worker's drain
//! latency, not eliminated by marking the cache eagerly.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};
use tracing::warn;

use portcullis_core::TokenKind;
use portcullis_storage::Store;

use crate::cache::TokenStatusCache;

struct PendingRevocation {
    token_id: String,
    kind: TokenKind,
}

#[derive(Clone)]
pub struct RevocationQueue {
    tx: mpsc::Sender<PendingRevocation>,
}

impl RevocationQueue {
    /// Spawns the dedicated drain worker and returns a handle plus a
    /// shutdown `watch::Sender`. `capacity` bounds the queue so a store
    /// outage applies backpressure rather than growing memory unboundedly.
    #[must_use]
    pub fn start(
        store: Arc<dyn Store>,
        token_status: Arc<TokenStatusCache>,
        capacity: usize,
    ) -> (Self, watch::Sender<bool>) {
        let (tx, mut rx) = mpsc::channel::<PendingRevocation>(capacity);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe_item = rx.recv() => {
                        match maybe_item {
                            Some(item) => process(&store, &token_status, item).await,
                            None => break,
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            // Drain whatever is already queued before exiting.
                            while let Ok(item) = rx.try_recv() {
                                process(&store, &token_status, item).await;
                            }
                            break;
                        }
                    }
                }
            }
        });

        (Self { tx }, shutdown_tx)
    }

    /// Enqueues a revocation without blocking the validate() caller. A full
    /// queue (backpressure under a store outage) drops the request and
    /// logs — the token remains valid on other nodes until its TTL expires,
    /// the same bounded inconsistency as the pre-flush window.
    pub fn schedule(&self, token_id: String, kind: TokenKind) {
        if let Err(err) = self.tx.try_send(PendingRevocation { token_id, kind }) {
            warn!(error = %err, "revocation queue full or closed, dropping scheduled auto-revoke");
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }
}

async fn process(store: &Arc<dyn Store>, token_status: &Arc<TokenStatusCache>, item: PendingRevocation) {
    let now = OffsetDateTime::now_utc();
    if let Err(err) = store.revoke_token(&item.token_id, now).await {
        warn!(token_id = %item.token_id, error = %err, "async one-time-token revoke failed");
    }
    // The cache mark lands regardless of store outcome: an un-persisted
    // token still denies on this node once marked.
    token_status.mark_revoked_as(item.token_id, item.kind);
}
