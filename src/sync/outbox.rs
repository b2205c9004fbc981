//! Remote Write Outbox
//!
//! Detached queue for fire-and-forget remote writes. A single worker
//! task drains the channel, so writes to the same remote document are
//! applied in enqueue order. A failed write is logged and dropped:
//! every enqueued body is a full category snapshot, so the next
//! mutation of that category supersedes it.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::auth::Identity;
use crate::store::{Category, RemoteStore};

const QUEUE_CAPACITY: usize = 64;

enum OutboxMessage {
    Write {
        identity: Identity,
        category: Category,
        body: serde_json::Value,
    },
    Flush(oneshot::Sender<()>),
}

/// Serialized queue of whole-category remote overwrites
pub struct RemoteOutbox {
    tx: mpsc::Sender<OutboxMessage>,
}

impl RemoteOutbox {
    /// Spawn the worker task draining writes into the remote store
    pub fn spawn(remote: Arc<dyn RemoteStore>) -> Self {
        let (tx, mut rx) = mpsc::channel(QUEUE_CAPACITY);

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    OutboxMessage::Write {
                        identity,
                        category,
                        body,
                    } => {
                        if let Err(e) = remote.put(&identity, category, body).await {
                            log::warn!("remote write for {} dropped: {}", category, e);
                        }
                    }
                    OutboxMessage::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });

        Self { tx }
    }

    /// Queue a category overwrite without waiting for it.
    ///
    /// A full queue drops the write with a warning; the category's
    /// next snapshot will carry the same state.
    pub fn enqueue(&self, identity: Identity, category: Category, body: serde_json::Value) {
        let message = OutboxMessage::Write {
            identity,
            category,
            body,
        };
        if self.tx.try_send(message).is_err() {
            log::warn!("outbox full, dropping {} write", category);
        }
    }

    /// Wait until every previously enqueued write has been attempted
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(OutboxMessage::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }
}
