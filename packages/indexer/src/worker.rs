// ABOUTME: Poll loop that claims queued indexes and records their terminal state
// ABOUTME: Runs one job at a time until the cancellation token fires

use crate::error::Result;
use crate::handler::Handler;
use autoindex_storage::{Index, IndexStore};
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct Worker {
    store: IndexStore,
    handler: Handler,
    poll_interval: Duration,
}

/// What a single poll did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Idle,
    Completed(i64),
    Errored(i64),
}

impl Worker {
    pub fn new(store: IndexStore, handler: Handler, poll_interval: Duration) -> Self {
        Self {
            store,
            handler,
            poll_interval,
        }
    }

    /// Process indexes until cancelled. Store errors are logged and retried.
    pub async fn run(&self, cancel: &CancellationToken) {
        info!("Index worker started");

        while !cancel.is_cancelled() {
            let wait = match self.poll(cancel).await {
                Ok(PollOutcome::Idle) => true,
                Ok(_) => false,
                Err(e) => {
                    error!("Failed to process index: {}", e);
                    true
                }
            };

            if wait {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }

        info!("Index worker stopped");
    }

    /// Claim the oldest queued index, if any, and run it to a terminal state
    pub async fn poll(&self, cancel: &CancellationToken) -> Result<PollOutcome> {
        let Some(index) = self.store.dequeue(Utc::now()).await? else {
            return Ok(PollOutcome::Idle);
        };

        let failure = self.process(cancel, &index).await;
        match failure {
            None => {
                self.store.mark_complete(index.id, Utc::now()).await?;
                info!(index_id = index.id, "Index completed");
                Ok(PollOutcome::Completed(index.id))
            }
            Some(message) => {
                self.store
                    .mark_errored(index.id, &message, Utc::now())
                    .await?;
                warn!(index_id = index.id, "Index errored: {}", message);
                Ok(PollOutcome::Errored(index.id))
            }
        }
    }

    async fn process(&self, cancel: &CancellationToken, index: &Index) -> Option<String> {
        match AssertUnwindSafe(self.handler.handle(cancel, index))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(payload) => {
                let detail = payload
                    .downcast_ref::<String>()
                    .cloned()
                    .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
                    .unwrap_or_else(|| "unknown panic".to_string());
                Some(format!("handler panicked: {}", detail))
            }
        }
    }
}
