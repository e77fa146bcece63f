// ABOUTME: Periodic loop that enqueues index jobs for heavily searched, under-indexed repositories
// ABOUTME: Each enqueue inserts its jobs and the last-enqueue timestamp in one transaction

use crate::error::{Result, SchedulerError};
use crate::gitserver::GitserverClient;
use crate::resolver::resolve;
use autoindex_config::SchedulerSettings;
use autoindex_storage::{
    IndexStore, IndexableRepository, IndexableRepositoryQueryOptions, NewIndex, StorageError,
};
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// In-process counters describing scheduler activity
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    ticks: AtomicU64,
    enqueued: AtomicU64,
    skipped: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub ticks: u64,
    pub enqueued: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl SchedulerMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

/// Result of considering one candidate repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueOutcome {
    Enqueued(Vec<i64>),
    AlreadyQueued,
    /// Resolution produced nothing to index; the candidate is left untouched
    NoJobs,
}

pub struct Scheduler {
    store: IndexStore,
    gitserver: Arc<dyn GitserverClient>,
    interval: Duration,
    options: IndexableRepositoryQueryOptions,
    metrics: Arc<SchedulerMetrics>,
}

impl Scheduler {
    pub fn new(
        store: IndexStore,
        gitserver: Arc<dyn GitserverClient>,
        settings: &SchedulerSettings,
    ) -> Self {
        Self {
            store,
            gitserver,
            interval: settings.interval,
            options: IndexableRepositoryQueryOptions {
                limit: settings.batch_size,
                minimum_time_since_last_enqueue: settings.minimum_time_since_last_enqueue,
                minimum_search_count: i64::from(settings.minimum_search_count),
                minimum_search_ratio: settings.minimum_search_ratio,
                maximum_precise_count: i64::from(settings.maximum_precise_count),
            },
            metrics: Arc::new(SchedulerMetrics::default()),
        }
    }

    pub fn metrics(&self) -> Arc<SchedulerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Tick every interval until cancelled. Tick failures are counted and logged;
    /// the next tick retries.
    pub async fn run(&self, cancel: &CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Scheduler started");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.handle().await {
                        self.handle_error(&e);
                    }
                }
            }
        }

        info!("Scheduler stopped");
    }

    /// One scheduling pass over the current candidates
    pub async fn handle(&self) -> Result<()> {
        SchedulerMetrics::add(&self.metrics.ticks, 1);

        let candidates = self
            .store
            .indexable_repositories(&self.options, Utc::now())
            .await?;

        for candidate in candidates {
            match self.queue_index(&candidate).await {
                Ok(QueueOutcome::Enqueued(ids)) => {
                    SchedulerMetrics::add(&self.metrics.enqueued, ids.len() as u64);
                }
                Ok(QueueOutcome::AlreadyQueued | QueueOutcome::NoJobs) => {
                    SchedulerMetrics::add(&self.metrics.skipped, 1);
                }
                Err(e) if e.is_repo_not_exist() => {
                    warn!(
                        repository = %candidate.repository_name,
                        "Skipping repository missing upstream: {}", e
                    );
                    SchedulerMetrics::add(&self.metrics.skipped, 1);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    pub fn handle_error(&self, err: &SchedulerError) {
        SchedulerMetrics::add(&self.metrics.errors, 1);
        error!("Failed to schedule indexes: {}", err);
    }

    /// Enqueue jobs for the candidate's current head unless that commit is already queued
    pub async fn queue_index(&self, candidate: &IndexableRepository) -> Result<QueueOutcome> {
        let repository = candidate.repository_name.as_str();
        let commit = self.gitserver.head(repository).await?;

        if self.store.is_queued(candidate.repository_id, &commit).await? {
            return Ok(QueueOutcome::AlreadyQueued);
        }

        let mut jobs = resolve(self.gitserver.as_ref(), repository, &commit).await?;
        let mut seen = BTreeSet::new();
        jobs.retain(|job| seen.insert((job.root.clone(), job.index.indexer.clone())));
        if jobs.is_empty() {
            return Ok(QueueOutcome::NoJobs);
        }

        // Rolled back on drop if anything below fails or bails out.
        let mut tx = self.store.transact().await?;
        let now = Utc::now();

        // Writing first takes the database write lock, so the queued check below
        // cannot interleave with another scheduler's enqueue.
        tx.update_last_enqueued(candidate.repository_id, now).await?;
        if tx.is_queued(candidate.repository_id, &commit).await? {
            return Ok(QueueOutcome::AlreadyQueued);
        }

        let mut ids = Vec::with_capacity(jobs.len());
        for job in jobs {
            let install_image = Some(job.install.image).filter(|image| !image.is_empty());
            let index = NewIndex {
                repository_id: candidate.repository_id,
                repository_name: candidate.repository_name.clone(),
                commit: commit.clone(),
                root: job.root,
                install_image,
                install_commands: job.install.commands,
                indexer: job.index.indexer,
                indexer_args: job.index.arguments,
            };
            match tx.insert_index(&index, now).await {
                Ok(id) => ids.push(id),
                Err(StorageError::AlreadyQueued { .. }) => return Ok(QueueOutcome::AlreadyQueued),
                Err(e) => return Err(e.into()),
            }
        }

        tx.commit().await?;

        for id in &ids {
            info!(
                index_id = id,
                repository = %repository,
                repository_id = candidate.repository_id,
                commit = %commit,
                "Enqueued index"
            );
        }

        Ok(QueueOutcome::Enqueued(ids))
    }
}
