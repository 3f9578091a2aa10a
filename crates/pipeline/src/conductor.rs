//! Conductor: the long-lived daemon.
//!
//! Owns two cooperative loops — a roughly-weekly full-sync loop and a
//! continuous queue-drain loop — plus the one-shot admin operations the
//! CLI exposes. Loop errors are logged and backed off, never fatal.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::Config;
use db::repositories::{PipelineStats, QueueRepository, StatsRepository};
use db::DbPool;
use tokio::sync::Mutex;

use crate::fetcher::{Fetcher, SyncResult, SyncStatus};
use crate::processor::{QueueDrain, SummarizationProcessor};
use crate::shutdown::ShutdownFlag;

/// State exposed by `--status`.
#[derive(Debug, serde::Serialize)]
pub struct SyncStatusReport {
    pub is_running: bool,
    pub last_full_sync: Option<DateTime<Utc>>,
    pub active_cities: i64,
    pub total_meetings: i64,
    pub summarized_meetings: i64,
    pub pending_meetings: i64,
    pub failed_cities: Vec<String>,
    pub failed_count: usize,
    pub queue_pending: i64,
    pub queue_dead_letter: i64,
}

/// Lightweight orchestrator for the sync and processing loops.
pub struct Conductor {
    fetcher: Arc<Fetcher>,
    drain: QueueDrain,
    stats: StatsRepository,
    queue: QueueRepository,
    shutdown: ShutdownFlag,
    sync_interval: Duration,
    error_backoff: Duration,
    processing_poll: Duration,
    last_full_sync: Mutex<Option<DateTime<Utc>>>,
}

impl Conductor {
    pub fn new(
        pool: DbPool,
        fetcher: Arc<Fetcher>,
        processor: Option<Arc<dyn SummarizationProcessor>>,
        config: &Config,
        shutdown: ShutdownFlag,
    ) -> Self {
        let drain = QueueDrain::new(pool.clone(), processor, shutdown.clone());
        Self {
            fetcher,
            drain,
            stats: StatsRepository::new(pool.clone()),
            queue: QueueRepository::new(pool),
            shutdown,
            sync_interval: Duration::from_secs(config.sync_interval_hours * 3600),
            error_backoff: Duration::from_secs(config.sync_error_backoff_hours * 3600),
            processing_poll: Duration::from_secs(config.processing_poll_secs),
            last_full_sync: Mutex::new(None),
        }
    }

    /// Run both loops until shutdown.
    pub async fn run(self: Arc<Self>) {
        tracing::info!("starting background daemon");
        self.shutdown.set_running(true);

        let sync = {
            let conductor = self.clone();
            tokio::spawn(async move { conductor.sync_loop().await })
        };
        let processing = {
            let conductor = self.clone();
            tokio::spawn(async move { conductor.processing_loop().await })
        };

        let _ = tokio::join!(sync, processing);
        tracing::info!("background daemon stopped");
    }

    pub fn stop(&self) {
        tracing::info!("stopping background daemon");
        self.shutdown.set_running(false);
    }

    async fn sync_loop(&self) {
        while self.shutdown.is_running() {
            let results = self.fetcher.sync_all().await;
            *self.last_full_sync.lock().await = Some(Utc::now());

            let succeeded = results.iter().filter(|r| r.status == SyncStatus::Completed).count();
            let failed = results.iter().filter(|r| r.status == SyncStatus::Failed).count();
            tracing::info!(succeeded, failed, "sync cycle complete");

            // Heavy failure rate smells like an upstream incident; back
            // off harder before the next pass.
            let sleep = if !results.is_empty() && failed > succeeded {
                self.error_backoff
            } else {
                self.sync_interval
            };
            if !self.shutdown.sleep(sleep).await {
                break;
            }
        }
    }

    async fn processing_loop(&self) {
        if !self.drain.has_processor() {
            tracing::warn!("analyzer not available - processing loop will not run");
            return;
        }

        while self.shutdown.is_running() {
            let (processed, failed) = self.drain.drain(None).await;
            if processed + failed > 0 {
                tracing::info!(processed, failed, "queue drain cycle");
            }
            if !self.shutdown.sleep(self.processing_poll).await {
                break;
            }
        }
    }

    /// One-shot forced sync of a single city; restores the running flag
    /// on exit regardless of outcome.
    pub async fn force_sync_city(&self, banana: &str) -> SyncResult {
        let was_running = self.shutdown.is_running();
        self.shutdown.set_running(true);

        let result = self.fetcher.sync_city(banana).await;

        self.shutdown.set_running(was_running);
        result
    }

    /// Sync a city, then drain that city's queued jobs.
    pub async fn sync_and_process_city(&self, banana: &str) -> (SyncResult, usize, usize) {
        tracing::info!(banana, "starting sync-and-process");
        let sync_result = self.force_sync_city(banana).await;

        if sync_result.status != SyncStatus::Completed {
            tracing::error!(banana, error = ?sync_result.error_message, "sync failed");
            return (sync_result, 0, 0);
        }
        tracing::info!(banana, meetings_found = sync_result.meetings_found, "sync complete");

        if !self.drain.has_processor() {
            tracing::warn!("analyzer not available - meetings queued but not processed");
            return (sync_result, 0, 0);
        }

        let was_running = self.shutdown.is_running();
        self.shutdown.set_running(true);
        let (processed, failed) = self.drain.drain(Some(banana)).await;
        self.shutdown.set_running(was_running);

        (sync_result, processed, failed)
    }

    /// Run one full sync pass (the `--full-sync` command).
    pub async fn full_sync_once(&self) -> Vec<SyncResult> {
        let was_running = self.shutdown.is_running();
        self.shutdown.set_running(true);
        let results = self.fetcher.sync_all().await;
        *self.last_full_sync.lock().await = Some(Utc::now());
        self.shutdown.set_running(was_running);
        results
    }

    pub async fn get_sync_status(&self) -> Result<SyncStatusReport, sqlx::Error> {
        let PipelineStats {
            active_cities,
            total_meetings,
            summarized_meetings,
            pending_meetings,
        } = self.stats.get_stats().await?;
        let queue_stats = self.queue.get_stats().await?;
        let failed_cities = self.fetcher.failed_cities().await;

        Ok(SyncStatusReport {
            is_running: self.shutdown.is_running(),
            last_full_sync: *self.last_full_sync.lock().await,
            active_cities,
            total_meetings,
            summarized_meetings,
            pending_meetings,
            failed_count: failed_cities.len(),
            failed_cities,
            queue_pending: queue_stats.pending,
            queue_dead_letter: queue_stats.dead_letter,
        })
    }
}
