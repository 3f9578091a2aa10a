//! Summarization processor interface and queue drain.
//!
//! The LLM-backed processor is an external collaborator; the pipeline
//! only claims jobs, hands them over, and writes the results back. When
//! no processor is configured the drain loop is a no-op.

use async_trait::async_trait;
use db::models::{ParticipationInfo, QueueJob};
use db::repositories::{ItemRepository, MeetingRepository, QueueRepository};
use db::DbPool;

use crate::shutdown::ShutdownFlag;

/// Retries before a job moves to the dead-letter queue.
const MAX_JOB_RETRIES: i32 = 3;
/// Jobs stuck in `processing` longer than this are released.
const STALE_JOB_MINUTES: i32 = 60;

/// What the processor produced for one source document.
#[derive(Debug, Clone)]
pub struct ProcessorOutput {
    pub summary: Option<String>,
    pub topics: Vec<String>,
    pub participation: Option<ParticipationInfo>,
    /// Per-item summaries keyed by item id, when item-level analysis ran.
    pub item_summaries: Vec<(String, String, Vec<String>)>,
    pub processing_method: String,
    pub processing_time: f64,
}

/// External summarization processor.
#[async_trait]
pub trait SummarizationProcessor: Send + Sync {
    /// Summarize the document behind one queue job. An `Err` counts as a
    /// job failure and consumes a retry.
    async fn process(&self, job: &QueueJob) -> Result<ProcessorOutput, String>;
}

/// Claims pending jobs one at a time and applies processor output.
pub struct QueueDrain {
    queue: QueueRepository,
    meetings: MeetingRepository,
    items: ItemRepository,
    processor: Option<std::sync::Arc<dyn SummarizationProcessor>>,
    shutdown: ShutdownFlag,
}

impl QueueDrain {
    pub fn new(
        pool: DbPool,
        processor: Option<std::sync::Arc<dyn SummarizationProcessor>>,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            queue: QueueRepository::new(pool.clone()),
            meetings: MeetingRepository::new(pool.clone()),
            items: ItemRepository::new(pool),
            processor,
            shutdown,
        }
    }

    pub fn has_processor(&self) -> bool {
        self.processor.is_some()
    }

    /// Process pending jobs until the queue is empty or shutdown.
    /// Returns (processed, failed).
    pub async fn drain(&self, banana: Option<&str>) -> (usize, usize) {
        let Some(processor) = &self.processor else {
            return (0, 0);
        };

        if let Ok(released) = self.queue.release_stale(STALE_JOB_MINUTES).await {
            if released > 0 {
                tracing::warn!(released, "released stale processing jobs");
            }
        }

        let mut processed = 0;
        let mut failed = 0;

        while self.shutdown.is_running() {
            let claim = match banana {
                Some(banana) => self.queue.get_next_for_city(banana).await,
                None => self.queue.get_next_for_processing().await,
            };
            let job = match claim {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "queue claim failed");
                    break;
                }
            };

            tracing::info!(job_id = job.id, source_url = %job.source_url, "processing job");
            match processor.process(&job).await {
                Ok(output) => {
                    if let Err(e) = self.apply_output(&job, &output).await {
                        tracing::error!(job_id = job.id, error = %e, "failed to apply processor output");
                        let _ = self
                            .queue
                            .fail(job.id, &format!("write-back failed: {e}"), MAX_JOB_RETRIES)
                            .await;
                        failed += 1;
                        continue;
                    }
                    let _ = self.queue.complete(job.id, None).await;
                    processed += 1;
                }
                Err(message) => {
                    tracing::warn!(job_id = job.id, error = %message, "job processing failed");
                    let _ = self.queue.fail(job.id, &message, MAX_JOB_RETRIES).await;
                    failed += 1;
                }
            }
        }

        (processed, failed)
    }

    async fn apply_output(&self, job: &QueueJob, output: &ProcessorOutput) -> Result<(), sqlx::Error> {
        let Some(meeting_id) = &job.meeting_id else {
            return Ok(());
        };

        self.meetings
            .update_meeting_summary(
                meeting_id,
                output.summary.as_deref(),
                &output.processing_method,
                output.processing_time,
                output.participation.as_ref(),
                &output.topics,
            )
            .await?;

        for (item_id, summary, topics) in &output.item_summaries {
            self.items.update_item_summary(item_id, summary, topics).await?;
        }

        Ok(())
    }
}
