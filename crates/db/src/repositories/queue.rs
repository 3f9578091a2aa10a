//! Summarization queue repository.

use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};

use crate::models::{JobStatus, QueueJob, QueueStats};
use crate::DbPool;

const JOB_COLUMNS: &str = r#"
    id, source_url, meeting_id, banana, status, priority, retry_count,
    created_at, started_at, completed_at, failed_at,
    error_message, processing_metadata
"#;

/// Repository for queue operations.
#[derive(Clone)]
pub struct QueueRepository {
    pool: DbPool,
}

impl QueueRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Idempotent enqueue inside an existing transaction. Returns true
    /// when a new job row was created.
    pub async fn enqueue_tx(
        conn: &mut PgConnection,
        source_url: &str,
        meeting_id: Option<&str>,
        banana: Option<&str>,
        priority: i32,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO queue (source_url, meeting_id, banana, status, priority)
            VALUES ($1, $2, $3, 'pending', $4)
            ON CONFLICT (source_url) DO NOTHING
            "#,
        )
        .bind(source_url)
        .bind(meeting_id)
        .bind(banana)
        .bind(priority)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Whether a pending or processing job already exists for a
    /// source_url; consulted by the enqueue decider.
    pub async fn active_job_exists_tx(
        conn: &mut PgConnection,
        source_url: &str,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM queue
                WHERE source_url = $1 AND status IN ('pending', 'processing')
            )
            "#,
        )
        .bind(source_url)
        .fetch_one(&mut *conn)
        .await
    }

    /// Pool-level idempotent enqueue.
    pub async fn enqueue(
        &self,
        source_url: &str,
        meeting_id: Option<&str>,
        banana: Option<&str>,
        priority: i32,
    ) -> Result<bool, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        Self::enqueue_tx(&mut *conn, source_url, meeting_id, banana, priority).await
    }

    /// Claim the next pending job: set it `processing` with `started_at`
    /// in a single statement so concurrent workers never double-claim.
    pub async fn get_next_for_processing(&self) -> Result<Option<QueueJob>, sqlx::Error> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE queue
            SET status = 'processing', started_at = CURRENT_TIMESTAMP
            WHERE id = (
                SELECT id FROM queue
                WHERE status = 'pending'
                ORDER BY priority DESC, created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| build_job(&r)).transpose()
    }

    /// Same claim, restricted to one city's jobs (sync-and-process-city).
    pub async fn get_next_for_city(&self, banana: &str) -> Result<Option<QueueJob>, sqlx::Error> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE queue
            SET status = 'processing', started_at = CURRENT_TIMESTAMP
            WHERE id = (
                SELECT id FROM queue
                WHERE status = 'pending' AND banana = $1
                ORDER BY priority DESC, created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(banana)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| build_job(&r)).transpose()
    }

    pub async fn complete(
        &self,
        job_id: i64,
        processing_metadata: Option<&serde_json::Value>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE queue
            SET status = 'completed',
                completed_at = CURRENT_TIMESTAMP,
                processing_metadata = COALESCE($2, processing_metadata),
                error_message = NULL
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(processing_metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fail a job. Below the retry ceiling it returns to `pending`;
    /// at the ceiling it moves to `dead_letter` with `failed_at` set.
    pub async fn fail(
        &self,
        job_id: i64,
        error_message: &str,
        max_retries: i32,
    ) -> Result<JobStatus, sqlx::Error> {
        let status: JobStatus = sqlx::query_scalar(
            r#"
            UPDATE queue
            SET retry_count = retry_count + 1,
                error_message = $2,
                status = CASE
                    WHEN retry_count + 1 >= $3 THEN 'dead_letter'
                    ELSE 'pending'
                END,
                failed_at = CASE
                    WHEN retry_count + 1 >= $3 THEN CURRENT_TIMESTAMP
                    ELSE failed_at
                END
            WHERE id = $1
            RETURNING status
            "#,
        )
        .bind(job_id)
        .bind(error_message)
        .bind(max_retries)
        .fetch_one(&self.pool)
        .await?;

        if status == JobStatus::DeadLetter {
            tracing::warn!(job_id, error_message, "job moved to dead letter queue");
        }
        Ok(status)
    }

    pub async fn get_job_by_source_url(
        &self,
        source_url: &str,
    ) -> Result<Option<QueueJob>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM queue WHERE source_url = $1"
        ))
        .bind(source_url)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| build_job(&r)).transpose()
    }

    pub async fn get_stats(&self) -> Result<QueueStats, sqlx::Error> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM queue GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut stats = QueueStats::default();
        for row in rows {
            let status: JobStatus = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            match status {
                JobStatus::Pending => stats.pending = count,
                JobStatus::Processing => stats.processing = count,
                JobStatus::Completed => stats.completed = count,
                JobStatus::Failed => stats.failed = count,
                JobStatus::DeadLetter => stats.dead_letter = count,
            }
        }
        Ok(stats)
    }

    /// Release jobs stuck in `processing` longer than `stale_minutes`
    /// (worker died mid-job). Returns how many were released.
    pub async fn release_stale(&self, stale_minutes: i32) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE queue
            SET status = 'pending', started_at = NULL
            WHERE status = 'processing'
              AND started_at < NOW() - INTERVAL '1 minute' * $1
            "#,
        )
        .bind(stale_minutes)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn build_job(row: &PgRow) -> Result<QueueJob, sqlx::Error> {
    Ok(QueueJob {
        id: row.try_get("id")?,
        source_url: row.try_get("source_url")?,
        meeting_id: row.try_get("meeting_id")?,
        banana: row.try_get("banana")?,
        status: row.try_get("status")?,
        priority: row.try_get("priority")?,
        retry_count: row.try_get("retry_count")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        failed_at: row.try_get("failed_at")?,
        error_message: row.try_get("error_message")?,
        processing_metadata: row.try_get("processing_metadata")?,
    })
}
