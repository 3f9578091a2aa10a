//! Aggregate counts for daemon status reporting.

use serde::Serialize;
use sqlx::Row;

use crate::DbPool;

/// Headline numbers behind `--status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    pub active_cities: i64,
    pub total_meetings: i64,
    pub summarized_meetings: i64,
    pub pending_meetings: i64,
}

#[derive(Clone)]
pub struct StatsRepository {
    pool: DbPool,
}

impl StatsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get_stats(&self) -> Result<PipelineStats, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM cities WHERE status = 'active') AS active_cities,
                (SELECT COUNT(*) FROM meetings) AS total_meetings,
                (SELECT COUNT(*) FROM meetings WHERE summary IS NOT NULL) AS summarized_meetings,
                (SELECT COUNT(*) FROM meetings
                 WHERE processing_status = 'pending' AND summary IS NULL) AS pending_meetings
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(PipelineStats {
            active_cities: row.try_get("active_cities")?,
            total_meetings: row.try_get("total_meetings")?,
            summarized_meetings: row.try_get("summarized_meetings")?,
            pending_meetings: row.try_get("pending_meetings")?,
        })
    }
}
