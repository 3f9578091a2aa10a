//! Summarization queue models.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Queue job lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    DeadLetter,
}

/// A summarization job. At most one row exists per `source_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJob {
    pub id: i64,
    pub source_url: String,
    pub meeting_id: Option<String>,
    pub banana: Option<String>,
    pub status: JobStatus,
    pub priority: i32,
    pub retry_count: i32,
    pub created_at: Option<NaiveDateTime>,
    pub started_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub failed_at: Option<NaiveDateTime>,
    pub error_message: Option<String>,
    pub processing_metadata: Option<serde_json::Value>,
}

/// Counts surfaced by admin status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub dead_letter: i64,
}
