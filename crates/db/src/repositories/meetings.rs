//! Meeting repository.

use std::collections::HashMap;

use sqlx::types::Json;
use sqlx::{PgConnection, Row};

use crate::models::{Meeting, ParticipationInfo};
use crate::repositories::helpers::{build_meeting, fetch_topics_for_ids, replace_entity_topics};
use crate::DbPool;

const MEETING_COLUMNS: &str = r#"
    id, banana, title, date, agenda_url, agenda_sources, packet_url,
    summary, participation, status, processing_status,
    processing_method, processing_time, committee_id,
    created_at, updated_at
"#;

/// Repository for meeting operations.
#[derive(Clone)]
pub struct MeetingRepository {
    pool: DbPool,
}

impl MeetingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Upsert a meeting inside an existing transaction.
    ///
    /// Summary, participation, and processing fields written by the
    /// external processor survive re-syncs via COALESCE.
    pub async fn store_tx(conn: &mut PgConnection, meeting: &Meeting) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO meetings (
                id, banana, title, date, agenda_url, agenda_sources, packet_url,
                summary, participation, status, processing_status,
                processing_method, processing_time, committee_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                date = EXCLUDED.date,
                agenda_url = EXCLUDED.agenda_url,
                agenda_sources = COALESCE(EXCLUDED.agenda_sources, meetings.agenda_sources),
                packet_url = EXCLUDED.packet_url,
                summary = COALESCE(EXCLUDED.summary, meetings.summary),
                participation = COALESCE(EXCLUDED.participation, meetings.participation),
                status = EXCLUDED.status,
                processing_status = COALESCE(EXCLUDED.processing_status, meetings.processing_status),
                processing_method = COALESCE(EXCLUDED.processing_method, meetings.processing_method),
                processing_time = COALESCE(EXCLUDED.processing_time, meetings.processing_time),
                committee_id = COALESCE(EXCLUDED.committee_id, meetings.committee_id),
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&meeting.id)
        .bind(&meeting.banana)
        .bind(&meeting.title)
        .bind(meeting.date)
        .bind(&meeting.agenda_url)
        .bind(&meeting.agenda_sources)
        .bind(&meeting.packet_url)
        .bind(&meeting.summary)
        .bind(meeting.participation.as_ref().map(Json))
        .bind(meeting.status)
        .bind(meeting.processing_status)
        .bind(&meeting.processing_method)
        .bind(meeting.processing_time)
        .bind(&meeting.committee_id)
        .execute(&mut *conn)
        .await?;

        if !meeting.topics.is_empty() {
            replace_entity_topics(conn, "meeting_topics", "meeting_id", &meeting.id, &meeting.topics)
                .await?;
        }
        Ok(())
    }

    /// Store a meeting in its own transaction.
    pub async fn store_meeting(&self, meeting: &Meeting) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        Self::store_tx(&mut *tx, meeting).await?;
        tx.commit().await?;
        tracing::info!(meeting_id = %meeting.id, banana = %meeting.banana, "meeting stored");
        Ok(())
    }

    /// Fields feeding the change-detection digest, fetched inside the
    /// sync transaction.
    pub async fn get_change_fields_tx(
        conn: &mut PgConnection,
        meeting_id: &str,
    ) -> Result<Option<(String, chrono::NaiveDateTime, Option<String>)>, sqlx::Error> {
        let row = sqlx::query("SELECT title, date, packet_url FROM meetings WHERE id = $1")
            .bind(meeting_id)
            .fetch_optional(&mut *conn)
            .await?;
        row.map(|r| {
            Ok((
                r.try_get("title")?,
                r.try_get("date")?,
                r.try_get("packet_url")?,
            ))
        })
        .transpose()
    }

    pub async fn get_meeting(&self, meeting_id: &str) -> Result<Option<Meeting>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        let query = format!("SELECT {MEETING_COLUMNS} FROM meetings WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(meeting_id)
            .fetch_optional(&mut *conn)
            .await?;

        let Some(row) = row else { return Ok(None) };

        let topics_map = fetch_topics_for_ids(
            &mut *conn,
            "meeting_topics",
            "meeting_id",
            &[meeting_id.to_string()],
        )
        .await?;

        Ok(Some(build_meeting(
            &row,
            topics_map.get(meeting_id).cloned().unwrap_or_default(),
        )?))
    }

    /// Meetings for a city, newest first, topics loaded in one batch.
    pub async fn get_meetings_for_city(
        &self,
        banana: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Meeting>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        let query = format!(
            "SELECT {MEETING_COLUMNS} FROM meetings WHERE banana = $1 ORDER BY date DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query(&query)
            .bind(banana)
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *conn)
            .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = rows
            .iter()
            .map(|r| r.try_get("id"))
            .collect::<Result<_, _>>()?;
        let mut topics = fetch_topics_for_ids(&mut *conn, "meeting_topics", "meeting_id", &ids).await?;

        rows.iter()
            .zip(ids)
            .map(|(row, id)| build_meeting(row, topics.remove(&id).unwrap_or_default()))
            .collect()
    }

    /// Lookup by packet URL, used by the enqueue decider and the
    /// processor's cache checks.
    pub async fn get_meeting_by_source_url(
        &self,
        source_url: &str,
    ) -> Result<Option<Meeting>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        let query = format!(
            "SELECT {MEETING_COLUMNS} FROM meetings WHERE agenda_url = $1 OR packet_url = $1 LIMIT 1"
        );
        let row = sqlx::query(&query)
            .bind(source_url)
            .fetch_optional(&mut *conn)
            .await?;

        let Some(row) = row else { return Ok(None) };
        let id: String = row.try_get("id")?;
        let topics_map =
            fetch_topics_for_ids(&mut *conn, "meeting_topics", "meeting_id", &[id.clone()]).await?;
        Ok(Some(build_meeting(
            &row,
            topics_map.get(&id).cloned().unwrap_or_default(),
        )?))
    }

    /// Write the processor's summary and metadata back, replacing topic
    /// rows in the same transaction.
    pub async fn update_meeting_summary(
        &self,
        meeting_id: &str,
        summary: Option<&str>,
        processing_method: &str,
        processing_time: f64,
        participation: Option<&ParticipationInfo>,
        topics: &[String],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE meetings
            SET summary = $2,
                processing_status = 'completed',
                processing_method = $3,
                processing_time = $4,
                participation = COALESCE($5, participation),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            "#,
        )
        .bind(meeting_id)
        .bind(summary)
        .bind(processing_method)
        .bind(processing_time)
        .bind(participation.map(Json))
        .execute(&mut *tx)
        .await?;

        if !topics.is_empty() {
            replace_entity_topics(&mut *tx, "meeting_topics", "meeting_id", meeting_id, topics)
                .await?;
        }

        tx.commit().await?;
        tracing::info!(meeting_id, topic_count = topics.len(), "updated meeting summary");
        Ok(())
    }

    pub async fn set_processing_status(
        &self,
        meeting_id: &str,
        status: crate::models::ProcessingStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE meetings SET processing_status = $2, updated_at = CURRENT_TIMESTAMP WHERE id = $1",
        )
        .bind(meeting_id)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent meetings across all cities.
    pub async fn get_recent_meetings(&self, limit: i64) -> Result<Vec<Meeting>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        let query =
            format!("SELECT {MEETING_COLUMNS} FROM meetings ORDER BY date DESC LIMIT $1");
        let rows = sqlx::query(&query).bind(limit).fetch_all(&mut *conn).await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = rows
            .iter()
            .map(|r| r.try_get("id"))
            .collect::<Result<_, _>>()?;
        let mut topics: HashMap<String, Vec<String>> =
            fetch_topics_for_ids(&mut *conn, "meeting_topics", "meeting_id", &ids).await?;

        rows.iter()
            .zip(ids)
            .map(|(row, id)| build_meeting(row, topics.remove(&id).unwrap_or_default()))
            .collect()
    }
}
