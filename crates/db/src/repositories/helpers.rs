//! Repository helpers: row construction and topic-table maintenance.
//!
//! JSONB columns are decoded into typed records here. A column that holds
//! a JSON string where a structured value belongs decodes as a
//! `ColumnDecode` error and is surfaced, not papered over; that shape
//! means corrupted data or a schema mismatch.

use std::collections::HashMap;

use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, Row};

use crate::models::{
    AgendaItem, AttachmentInfo, Matter, MatterMetadata, Meeting, ParticipationInfo,
};

pub(crate) fn build_meeting(row: &PgRow, topics: Vec<String>) -> Result<Meeting, sqlx::Error> {
    let participation: Option<Json<ParticipationInfo>> = row.try_get("participation")?;
    let agenda_sources: Option<serde_json::Value> = row.try_get("agenda_sources")?;

    Ok(Meeting {
        id: row.try_get("id")?,
        banana: row.try_get("banana")?,
        title: row.try_get("title")?,
        date: row.try_get("date")?,
        agenda_url: row.try_get("agenda_url")?,
        agenda_sources,
        packet_url: row.try_get("packet_url")?,
        summary: row.try_get("summary")?,
        participation: participation.map(|j| j.0),
        status: row.try_get("status")?,
        processing_status: row.try_get("processing_status")?,
        processing_method: row.try_get("processing_method")?,
        processing_time: row.try_get("processing_time")?,
        committee_id: row.try_get("committee_id")?,
        topics,
        created_at: row.try_get("created_at").ok(),
        updated_at: row.try_get("updated_at").ok(),
    })
}

pub(crate) fn build_agenda_item(row: &PgRow, topics: Vec<String>) -> Result<AgendaItem, sqlx::Error> {
    let attachments: Option<Json<Vec<AttachmentInfo>>> = row.try_get("attachments")?;
    let sponsors: Option<Json<Vec<String>>> = row.try_get("sponsors")?;

    Ok(AgendaItem {
        id: row.try_get("id")?,
        meeting_id: row.try_get("meeting_id")?,
        title: row.try_get("title")?,
        sequence: row.try_get("sequence")?,
        attachments: attachments.map(|j| j.0).unwrap_or_default(),
        attachment_hash: row.try_get("attachment_hash")?,
        body_text: row.try_get("body_text")?,
        matter_id: row.try_get("matter_id")?,
        matter_file: row.try_get("matter_file")?,
        matter_type: row.try_get("matter_type")?,
        agenda_number: row.try_get("agenda_number")?,
        sponsors: sponsors.map(|j| j.0).unwrap_or_default(),
        summary: row.try_get("summary")?,
        topics,
        quality_score: row.try_get("quality_score")?,
        rating_count: row.try_get::<Option<i32>, _>("rating_count")?.unwrap_or(0),
    })
}

pub(crate) fn build_matter(row: &PgRow, topics: Vec<String>) -> Result<Matter, sqlx::Error> {
    let attachments: Option<Json<Vec<AttachmentInfo>>> = row.try_get("attachments")?;
    let sponsors: Option<Json<Vec<String>>> = row.try_get("sponsors")?;
    let metadata: Option<Json<MatterMetadata>> = row.try_get("metadata")?;

    Ok(Matter {
        id: row.try_get("id")?,
        banana: row.try_get("banana")?,
        matter_id: row.try_get("matter_id")?,
        matter_file: row.try_get("matter_file")?,
        matter_type: row.try_get("matter_type")?,
        title: row.try_get("title")?,
        sponsors: sponsors.map(|j| j.0).unwrap_or_default(),
        canonical_summary: row.try_get("canonical_summary")?,
        canonical_topics: topics,
        attachments: attachments.map(|j| j.0).unwrap_or_default(),
        metadata: metadata.map(|j| j.0),
        first_seen: row.try_get("first_seen")?,
        last_seen: row.try_get("last_seen")?,
        appearance_count: row.try_get("appearance_count")?,
        status: row.try_get("status")?,
        final_vote_date: row.try_get("final_vote_date")?,
        quality_score: row.try_get("quality_score")?,
        rating_count: row.try_get::<Option<i32>, _>("rating_count")?.unwrap_or(0),
    })
}

/// Batch fetch topics from a join table, keyed by owning id.
///
/// `table` and `id_column` are compile-time constants at every call site,
/// never user input.
pub(crate) async fn fetch_topics_for_ids(
    conn: &mut PgConnection,
    table: &str,
    id_column: &str,
    ids: &[String],
) -> Result<HashMap<String, Vec<String>>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let query = format!("SELECT {id_column}, topic FROM {table} WHERE {id_column} = ANY($1)");
    let rows = sqlx::query(&query).bind(ids).fetch_all(&mut *conn).await?;

    let mut result: HashMap<String, Vec<String>> = HashMap::new();
    for row in rows {
        let id: String = row.try_get(0)?;
        let topic: String = row.try_get(1)?;
        result.entry(id).or_default().push(topic);
    }
    Ok(result)
}

/// Replace all topics for one entity (DELETE + INSERT, same transaction).
pub(crate) async fn replace_entity_topics(
    conn: &mut PgConnection,
    table: &str,
    id_column: &str,
    entity_id: &str,
    topics: &[String],
) -> Result<(), sqlx::Error> {
    let delete = format!("DELETE FROM {table} WHERE {id_column} = $1");
    sqlx::query(&delete).bind(entity_id).execute(&mut *conn).await?;

    if topics.is_empty() {
        return Ok(());
    }

    let insert =
        format!("INSERT INTO {table} ({id_column}, topic) VALUES ($1, $2) ON CONFLICT DO NOTHING");
    for topic in topics {
        sqlx::query(&insert)
            .bind(entity_id)
            .bind(topic)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}
