//! Full-text search repository.
//!
//! Search vectors on meetings and items are maintained by the DBMS; the
//! queries here only consume them.

use chrono::NaiveDateTime;
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::DbPool;

/// A search hit with enough context to render a result row.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub meeting_id: String,
    pub item_id: Option<String>,
    pub banana: String,
    pub title: String,
    pub meeting_title: String,
    pub date: Option<NaiveDateTime>,
    pub agenda_url: Option<String>,
    pub rank: f32,
}

/// Repository for full-text search over meetings and items.
#[derive(Clone)]
pub struct SearchRepository {
    pool: DbPool,
}

impl SearchRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Search meeting titles and summaries for a city.
    pub async fn search_meetings(
        &self,
        banana: &str,
        query: &str,
        limit: i64,
    ) -> Result<Vec<SearchHit>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT m.id AS meeting_id, m.banana, m.title, m.date, m.agenda_url,
                   ts_rank(m.search_vector, plainto_tsquery('english', $2)) AS rank
            FROM meetings m
            WHERE m.banana = $1
              AND m.search_vector @@ plainto_tsquery('english', $2)
            ORDER BY rank DESC, m.date DESC
            LIMIT $3
            "#,
        )
        .bind(banana)
        .bind(query)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| build_meeting_hit(row)).collect()
    }

    /// Search item titles and summaries for a city, joined to their
    /// meetings for context.
    pub async fn search_items(
        &self,
        banana: &str,
        query: &str,
        limit: i64,
    ) -> Result<Vec<SearchHit>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT i.id AS item_id, i.meeting_id, i.title,
                   m.banana, m.title AS meeting_title, m.date, m.agenda_url,
                   ts_rank(i.search_vector, plainto_tsquery('english', $2)) AS rank
            FROM items i
            JOIN meetings m ON m.id = i.meeting_id
            WHERE m.banana = $1
              AND i.search_vector @@ plainto_tsquery('english', $2)
              AND (m.status IS NULL OR m.status NOT IN ('cancelled', 'postponed'))
            ORDER BY rank DESC, m.date DESC
            LIMIT $3
            "#,
        )
        .bind(banana)
        .bind(query)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(SearchHit {
                    meeting_id: row.try_get("meeting_id")?,
                    item_id: row.try_get("item_id")?,
                    banana: row.try_get("banana")?,
                    title: row.try_get("title")?,
                    meeting_title: row.try_get("meeting_title")?,
                    date: row.try_get("date")?,
                    agenda_url: row.try_get("agenda_url")?,
                    rank: row.try_get("rank")?,
                })
            })
            .collect()
    }
}

fn build_meeting_hit(row: &PgRow) -> Result<SearchHit, sqlx::Error> {
    let title: String = row.try_get("title")?;
    Ok(SearchHit {
        meeting_id: row.try_get("meeting_id")?,
        item_id: None,
        banana: row.try_get("banana")?,
        meeting_title: title.clone(),
        title,
        date: row.try_get("date")?,
        agenda_url: row.try_get("agenda_url")?,
        rank: row.try_get("rank")?,
    })
}
