//! Matter repository.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use sqlx::types::Json;
use sqlx::{PgConnection, Row};

use crate::models::{AttachmentInfo, Matter, MatterAppearance};
use crate::repositories::helpers::{build_matter, fetch_topics_for_ids, replace_entity_topics};
use crate::DbPool;

const MATTER_COLUMNS: &str = r#"
    id, banana, matter_id, matter_file, matter_type,
    title, sponsors, canonical_summary, attachments, metadata,
    first_seen, last_seen, appearance_count, status,
    final_vote_date, quality_score, rating_count
"#;

/// Repository for matter operations.
#[derive(Clone)]
pub struct MatterRepository {
    pool: DbPool,
}

impl MatterRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create-or-update a matter inside an existing transaction.
    ///
    /// Canonical summary/topics written by the processor survive via
    /// COALESCE; tracking fields always take the new value.
    pub async fn store_tx(conn: &mut PgConnection, matter: &Matter) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO city_matters (
                id, banana, matter_id, matter_file, matter_type,
                title, sponsors, canonical_summary, attachments, metadata,
                first_seen, last_seen, appearance_count, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                matter_file = EXCLUDED.matter_file,
                matter_type = EXCLUDED.matter_type,
                title = EXCLUDED.title,
                sponsors = EXCLUDED.sponsors,
                canonical_summary = COALESCE(EXCLUDED.canonical_summary, city_matters.canonical_summary),
                attachments = EXCLUDED.attachments,
                metadata = EXCLUDED.metadata,
                last_seen = EXCLUDED.last_seen,
                appearance_count = EXCLUDED.appearance_count,
                status = EXCLUDED.status,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&matter.id)
        .bind(&matter.banana)
        .bind(&matter.matter_id)
        .bind(&matter.matter_file)
        .bind(&matter.matter_type)
        .bind(&matter.title)
        .bind(Json(&matter.sponsors))
        .bind(&matter.canonical_summary)
        .bind(Json(&matter.attachments))
        .bind(matter.metadata.as_ref().map(Json))
        .bind(matter.first_seen)
        .bind(matter.last_seen)
        .bind(matter.appearance_count.max(1))
        .bind(&matter.status)
        .execute(&mut *conn)
        .await?;

        if !matter.canonical_topics.is_empty() {
            replace_entity_topics(
                conn,
                "matter_topics",
                "matter_id",
                &matter.id,
                &matter.canonical_topics,
            )
            .await?;
        }
        Ok(())
    }

    /// True when the matter row exists, checked inside the sync
    /// transaction.
    pub async fn exists_tx(conn: &mut PgConnection, matter_id: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM city_matters WHERE id = $1)")
            .bind(matter_id)
            .fetch_one(&mut *conn)
            .await
    }

    /// Atomically bump tracking fields on a new appearance and return the
    /// new appearance count. Single statement so concurrent syncs cannot
    /// double-increment.
    pub async fn record_appearance_tx(
        conn: &mut PgConnection,
        matter_id: &str,
        meeting_date: Option<NaiveDateTime>,
        attachments: &[AttachmentInfo],
        attachment_hash: &str,
    ) -> Result<Option<i32>, sqlx::Error> {
        let new_count: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE city_matters
            SET last_seen = COALESCE($2, last_seen),
                attachments = $3,
                metadata = COALESCE(metadata, '{}'::jsonb) || jsonb_build_object('attachment_hash', $4::text),
                appearance_count = appearance_count + 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            RETURNING appearance_count
            "#,
        )
        .bind(matter_id)
        .bind(meeting_date)
        .bind(Json(attachments))
        .bind(attachment_hash)
        .fetch_optional(&mut *conn)
        .await?;

        tracing::debug!(matter_id, ?new_count, "updated matter tracking");
        Ok(new_count)
    }

    /// Refresh tracking fields without counting a new appearance
    /// (re-sync of an already-recorded meeting).
    pub async fn refresh_tracking_tx(
        conn: &mut PgConnection,
        matter_id: &str,
        meeting_date: Option<NaiveDateTime>,
        attachments: &[AttachmentInfo],
        attachment_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE city_matters
            SET last_seen = GREATEST(COALESCE($2, last_seen), last_seen),
                attachments = $3,
                metadata = COALESCE(metadata, '{}'::jsonb) || jsonb_build_object('attachment_hash', $4::text),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            "#,
        )
        .bind(matter_id)
        .bind(meeting_date)
        .bind(Json(attachments))
        .bind(attachment_hash)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Whether any appearance exists for (matter, meeting).
    pub async fn has_appearance_tx(
        conn: &mut PgConnection,
        matter_id: &str,
        meeting_id: &str,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM matter_appearances
                WHERE matter_id = $1 AND meeting_id = $2
            )
            "#,
        )
        .bind(matter_id)
        .bind(meeting_id)
        .fetch_one(&mut *conn)
        .await
    }

    /// Insert an appearance; duplicate (matter, meeting, item) rows are
    /// ignored.
    pub async fn create_appearance_tx(
        conn: &mut PgConnection,
        appearance: &MatterAppearance,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO matter_appearances (
                matter_id, meeting_id, item_id, appeared_at,
                committee, committee_id, sequence, vote_outcome, vote_tally
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (matter_id, meeting_id, item_id) DO NOTHING
            "#,
        )
        .bind(&appearance.matter_id)
        .bind(&appearance.meeting_id)
        .bind(&appearance.item_id)
        .bind(appearance.appeared_at)
        .bind(&appearance.committee)
        .bind(&appearance.committee_id)
        .bind(appearance.sequence)
        .bind(&appearance.vote_outcome)
        .bind(&appearance.vote_tally)
        .execute(&mut *conn)
        .await?;

        tracing::debug!(
            matter_id = %appearance.matter_id,
            meeting_id = %appearance.meeting_id,
            "created matter appearance"
        );
        Ok(())
    }

    /// Record a vote outcome on an existing appearance.
    pub async fn update_appearance_outcome_tx(
        conn: &mut PgConnection,
        matter_id: &str,
        meeting_id: &str,
        item_id: &str,
        vote_outcome: &str,
        vote_tally: Option<&serde_json::Value>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE matter_appearances
            SET vote_outcome = $4, vote_tally = $5
            WHERE matter_id = $1 AND meeting_id = $2 AND item_id = $3
            "#,
        )
        .bind(matter_id)
        .bind(meeting_id)
        .bind(item_id)
        .bind(vote_outcome)
        .bind(vote_tally)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Promote a terminal disposition onto the matter row.
    pub async fn update_status_tx(
        conn: &mut PgConnection,
        matter_id: &str,
        status: &str,
        final_vote_date: Option<NaiveDateTime>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE city_matters
            SET status = $2,
                final_vote_date = COALESCE($3, final_vote_date),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            "#,
        )
        .bind(matter_id)
        .bind(status)
        .bind(final_vote_date)
        .execute(&mut *conn)
        .await?;

        tracing::info!(matter_id, status, "updated matter status");
        Ok(())
    }

    pub async fn get_matter(&self, matter_id: &str) -> Result<Option<Matter>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        let query = format!("SELECT {MATTER_COLUMNS} FROM city_matters WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(matter_id)
            .fetch_optional(&mut *conn)
            .await?;

        let Some(row) = row else { return Ok(None) };

        let topics_map = fetch_topics_for_ids(
            &mut *conn,
            "matter_topics",
            "matter_id",
            &[matter_id.to_string()],
        )
        .await?;

        Ok(Some(build_matter(
            &row,
            topics_map.get(matter_id).cloned().unwrap_or_default(),
        )?))
    }

    /// Batch fetch matters by id.
    pub async fn get_matters_batch(
        &self,
        matter_ids: &[String],
    ) -> Result<HashMap<String, Matter>, sqlx::Error> {
        if matter_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut conn = self.pool.acquire().await?;
        let query = format!("SELECT {MATTER_COLUMNS} FROM city_matters WHERE id = ANY($1)");
        let rows = sqlx::query(&query)
            .bind(matter_ids)
            .fetch_all(&mut *conn)
            .await?;

        if rows.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: Vec<String> = rows
            .iter()
            .map(|r| r.try_get("id"))
            .collect::<Result<_, _>>()?;
        let mut topics = fetch_topics_for_ids(&mut *conn, "matter_topics", "matter_id", &ids).await?;

        let mut result = HashMap::new();
        for (row, id) in rows.iter().zip(ids) {
            let matter = build_matter(row, topics.remove(&id).unwrap_or_default())?;
            result.insert(id, matter);
        }
        Ok(result)
    }

    /// Appearance history for a matter, newest first.
    pub async fn get_appearances(
        &self,
        matter_id: &str,
    ) -> Result<Vec<MatterAppearance>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT matter_id, meeting_id, item_id, appeared_at,
                   committee, committee_id, sequence, vote_outcome, vote_tally
            FROM matter_appearances
            WHERE matter_id = $1
            ORDER BY appeared_at DESC NULLS LAST
            "#,
        )
        .bind(matter_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(MatterAppearance {
                    matter_id: row.try_get("matter_id")?,
                    meeting_id: row.try_get("meeting_id")?,
                    item_id: row.try_get("item_id")?,
                    appeared_at: row.try_get("appeared_at")?,
                    committee: row.try_get("committee")?,
                    committee_id: row.try_get("committee_id")?,
                    sequence: row.try_get("sequence")?,
                    vote_outcome: row.try_get("vote_outcome")?,
                    vote_tally: row.try_get("vote_tally")?,
                })
            })
            .collect()
    }

    /// Processor write-back: canonical summary + topics + the attachment
    /// hash the summary was derived from.
    pub async fn update_matter_summary(
        &self,
        matter_id: &str,
        canonical_summary: &str,
        canonical_topics: &[String],
        attachment_hash: &str,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE city_matters
            SET canonical_summary = $2,
                metadata = COALESCE(metadata, '{}'::jsonb) || jsonb_build_object('attachment_hash', $3::text),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            "#,
        )
        .bind(matter_id)
        .bind(canonical_summary)
        .bind(attachment_hash)
        .execute(&mut *tx)
        .await?;

        if !canonical_topics.is_empty() {
            replace_entity_topics(&mut *tx, "matter_topics", "matter_id", matter_id, canonical_topics)
                .await?;
        }

        tx.commit().await?;
        tracing::debug!(matter_id, "updated matter with canonical summary");
        Ok(())
    }

    /// Full-text search on title + canonical summary, with a matter-file
    /// substring fallback.
    pub async fn search_matters_fulltext(
        &self,
        query: &str,
        banana: &str,
        limit: i64,
    ) -> Result<Vec<Matter>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            r#"
            SELECT {MATTER_COLUMNS},
                   ts_rank(
                       to_tsvector('english', COALESCE(title, '') || ' ' || COALESCE(canonical_summary, '')),
                       plainto_tsquery('english', $1)
                   ) AS rank
            FROM city_matters
            WHERE banana = $2
              AND (
                  to_tsvector('english', COALESCE(title, '') || ' ' || COALESCE(canonical_summary, ''))
                      @@ plainto_tsquery('english', $1)
                  OR matter_file ILIKE '%' || $1 || '%'
              )
            ORDER BY rank DESC, last_seen DESC
            LIMIT $3
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(query)
            .bind(banana)
            .bind(limit)
            .fetch_all(&mut *conn)
            .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = rows
            .iter()
            .map(|r| r.try_get("id"))
            .collect::<Result<_, _>>()?;
        let mut topics = fetch_topics_for_ids(&mut *conn, "matter_topics", "matter_id", &ids).await?;

        rows.iter()
            .zip(ids)
            .map(|(row, id)| build_matter(row, topics.remove(&id).unwrap_or_default()))
            .collect()
    }
}
