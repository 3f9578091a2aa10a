//! Agenda item repository.

use std::collections::HashMap;

use sqlx::types::Json;
use sqlx::{PgConnection, Row};

use crate::models::AgendaItem;
use crate::repositories::helpers::{build_agenda_item, fetch_topics_for_ids, replace_entity_topics};
use crate::DbPool;

const ITEM_COLUMNS: &str = r#"
    id, meeting_id, title, sequence, attachments,
    attachment_hash, body_text, matter_id, matter_file, matter_type,
    agenda_number, sponsors, summary, quality_score, rating_count
"#;

/// Outcome of a dedup pass over one meeting's items.
#[derive(Debug, Default)]
pub struct DedupOutcome {
    pub items: Vec<AgendaItem>,
    pub duplicates_removed: usize,
}

/// Repository for agenda item operations.
#[derive(Clone)]
pub struct ItemRepository {
    pool: DbPool,
}

impl ItemRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Deduplicate items by matter reference within one meeting.
    ///
    /// Some vendors (Legistar in particular) emit several agenda entries
    /// for the same matter. Keep the entry with the most data; items
    /// without a matter id pass through untouched.
    pub fn dedupe_items_by_matter(items: Vec<AgendaItem>) -> DedupOutcome {
        if items.is_empty() {
            return DedupOutcome::default();
        }

        let original_count = items.len();
        let mut by_matter: HashMap<String, Vec<AgendaItem>> = HashMap::new();
        let mut no_matter = Vec::new();

        for item in items {
            match item.matter_id.clone() {
                Some(matter_id) => by_matter.entry(matter_id).or_default().push(item),
                None => no_matter.push(item),
            }
        }

        let mut deduped: Vec<AgendaItem> = Vec::new();
        for (_, mut group) in by_matter {
            if group.len() == 1 {
                deduped.push(group.pop().expect("non-empty group"));
            } else {
                group.sort_by_key(|item| std::cmp::Reverse(completeness_score(item)));
                deduped.push(group.swap_remove(0));
            }
        }

        deduped.extend(no_matter);
        deduped.sort_by_key(|item| item.sequence);

        // Sequences must be unique within the meeting; vendors sometimes
        // repeat them across sections.
        let mut last_sequence = 0;
        for item in &mut deduped {
            if item.sequence <= last_sequence {
                item.sequence = last_sequence + 1;
            }
            last_sequence = item.sequence;
        }

        let duplicates_removed = original_count - deduped.len();
        if duplicates_removed > 0 {
            tracing::info!(
                duplicates_removed,
                original_count,
                deduped_count = deduped.len(),
                "deduplicated items by matter_id"
            );
        }

        DedupOutcome {
            items: deduped,
            duplicates_removed,
        }
    }

    /// Batch upsert items inside an existing transaction, replacing each
    /// item's topic rows. Items should already be deduped.
    pub async fn store_items_tx(
        conn: &mut PgConnection,
        meeting_id: &str,
        items: &[AgendaItem],
    ) -> Result<usize, sqlx::Error> {
        if items.is_empty() {
            return Ok(0);
        }

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO items (
                    id, meeting_id, title, sequence, attachments,
                    attachment_hash, body_text, matter_id, matter_file, matter_type,
                    agenda_number, sponsors, summary
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                ON CONFLICT (id) DO UPDATE SET
                    title = EXCLUDED.title,
                    sequence = EXCLUDED.sequence,
                    attachments = EXCLUDED.attachments,
                    attachment_hash = EXCLUDED.attachment_hash,
                    body_text = COALESCE(EXCLUDED.body_text, items.body_text),
                    matter_id = EXCLUDED.matter_id,
                    matter_file = EXCLUDED.matter_file,
                    matter_type = EXCLUDED.matter_type,
                    agenda_number = EXCLUDED.agenda_number,
                    sponsors = EXCLUDED.sponsors,
                    summary = COALESCE(EXCLUDED.summary, items.summary)
                "#,
            )
            .bind(&item.id)
            .bind(meeting_id)
            .bind(&item.title)
            .bind(item.sequence)
            .bind(Json(&item.attachments))
            .bind(&item.attachment_hash)
            .bind(&item.body_text)
            .bind(&item.matter_id)
            .bind(&item.matter_file)
            .bind(&item.matter_type)
            .bind(&item.agenda_number)
            .bind(Json(&item.sponsors))
            .bind(&item.summary)
            .execute(&mut *conn)
            .await?;

            if !item.topics.is_empty() {
                replace_entity_topics(conn, "item_topics", "item_id", &item.id, &item.topics)
                    .await?;
            }
        }

        tracing::debug!(count = items.len(), meeting_id, "stored agenda items");
        Ok(items.len())
    }

    /// All items for a meeting, in agenda order.
    pub async fn get_agenda_items(&self, meeting_id: &str) -> Result<Vec<AgendaItem>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        let query =
            format!("SELECT {ITEM_COLUMNS} FROM items WHERE meeting_id = $1 ORDER BY sequence");
        let rows = sqlx::query(&query)
            .bind(meeting_id)
            .fetch_all(&mut *conn)
            .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = rows
            .iter()
            .map(|r| r.try_get("id"))
            .collect::<Result<_, _>>()?;
        let mut topics = fetch_topics_for_ids(&mut *conn, "item_topics", "item_id", &ids).await?;

        rows.iter()
            .zip(ids)
            .map(|(row, id)| build_agenda_item(row, topics.remove(&id).unwrap_or_default()))
            .collect()
    }

    /// Batch fetch items for many meetings in one query.
    pub async fn get_items_for_meetings(
        &self,
        meeting_ids: &[String],
    ) -> Result<HashMap<String, Vec<AgendaItem>>, sqlx::Error> {
        if meeting_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut conn = self.pool.acquire().await?;
        let query = format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE meeting_id = ANY($1) ORDER BY meeting_id, sequence"
        );
        let rows = sqlx::query(&query)
            .bind(meeting_ids)
            .fetch_all(&mut *conn)
            .await?;

        if rows.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: Vec<String> = rows
            .iter()
            .map(|r| r.try_get("id"))
            .collect::<Result<_, _>>()?;
        let mut topics = fetch_topics_for_ids(&mut *conn, "item_topics", "item_id", &ids).await?;

        let mut by_meeting: HashMap<String, Vec<AgendaItem>> = HashMap::new();
        for (row, id) in rows.iter().zip(ids) {
            let item = build_agenda_item(row, topics.remove(&id).unwrap_or_default())?;
            by_meeting.entry(item.meeting_id.clone()).or_default().push(item);
        }
        Ok(by_meeting)
    }

    /// All items referencing a matter, across meetings.
    pub async fn get_all_items_for_matter(
        &self,
        matter_id: &str,
    ) -> Result<Vec<AgendaItem>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        let query = format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE matter_id = $1 ORDER BY meeting_id, sequence"
        );
        let rows = sqlx::query(&query)
            .bind(matter_id)
            .fetch_all(&mut *conn)
            .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = rows
            .iter()
            .map(|r| r.try_get("id"))
            .collect::<Result<_, _>>()?;
        let mut topics = fetch_topics_for_ids(&mut *conn, "item_topics", "item_id", &ids).await?;

        rows.iter()
            .zip(ids)
            .map(|(row, id)| build_agenda_item(row, topics.remove(&id).unwrap_or_default()))
            .collect()
    }

    /// Processor write-back: summary + topics for one item, atomically.
    pub async fn update_item_summary(
        &self,
        item_id: &str,
        summary: &str,
        topics: &[String],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE items SET summary = $2 WHERE id = $1")
            .bind(item_id)
            .bind(summary)
            .execute(&mut *tx)
            .await?;

        if !topics.is_empty() {
            replace_entity_topics(&mut *tx, "item_topics", "item_id", item_id, topics).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Points for having agenda_number, summary, attachments, topics,
/// sponsors. Used to pick the survivor among duplicate matter entries.
fn completeness_score(item: &AgendaItem) -> usize {
    let mut score = 0;
    if item.agenda_number.is_some() {
        score += 10;
    }
    if item.summary.is_some() {
        score += 5;
    }
    score += item.attachments.len();
    score += item.topics.len();
    if !item.sponsors.is_empty() {
        score += 2;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttachmentInfo;

    fn item(id: &str, seq: i32, matter_id: Option<&str>) -> AgendaItem {
        AgendaItem {
            id: id.to_string(),
            meeting_id: "m1".to_string(),
            title: format!("Item {id}"),
            sequence: seq,
            attachments: Vec::new(),
            attachment_hash: None,
            body_text: None,
            matter_id: matter_id.map(String::from),
            matter_file: None,
            matter_type: None,
            agenda_number: None,
            sponsors: Vec::new(),
            summary: None,
            topics: Vec::new(),
            quality_score: None,
            rating_count: 0,
        }
    }

    #[test]
    fn dedup_keeps_richest_item_per_matter() {
        let sparse = item("a", 1, Some("m-9"));
        let mut rich = item("b", 2, Some("m-9"));
        rich.summary = Some("summary".to_string());
        rich.attachments = vec![
            AttachmentInfo::new("Report", "https://x/1.pdf"),
            AttachmentInfo::new("Reso", "https://x/2.pdf"),
        ];
        let unrelated = item("c", 3, None);

        let outcome = ItemRepository::dedupe_items_by_matter(vec![sparse, rich, unrelated]);
        assert_eq!(outcome.duplicates_removed, 1);
        assert_eq!(outcome.items.len(), 2);
        assert!(outcome.items.iter().any(|i| i.id == "b"));
        assert!(outcome.items.iter().any(|i| i.id == "c"));
    }

    #[test]
    fn dedup_passes_through_null_matter_items() {
        let outcome =
            ItemRepository::dedupe_items_by_matter(vec![item("a", 1, None), item("b", 2, None)]);
        assert_eq!(outcome.duplicates_removed, 0);
        assert_eq!(outcome.items.len(), 2);
    }

    #[test]
    fn colliding_sequences_are_renumbered() {
        let outcome = ItemRepository::dedupe_items_by_matter(vec![
            item("a", 1, None),
            item("b", 1, None),
            item("c", 2, None),
        ]);
        let mut sequences: Vec<i32> = outcome.items.iter().map(|i| i.sequence).collect();
        let len_before = sequences.len();
        sequences.dedup();
        assert_eq!(sequences.len(), len_before, "sequences must be unique");
    }

    #[test]
    fn agenda_number_outranks_attachments() {
        let mut with_number = item("a", 1, Some("m-1"));
        with_number.agenda_number = Some("1.A.".to_string());
        let mut with_attachments = item("b", 2, Some("m-1"));
        with_attachments.attachments = (0..9)
            .map(|i| AttachmentInfo::new(format!("f{i}"), format!("https://x/{i}.pdf")))
            .collect();

        let outcome = ItemRepository::dedupe_items_by_matter(vec![with_number, with_attachments]);
        assert_eq!(outcome.items[0].id, "a");
    }
}
