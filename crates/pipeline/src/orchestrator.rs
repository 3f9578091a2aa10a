//! Meeting sync orchestrator.
//!
//! Turns one adapter-normalized meeting into durable state: change
//! detection, meeting upsert, item dedup and batch upsert, matter
//! tracking with appearance records, vote promotion, and summarization
//! enqueue. All writes for one meeting share a single transaction; a
//! failure rolls the whole meeting back and the sync moves on.

use chrono::NaiveDateTime;
use db::ids;
use db::models::{
    is_terminal_status, AgendaItem, AttachmentInfo, City, Matter, MatterAppearance, MatterMetadata,
    Meeting, MeetingStatus, ProcessingStatus,
};
use db::repositories::{
    CommitteeRepository, ItemRepository, MatterRepository, MeetingRepository, QueueRepository,
};
use db::DbPool;
use vendors::adapter::{ItemRecord, MeetingRecord};
use vendors::filters::should_skip_matter;
use vendors::matter_files::{extract_matter_file, matter_type_from_prefix};
use vendors::roster::dedupe_sponsors;

/// Per-meeting storage outcome, aggregated by the fetcher.
#[derive(Debug, Default, Clone)]
pub struct StorageStats {
    pub stored: bool,
    pub unchanged: bool,
    pub items_stored: usize,
    pub matters_tracked: usize,
    pub matters_duplicate: usize,
    pub meetings_skipped: usize,
    pub enqueued: bool,
    pub skip_reason: Option<String>,
}

/// Transactional writer for adapter output.
#[derive(Clone)]
pub struct MeetingSyncOrchestrator {
    pool: DbPool,
    committees: CommitteeRepository,
}

impl MeetingSyncOrchestrator {
    pub fn new(pool: DbPool) -> Self {
        let committees = CommitteeRepository::new(pool.clone());
        Self { pool, committees }
    }

    /// Sync one meeting. Returns the stored meeting id and stats, or
    /// stats alone when the meeting was skipped.
    pub async fn sync_meeting(
        &self,
        record: &MeetingRecord,
        city: &City,
    ) -> Result<(Option<String>, StorageStats), sqlx::Error> {
        let mut stats = StorageStats::default();

        let Some(meeting_date) = record.start else {
            // Validation upstream should have culled these.
            stats.meetings_skipped = 1;
            stats.skip_reason = Some("missing start date".to_string());
            return Ok((None, stats));
        };

        let meeting_id = ids::meeting_id(&city.banana, &record.vendor_id);
        let new_digest = change_digest(&meeting_id, &record.title, meeting_date, record.packet_url.as_deref());

        // Committee resolution runs outside the meeting transaction; it
        // is idempotent and shared across meetings.
        let committee_id = match &record.committee_name {
            Some(name) if !name.trim().is_empty() => Some(
                self.committees
                    .find_or_create(&city.banana, name, None)
                    .await?
                    .id,
            ),
            _ => None,
        };

        let mut tx = self.pool.begin().await?;

        let existing = MeetingRepository::get_change_fields_tx(&mut *tx, &meeting_id).await?;
        if let Some((title, date, packet_url)) = &existing {
            let old_digest = change_digest(&meeting_id, title, *date, packet_url.as_deref());
            if old_digest == new_digest {
                stats.unchanged = true;
                stats.stored = true;
                tx.commit().await?;
                tracing::debug!(meeting_id, "meeting unchanged, skipping");
                return Ok((Some(meeting_id), stats));
            }
        }

        let meeting = build_meeting(record, city, &meeting_id, meeting_date, committee_id);
        MeetingRepository::store_tx(&mut *tx, &meeting).await?;
        stats.stored = true;

        // Items: dedupe by matter within the meeting, then batch upsert.
        let items: Vec<AgendaItem> = record
            .items
            .iter()
            .map(|item| build_item(item, &meeting_id))
            .collect();
        let dedup = ItemRepository::dedupe_items_by_matter(items);
        stats.matters_duplicate = dedup.duplicates_removed;
        stats.items_stored = ItemRepository::store_items_tx(&mut *tx, &meeting_id, &dedup.items).await?;

        // Matter tracking per item with a matter reference.
        for item in &dedup.items {
            if !item.has_matter_reference() {
                continue;
            }
            if item
                .matter_type
                .as_deref()
                .map(should_skip_matter)
                .unwrap_or(false)
            {
                continue;
            }

            let matter_id = ids::matter_id(
                &city.banana,
                item.matter_file.as_deref(),
                item.matter_id.as_deref(),
                &item.title,
            );
            let attachment_hash = item.attachment_hash.clone().unwrap_or_default();

            if !MatterRepository::exists_tx(&mut *tx, &matter_id).await? {
                let matter = build_matter(item, city, &matter_id, &meeting_id, meeting_date);
                MatterRepository::store_tx(&mut *tx, &matter).await?;
                stats.matters_tracked += 1;
            } else if !MatterRepository::has_appearance_tx(&mut *tx, &matter_id, &meeting_id).await? {
                let new_count = MatterRepository::record_appearance_tx(
                    &mut *tx,
                    &matter_id,
                    Some(meeting_date),
                    &item.attachments,
                    &attachment_hash,
                )
                .await?;
                tracing::debug!(matter_id, ?new_count, "matter appearance recorded");
            } else {
                MatterRepository::refresh_tracking_tx(
                    &mut *tx,
                    &matter_id,
                    Some(meeting_date),
                    &item.attachments,
                    &attachment_hash,
                )
                .await?;
            }

            let appearance = MatterAppearance {
                matter_id: matter_id.clone(),
                meeting_id: meeting_id.clone(),
                item_id: item.id.clone(),
                appeared_at: Some(meeting_date),
                committee: record.committee_name.clone(),
                committee_id: meeting.committee_id.clone(),
                sequence: Some(item.sequence),
                vote_outcome: None,
                vote_tally: None,
            };
            MatterRepository::create_appearance_tx(&mut *tx, &appearance).await?;

            // Vote promotion: outcomes ride in on the item when the
            // vendor publishes them inline.
            if let Some(outcome) = vote_outcome_for(record, item) {
                MatterRepository::update_appearance_outcome_tx(
                    &mut *tx,
                    &matter_id,
                    &meeting_id,
                    &item.id,
                    &outcome,
                    None,
                )
                .await?;
                let normalized = normalize_outcome(&outcome);
                if is_terminal_status(&normalized) {
                    MatterRepository::update_status_tx(
                        &mut *tx,
                        &matter_id,
                        &normalized,
                        Some(meeting_date),
                    )
                    .await?;
                }
            }
        }

        // Enqueue decider: a source URL, no summary yet, no active job.
        if let Some(source_url) = meeting.source_url() {
            let already_summarized: Option<String> =
                sqlx::query_scalar("SELECT summary FROM meetings WHERE id = $1")
                    .bind(&meeting_id)
                    .fetch_one(&mut *tx)
                    .await?;
            let active = QueueRepository::active_job_exists_tx(&mut *tx, source_url).await?;
            if already_summarized.is_none() && !active {
                stats.enqueued = QueueRepository::enqueue_tx(
                    &mut *tx,
                    source_url,
                    Some(&meeting_id),
                    Some(&city.banana),
                    0,
                )
                .await?;
            }
        } else if record.items.is_empty() {
            tracing::debug!(meeting_id, "no source url and no items, stored without enqueue");
        }

        tx.commit().await?;

        metrics::counter!("meetings_synced_total", 1, "banana" => city.banana.clone());
        metrics::counter!(
            "items_extracted_total",
            stats.items_stored as u64,
            "banana" => city.banana.clone()
        );

        Ok((Some(meeting_id), stats))
    }
}

/// Digest over the fields whose change warrants a re-sync.
fn change_digest(
    meeting_id: &str,
    title: &str,
    date: NaiveDateTime,
    packet_url: Option<&str>,
) -> String {
    ids::meeting_change_digest(meeting_id, title, &date.format("%Y-%m-%dT%H:%M:%S").to_string(), packet_url)
}

fn build_meeting(
    record: &MeetingRecord,
    city: &City,
    meeting_id: &str,
    meeting_date: NaiveDateTime,
    committee_id: Option<String>,
) -> Meeting {
    Meeting {
        id: meeting_id.to_string(),
        banana: city.banana.clone(),
        title: record.title.clone(),
        date: meeting_date,
        agenda_url: record.agenda_url.clone(),
        agenda_sources: None,
        packet_url: record.packet_url.clone(),
        summary: None,
        participation: record.participation.clone().filter(|p| !p.is_empty()),
        status: record.meeting_status,
        processing_status: ProcessingStatus::Pending,
        processing_method: None,
        processing_time: None,
        committee_id,
        topics: Vec::new(),
        created_at: None,
        updated_at: None,
    }
}

fn build_item(record: &ItemRecord, meeting_id: &str) -> AgendaItem {
    let attachments: Vec<AttachmentInfo> = record
        .attachments
        .iter()
        .map(|a| AttachmentInfo {
            name: a.name.clone(),
            url: a.url.clone(),
            attachment_type: a.attachment_type,
        })
        .collect();

    let pairs: Vec<(String, String)> = attachments
        .iter()
        .map(|a| (a.name.clone(), a.url.clone()))
        .collect();
    let attachment_hash = (!pairs.is_empty()).then(|| ids::attachment_hash(&pairs));

    // Fall back to title extraction when the vendor supplied no case
    // number outright.
    let matter_file = record
        .matter_file
        .clone()
        .or_else(|| extract_matter_file(&record.title));
    let matter_type = record
        .matter_type
        .clone()
        .or_else(|| matter_file.as_deref().and_then(matter_type_from_prefix).map(String::from));

    AgendaItem {
        id: ids::item_id(meeting_id, &record.vendor_item_id),
        meeting_id: meeting_id.to_string(),
        title: record.title.clone(),
        sequence: record.sequence.max(1),
        attachments,
        attachment_hash,
        body_text: record.description.clone(),
        matter_id: record.matter_id.clone(),
        matter_file,
        matter_type,
        agenda_number: record.agenda_number.clone(),
        sponsors: dedupe_sponsors(&record.sponsors),
        summary: None,
        topics: Vec::new(),
        quality_score: None,
        rating_count: 0,
    }
}

fn build_matter(
    item: &AgendaItem,
    city: &City,
    matter_id: &str,
    meeting_id: &str,
    meeting_date: NaiveDateTime,
) -> Matter {
    Matter {
        id: matter_id.to_string(),
        banana: city.banana.clone(),
        matter_id: item.matter_id.clone(),
        matter_file: item.matter_file.clone(),
        matter_type: item.matter_type.clone(),
        title: item.title.clone(),
        sponsors: item.sponsors.clone(),
        canonical_summary: None,
        canonical_topics: Vec::new(),
        attachments: item.attachments.clone(),
        metadata: Some(MatterMetadata {
            attachment_hash: item.attachment_hash.clone(),
            vendor: Some(city.vendor.clone()),
            source_meeting_id: Some(meeting_id.to_string()),
        }),
        first_seen: Some(meeting_date),
        last_seen: Some(meeting_date),
        appearance_count: 1,
        status: "active".to_string(),
        final_vote_date: None,
        quality_score: None,
        rating_count: 0,
    }
}

fn vote_outcome_for(record: &MeetingRecord, stored: &AgendaItem) -> Option<String> {
    record
        .items
        .iter()
        .find(|r| ids::item_id(&stored.meeting_id, &r.vendor_item_id) == stored.id)
        .and_then(|r| r.vote_outcome.clone())
}

/// Map vendor action wording onto the matter status vocabulary.
fn normalize_outcome(outcome: &str) -> String {
    let lower = outcome.to_lowercase();
    if lower.contains("pass") || lower.contains("adopt") || lower.contains("approve") {
        "passed".to_string()
    } else if lower.contains("fail") || lower.contains("reject") || lower.contains("denied") {
        "failed".to_string()
    } else if lower.contains("withdraw") {
        "withdrawn".to_string()
    } else if lower.contains("table") {
        "tabled".to_string()
    } else {
        lower
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vendors::adapter::AttachmentRecord;

    fn record_item(vendor_item_id: &str, title: &str) -> ItemRecord {
        ItemRecord {
            vendor_item_id: vendor_item_id.to_string(),
            title: title.to_string(),
            sequence: 1,
            ..Default::default()
        }
    }

    #[test]
    fn build_item_extracts_matter_file_from_title() {
        let item = build_item(
            &record_item("9", "Adopt RES-2025-123 approving the budget"),
            "paloaltoCA_44",
        );
        assert_eq!(item.matter_file.as_deref(), Some("RES-2025-123"));
        assert_eq!(item.matter_type.as_deref(), Some("Resolution"));
        assert_eq!(item.id, "paloaltoCA_44_9");
    }

    #[test]
    fn build_item_hashes_attachments() {
        let mut record = record_item("9", "Item");
        record.attachments = vec![
            AttachmentRecord::new("B", "https://x/b.pdf"),
            AttachmentRecord::new("A", "https://x/a.pdf"),
        ];
        let forward = build_item(&record, "m");

        record.attachments.reverse();
        let reversed = build_item(&record, "m");
        assert_eq!(forward.attachment_hash, reversed.attachment_hash);
        assert!(forward.attachment_hash.is_some());

        let bare = build_item(&record_item("9", "Item"), "m");
        assert_eq!(bare.attachment_hash, None);
    }

    #[test]
    fn change_digest_tracks_packet_url() {
        let date = chrono::NaiveDate::from_ymd_opt(2026, 1, 5)
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap();
        let a = change_digest("m1", "Council", date, None);
        let b = change_digest("m1", "Council", date, Some("https://x/packet.pdf"));
        assert_ne!(a, b);
        assert_eq!(a, change_digest("m1", "Council", date, None));
    }

    #[test]
    fn outcome_normalization() {
        assert_eq!(normalize_outcome("Passed as Amended"), "passed");
        assert_eq!(normalize_outcome("Approved"), "passed");
        assert_eq!(normalize_outcome("Motion Failed"), "failed");
        assert_eq!(normalize_outcome("Laid on the Table"), "tabled");
        assert_eq!(normalize_outcome("Referred to Committee"), "referred to committee");
        assert!(is_terminal_status(&normalize_outcome("Withdrawn by sponsor")));
        assert!(!is_terminal_status(&normalize_outcome("Referred")));
    }
}
