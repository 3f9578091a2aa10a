//! Chicago City Clerk adapter.
//!
//! The clerk's ELMS API (`api.chicityclerkelms.chicago.gov`) is a clean
//! JSON surface: `/meeting-agenda` for the window, per-meeting detail for
//! the agenda line items, `/matter/{id}` for attachments and sponsors
//! (fetched concurrently under a semaphore).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::adapter::{
    parse_meeting_status, AdapterCore, AttachmentRecord, ItemRecord, MeetingRecord, SyncWindow,
    VendorAdapter,
};
use crate::dates::parse_civic_date;
use crate::error::VendorError;
use crate::filters::should_skip_item;
use tokio::sync::Semaphore;

const MATTER_CONCURRENCY: usize = 5;
const API_BASE: &str = "https://api.chicityclerkelms.chicago.gov";

pub struct ChicagoAdapter {
    core: AdapterCore,
}

#[derive(Debug, Default)]
struct MatterData {
    attachments: Vec<AttachmentRecord>,
    sponsors: Vec<String>,
}

impl ChicagoAdapter {
    pub fn new(core: AdapterCore) -> Self {
        Self { core }
    }

    async fn fetch_meeting_detail(&self, meeting_id: &str) -> Option<Value> {
        let url = format!("{API_BASE}/meeting-agenda/{meeting_id}");
        match self.core.get_json(&url).await {
            Ok(detail) => Some(detail),
            Err(e) => {
                tracing::warn!(slug = self.core.slug(), meeting_id, error = %e, "could not fetch meeting detail");
                None
            }
        }
    }

    fn parse_matter_data(matter: &Value) -> MatterData {
        let mut data = MatterData::default();

        if let Some(raw) = matter.get("attachments").and_then(Value::as_array) {
            for att in raw {
                let path = att.get("path").and_then(Value::as_str).unwrap_or("").trim();
                if path.is_empty() {
                    continue;
                }
                let name = att
                    .get("fileName")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .or_else(|| att.get("attachmentType").and_then(Value::as_str))
                    .unwrap_or("Attachment");
                data.attachments.push(AttachmentRecord::new(name, path));
            }
        }

        if let Some(raw) = matter.get("sponsors").and_then(Value::as_array) {
            data.sponsors = raw
                .iter()
                .filter_map(|s| s.get("sponsorName").and_then(Value::as_str))
                .map(String::from)
                .collect();
        }

        data
    }

    async fn extract_items(&self, meeting_detail: &Value) -> Vec<ItemRecord> {
        let empty = Vec::new();
        let raw_items = meeting_detail
            .get("items")
            .and_then(Value::as_array)
            .unwrap_or(&empty);

        let mut items = Vec::new();
        let mut matter_ids = Vec::new();
        let mut filtered = 0;

        for (index, raw) in raw_items.iter().enumerate() {
            let matter_id = raw
                .get("matterId")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from);
            let title = raw
                .get("matterTitle")
                .and_then(Value::as_str)
                .unwrap_or("")
                .trim()
                .to_string();
            if title.is_empty() {
                continue;
            }

            let matter_type = raw
                .get("matterType")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from);

            if matter_id.is_none() && should_skip_item(&title, matter_type.as_deref().unwrap_or("")) {
                filtered += 1;
                continue;
            }

            let comment_id = raw
                .get("commentId")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from);
            let vendor_item_id = matter_id
                .clone()
                .or(comment_id)
                .unwrap_or_else(|| format!("chi-{}", index + 1));

            if let Some(id) = &matter_id {
                matter_ids.push((items.len(), id.clone()));
            }

            items.push(ItemRecord {
                vendor_item_id,
                title,
                sequence: (index + 1) as i32,
                agenda_number: raw
                    .get("displayId")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(String::from),
                matter_file: raw
                    .get("recordNumber")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(String::from),
                matter_id,
                matter_type,
                section: raw
                    .get("groupTitle")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(String::from),
                vote_outcome: raw
                    .get("actionName")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(String::from),
                ..Default::default()
            });
        }

        if filtered > 0 {
            tracing::info!(slug = self.core.slug(), filtered_count = filtered, "filtered procedural items");
        }

        // Matter fan-out: attachments and sponsors per matter.
        let semaphore = Arc::new(Semaphore::new(MATTER_CONCURRENCY));
        let mut join_set = tokio::task::JoinSet::new();
        for (item_index, matter_id) in matter_ids {
            let core = self.core.clone();
            let semaphore = semaphore.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire().await.ok()?;
                let url = format!("{API_BASE}/matter/{matter_id}");
                let matter = core.get_json(&url).await.ok()?;
                Some((item_index, Self::parse_matter_data(&matter)))
            });
        }
        while let Some(result) = join_set.join_next().await {
            if let Ok(Some((item_index, data))) = result {
                if let Some(item) = items.get_mut(item_index) {
                    item.attachments = data.attachments;
                    item.sponsors = data.sponsors;
                }
            }
        }

        items
    }
}

#[async_trait]
impl VendorAdapter for ChicagoAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn fetch_meetings_impl(
        &self,
        days_back: i64,
        days_forward: i64,
    ) -> Result<Vec<MeetingRecord>, VendorError> {
        let window = SyncWindow::new(days_back, days_forward);

        let filter = format!(
            "date ge {}Z and date lt {}Z",
            window.start.format("%Y-%m-%dT%H:%M:%S"),
            window.end.format("%Y-%m-%dT%H:%M:%S")
        );
        let query = vec![
            ("filter", filter),
            ("sort", "date desc".to_string()),
            ("top", "500".to_string()),
        ];

        let url = format!("{API_BASE}/meeting-agenda");
        let response = self.core.get_json_with_query(&url, &query).await?;
        let empty = Vec::new();
        let listings = response.get("data").and_then(Value::as_array).unwrap_or(&empty);
        tracing::info!(slug = self.core.slug(), count = listings.len(), "retrieved meetings");

        let mut results = Vec::new();
        for meeting in listings {
            let Some(meeting_id) = meeting.get("meetingId").and_then(Value::as_str) else {
                continue;
            };
            let body = meeting.get("body").and_then(Value::as_str).unwrap_or("");
            let Some(start) = meeting
                .get("date")
                .and_then(Value::as_str)
                .and_then(parse_civic_date)
            else {
                tracing::warn!(slug = self.core.slug(), meeting_id, "meeting invalid date");
                continue;
            };

            let Some(detail) = self.fetch_meeting_detail(meeting_id).await else {
                continue;
            };
            let items = self.extract_items(&detail).await;

            let empty_files = Vec::new();
            let files = detail.get("files").and_then(Value::as_array).unwrap_or(&empty_files);
            let agenda_url = files
                .iter()
                .find(|f| f.get("attachmentType").and_then(Value::as_str) == Some("Agenda"))
                .or(files.first())
                .and_then(|f| f.get("path").and_then(Value::as_str))
                .map(String::from);

            results.push(MeetingRecord {
                vendor_id: meeting_id.to_string(),
                title: if body.is_empty() { "City Council".to_string() } else { body.to_string() },
                start: Some(start),
                agenda_url,
                location: meeting
                    .get("location")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(String::from),
                meeting_status: parse_meeting_status(body, None),
                items,
                ..Default::default()
            });
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matter_data_parses_attachments_and_sponsors() {
        let matter = serde_json::json!({
            "attachments": [
                {"fileName": "O2025-123.pdf", "path": "https://files/o2025-123.pdf", "attachmentType": "Ordinance"},
                {"fileName": "", "path": "", "attachmentType": "Empty"}
            ],
            "sponsors": [
                {"sponsorName": "Ald. Martin"},
                {"sponsorName": "Ald. Vasquez"}
            ]
        });
        let data = ChicagoAdapter::parse_matter_data(&matter);
        assert_eq!(data.attachments.len(), 1);
        assert_eq!(data.attachments[0].name, "O2025-123.pdf");
        assert_eq!(data.sponsors, vec!["Ald. Martin", "Ald. Vasquez"]);
    }
}
