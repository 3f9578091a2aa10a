//! CivicClerk adapter.
//!
//! OData API at `{slug}.api.civicclerk.com`: `/v1/Events` (paginated via
//! `@odata.nextLink`) for the listing, `/v1/Meetings/{agendaId}` for the
//! item tree. Attachments arrive inline as published file paths; the
//! monolithic fallback is a `GetMeetingFileStream` URL.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::adapter::{
    parse_meeting_status, AdapterCore, AttachmentRecord, ItemRecord, MeetingRecord, SyncWindow,
    VendorAdapter,
};
use crate::dates::parse_civic_date;
use crate::error::VendorError;
use crate::filters::filter_items;
use crate::matter_files::{extract_matter_file, matter_type_from_prefix};

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("static regex"));
static BR_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("static regex"));

pub struct CivicClerkAdapter {
    core: AdapterCore,
    base_url: String,
}

impl CivicClerkAdapter {
    pub fn new(core: AdapterCore) -> Self {
        let base_url = format!("https://{}.api.civicclerk.com", core.slug());
        Self { core, base_url }
    }

    fn portal_headers(&self) -> Vec<(&'static str, String)> {
        // The API rejects requests without the portal origin.
        vec![
            ("Origin", format!("https://{}.portal.civicclerk.com", self.core.slug())),
            ("Referer", format!("https://{}.portal.civicclerk.com/", self.core.slug())),
        ]
    }

    fn file_stream_url(&self, doc: &Value) -> Option<String> {
        let file_id = doc.get("fileId").and_then(Value::as_i64)?;
        Some(format!(
            "{}/v1/Meetings/GetMeetingFileStream(fileId={},plainText=false)",
            self.base_url, file_id
        ))
    }

    async fn fetch_all_events(&self, window: SyncWindow) -> Result<Vec<Value>, VendorError> {
        let filter = format!(
            "startDateTime gt {}Z and startDateTime lt {}Z",
            window.start.format("%Y-%m-%dT%H:%M:%S%.3f"),
            window.end.format("%Y-%m-%dT%H:%M:%S%.3f")
        );
        let query = vec![
            ("$filter", filter),
            ("$orderby", "startDateTime asc, eventName asc".to_string()),
        ];

        let mut url = format!("{}/v1/Events", self.base_url);
        let mut first = true;
        let mut events = Vec::new();

        loop {
            let data = if first {
                self.core.get_json_with_query(&url, &query).await?
            } else {
                self.core.get_json(&url).await?
            };
            first = false;

            if let Some(page) = data.get("value").and_then(Value::as_array) {
                events.extend(page.iter().cloned());
            }

            match data.get("@odata.nextLink").and_then(Value::as_str) {
                // nextLink carries all query params itself.
                Some(next) if !next.is_empty() => url = next.to_string(),
                _ => break,
            }
        }

        Ok(events)
    }

    async fn process_event(&self, event: &Value) -> Option<MeetingRecord> {
        let event_id = event.get("id").map(json_id)?;
        let event_name = event.get("eventName").and_then(Value::as_str).unwrap_or("");
        let start_time = event.get("startDateTime").and_then(Value::as_str).unwrap_or("");

        let mut record = MeetingRecord {
            vendor_id: event_id,
            title: event_name.to_string(),
            start: parse_civic_date(start_time),
            meeting_status: parse_meeting_status(event_name, Some(start_time)),
            ..Default::default()
        };

        if let Some(location) = event.get("eventLocation") {
            let parts: Vec<&str> = ["address1", "address2", "city"]
                .iter()
                .filter_map(|k| location.get(*k).and_then(Value::as_str))
                .filter(|s| !s.is_empty())
                .collect();
            if !parts.is_empty() {
                record.location = Some(parts.join(", "));
            }
        }

        let empty = Vec::new();
        let published = event
            .get("publishedFiles")
            .and_then(Value::as_array)
            .unwrap_or(&empty);

        let has_agenda = event.get("hasAgenda").and_then(Value::as_bool).unwrap_or(false);
        let agenda_id = event.get("agendaId").and_then(Value::as_i64);

        if has_agenda {
            if let Some(agenda_id) = agenda_id {
                record.items = filter_items(self.fetch_meeting_items(agenda_id).await);
            }
        }

        if !record.items.is_empty() {
            let agenda_doc = published
                .iter()
                .find(|doc| doc.get("type").and_then(Value::as_str) == Some("Agenda"));
            record.agenda_url = agenda_doc.and_then(|doc| self.file_stream_url(doc));
        } else {
            let packet = published.iter().find(|doc| {
                matches!(
                    doc.get("type").and_then(Value::as_str),
                    Some("Agenda Packet") | Some("Agenda")
                )
            });
            match packet {
                Some(doc) => record.packet_url = self.file_stream_url(doc),
                None => {
                    tracing::debug!(
                        vendor = "civicclerk",
                        slug = self.core.slug(),
                        event_name,
                        "no packet for meeting"
                    );
                }
            }
        }

        Some(record)
    }

    async fn fetch_meeting_items(&self, agenda_id: i64) -> Vec<ItemRecord> {
        let url = format!("{}/v1/Meetings/{}", self.base_url, agenda_id);
        let data = match self
            .core
            .get_json_with_headers(&url, &self.portal_headers())
            .await
        {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(
                    vendor = "civicclerk",
                    slug = self.core.slug(),
                    agenda_id,
                    error = %e,
                    "failed to fetch meeting items"
                );
                return Vec::new();
            }
        };

        let empty = Vec::new();
        let raw_items = data.get("items").and_then(Value::as_array).unwrap_or(&empty);
        let mut items = Vec::new();
        flatten_items(raw_items, &mut items);
        items
    }
}

/// Recursively collect leaf items, descending through section containers.
fn flatten_items(raw_items: &[Value], out: &mut Vec<ItemRecord>) {
    for item in raw_items {
        let is_section = item.get("isSection").and_then(Value::as_i64).unwrap_or(0) == 1;
        let empty = Vec::new();
        let children = item
            .get("childItems")
            .and_then(Value::as_array)
            .unwrap_or(&empty);

        if !is_section {
            if let Some(processed) = process_item(item) {
                out.push(processed);
            }
        }
        if !children.is_empty() {
            flatten_items(children, out);
        }
    }
}

fn process_item(item: &Value) -> Option<ItemRecord> {
    let vendor_item_id = item.get("id").map(json_id)?;
    let raw_title = item
        .get("agendaObjectItemName")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())?;

    let title = strip_html(raw_title);
    if title.is_empty() {
        return None;
    }

    let matter_file = extract_matter_file(&title);
    let matter_type = matter_file
        .as_deref()
        .and_then(matter_type_from_prefix)
        .map(String::from);

    let sequence = item.get("sortOrder").and_then(Value::as_i64).unwrap_or(0) as i32;

    let mut attachments = Vec::new();
    if let Some(list) = item.get("attachmentsList").and_then(Value::as_array) {
        for att in list {
            let published = att.get("isPublished").and_then(Value::as_bool).unwrap_or(true);
            let deleted = att.get("isDeleted").and_then(Value::as_bool).unwrap_or(false);
            if !published || deleted {
                continue;
            }
            let url = att
                .get("pdfVersionFullPath")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .or_else(|| att.get("mediaFullPath").and_then(Value::as_str))
                .filter(|s| !s.is_empty());
            if let Some(url) = url {
                let name = att
                    .get("fileName")
                    .and_then(Value::as_str)
                    .unwrap_or("Attachment");
                attachments.push(AttachmentRecord::new(name, url));
            }
        }
    }

    Some(ItemRecord {
        vendor_item_id,
        title,
        sequence,
        agenda_number: item
            .get("agendaObjectItemNumber")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from),
        matter_file,
        matter_type,
        attachments,
        ..Default::default()
    })
}

fn strip_html(text: &str) -> String {
    let text = BR_TAG.replace_all(text, " ");
    let text = HTML_TAG.replace_all(&text, "");
    let text = text
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn json_id(value: &Value) -> String {
    match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl VendorAdapter for CivicClerkAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn fetch_meetings_impl(
        &self,
        days_back: i64,
        days_forward: i64,
    ) -> Result<Vec<MeetingRecord>, VendorError> {
        let window = SyncWindow::new(days_back, days_forward);
        let events = self.fetch_all_events(window).await?;
        tracing::info!(
            vendor = "civicclerk",
            slug = self.core.slug(),
            event_count = events.len(),
            "retrieved events from API"
        );

        let mut results = Vec::new();
        for event in &events {
            if let Some(meeting) = self.process_event(event).await {
                results.push(meeting);
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_html_cleans_item_names() {
        assert_eq!(
            strip_html("<p>RES-2025-14 &amp; budget<br/>amendment</p>"),
            "RES-2025-14 & budget amendment"
        );
    }

    #[test]
    fn items_flatten_through_sections() {
        let tree = serde_json::json!([
            {
                "id": 1, "isSection": 1, "agendaObjectItemName": "CONSENT",
                "childItems": [
                    {"id": 2, "isSection": 0, "agendaObjectItemName": "Approve RES-2025-14 fee schedule",
                     "sortOrder": 1, "attachmentsList": [
                        {"isPublished": true, "isDeleted": false,
                         "pdfVersionFullPath": "https://files/x.pdf", "fileName": "Staff Report"},
                        {"isPublished": false, "pdfVersionFullPath": "https://files/hidden.pdf"}
                     ]}
                ]
            },
            {"id": 3, "isSection": 0, "agendaObjectItemName": "<b>Public hearing</b>", "sortOrder": 2}
        ]);
        let mut items = Vec::new();
        flatten_items(tree.as_array().unwrap(), &mut items);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].vendor_item_id, "2");
        assert_eq!(items[0].matter_file.as_deref(), Some("RES-2025-14"));
        assert_eq!(items[0].attachments.len(), 1);
        assert_eq!(items[1].title, "Public hearing");
    }
}
