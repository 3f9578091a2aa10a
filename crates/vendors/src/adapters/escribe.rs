//! Escribe adapter.
//!
//! Calendar data comes from a JSON POST to
//! `MeetingsCalendarView.aspx/GetCalendarMeetings` (ASP.NET `{"d": [...]}`
//! envelope, `/Date(ms)/` timestamps). Meetings with agendas get item
//! extraction from the merged agenda view, where attachments are
//! `FileStream.ashx` links.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

use crate::adapter::{
    parse_meeting_status, AdapterCore, AttachmentRecord, ItemRecord, MeetingRecord, SyncWindow,
    VendorAdapter,
};
use crate::error::VendorError;
use crate::filters::filter_items;
use crate::matter_files::extract_matter_file;
use crate::parsers::{absolutize, text_of};

static DOTNET_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/Date\((\d+)\)/").expect("static regex"));
static MEETING_UUID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Id=([a-f0-9-]+)").expect("static regex"));
static ITEM_ID_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)").expect("static regex"));

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

struct CalendarMeeting {
    vendor_id: String,
    title: String,
    start: Option<chrono::NaiveDateTime>,
    packet_url: Option<String>,
    uuid: Option<String>,
    has_agenda: bool,
}

pub struct EscribeAdapter {
    core: AdapterCore,
    base_url: String,
}

impl EscribeAdapter {
    pub fn new(core: AdapterCore) -> Self {
        let base_url = format!("https://{}.escribemeetings.com", core.slug());
        Self { core, base_url }
    }

    fn parse_calendar_meeting(&self, meeting: &Value) -> Option<CalendarMeeting> {
        meeting.get("ID")?;
        let title = meeting
            .get("MeetingName")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        let start = meeting
            .get("StartDate")
            .and_then(Value::as_str)
            .and_then(|raw| DOTNET_DATE.captures(raw))
            .and_then(|caps| caps[1].parse::<i64>().ok())
            .and_then(|ms| chrono::DateTime::from_timestamp_millis(ms))
            .map(|dt| dt.naive_utc());

        let uuid = meeting
            .get("Url")
            .and_then(Value::as_str)
            .and_then(|url| MEETING_UUID.captures(url))
            .map(|caps| caps[1].to_string());

        let vendor_id = match &uuid {
            Some(uuid) => format!("escribe_{uuid}"),
            None => self.core.fallback_vendor_id(&title, start, None),
        };

        Some(CalendarMeeting {
            vendor_id,
            title,
            start,
            packet_url: meeting
                .get("MeetingDocumentLink")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from),
            uuid,
            has_agenda: meeting.get("HasAgenda").and_then(Value::as_bool).unwrap_or(false),
        })
    }

    /// Parse the merged agenda view: one `AgendaItemContainer` per item.
    fn parse_merged_agenda(&self, html: &str, base_url: &str) -> Vec<ItemRecord> {
        let document = Html::parse_document(html);
        let container_sel = sel("div.AgendaItemContainer");
        let counter_sel = sel("div.AgendaItemCounter");
        let title_sel = sel("div.AgendaItemTitle, a.AgendaItemTitleLink, h2");
        let content_sel = sel("div.AgendaItemContentRow");
        let link_sel = sel("a[href]");

        let mut items = Vec::new();
        let mut sequence = 0;

        for container in document.select(&container_sel) {
            let title = container
                .select(&title_sel)
                .next()
                .map(|t| text_of(&t))
                .unwrap_or_default();
            if title.is_empty() {
                continue;
            }

            let item_id = container
                .value()
                .attr("id")
                .and_then(|id| ITEM_ID_ATTR.captures(id))
                .map(|caps| caps[1].to_string());

            sequence += 1;
            let agenda_number = container
                .select(&counter_sel)
                .next()
                .map(|c| text_of(&c))
                .filter(|c| !c.is_empty());

            let description = container
                .select(&content_sel)
                .next()
                .map(|c| text_of(&c))
                .filter(|d| !d.is_empty());

            let mut attachments = Vec::new();
            for link in container.select(&link_sel) {
                let href = link.value().attr("href").unwrap_or("");
                if !href.contains("FileStream.ashx") {
                    continue;
                }
                let name = {
                    let text = text_of(&link);
                    if text.is_empty() {
                        format!("Attachment {sequence}")
                    } else {
                        text
                    }
                };
                attachments.push(AttachmentRecord::new(name, absolutize(base_url, href)));
            }

            items.push(ItemRecord {
                vendor_item_id: item_id
                    .map(|id| format!("escribe_{id}"))
                    .unwrap_or_else(|| format!("escribe_seq_{sequence}")),
                title: title.clone(),
                sequence,
                agenda_number,
                matter_file: extract_matter_file(&title),
                description,
                attachments,
                ..Default::default()
            });
        }

        items
    }
}

#[async_trait]
impl VendorAdapter for EscribeAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn fetch_meetings_impl(
        &self,
        days_back: i64,
        days_forward: i64,
    ) -> Result<Vec<MeetingRecord>, VendorError> {
        let window = SyncWindow::new(days_back, days_forward);
        let calendar_url = format!("{}/MeetingsCalendarView.aspx/GetCalendarMeetings", self.base_url);

        let payload = serde_json::json!({
            "calendarStartDate": window.start.format("%Y-%m-%d").to_string(),
            "calendarEndDate": window.end.format("%Y-%m-%d").to_string(),
        });

        let data = self.core.post_json(&calendar_url, &payload).await?;
        let empty = Vec::new();
        let meetings_data = data.get("d").and_then(Value::as_array).unwrap_or(&empty);
        if meetings_data.is_empty() {
            tracing::warn!(vendor = "escribe", slug = self.core.slug(), "no meetings from calendar API");
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        for meeting_json in meetings_data {
            let Some(basic) = self.parse_calendar_meeting(meeting_json) else {
                continue;
            };

            let mut record = MeetingRecord {
                vendor_id: basic.vendor_id,
                title: basic.title.clone(),
                start: basic.start,
                packet_url: basic.packet_url,
                meeting_status: parse_meeting_status(&basic.title, None),
                ..Default::default()
            };

            if let (Some(uuid), true) = (&basic.uuid, basic.has_agenda) {
                let merged_url = format!(
                    "{}/Meeting.aspx?Id={}&Agenda=Merged&lang=English",
                    self.base_url, uuid
                );
                match self.core.get_text(&merged_url).await {
                    Ok(html) => {
                        record.items = filter_items(self.parse_merged_agenda(&html, &merged_url));
                        record.agenda_url = Some(merged_url);
                        tracing::info!(
                            vendor = "escribe",
                            slug = self.core.slug(),
                            meeting_uuid = %uuid,
                            item_count = record.items.len(),
                            "extracted items from meeting"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            vendor = "escribe",
                            slug = self.core.slug(),
                            error = %e,
                            "failed to fetch merged agenda"
                        );
                    }
                }
            }

            results.push(record);
        }

        tracing::info!(
            vendor = "escribe",
            slug = self.core.slug(),
            count = results.len(),
            "collected meetings with items"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionPool;
    use common::Vendor;

    fn adapter() -> EscribeAdapter {
        let core = AdapterCore::new(
            Vendor::Escribe,
            "pickering",
            std::sync::Arc::new(SessionPool::new()),
        )
        .unwrap();
        EscribeAdapter::new(core)
    }

    #[test]
    fn dotnet_dates_parse_to_naive_datetimes() {
        let meeting = serde_json::json!({
            "ID": 12, "MeetingName": "Council",
            "StartDate": "/Date(1733763600000)/",
            "Url": "Meeting.aspx?Id=ab12cd34-5678-90ef-ab12-cd34567890ef",
            "HasAgenda": true
        });
        let parsed = adapter().parse_calendar_meeting(&meeting).unwrap();
        assert!(parsed.vendor_id.starts_with("escribe_ab12cd34"));
        assert!(parsed.has_agenda);
        assert_eq!(parsed.start.unwrap().format("%Y").to_string(), "2024");
    }

    #[test]
    fn merged_agenda_items_and_filestream_attachments() {
        let html = r#"
            <div class="AgendaItemContainer" id="AgendaItem4411">
              <div class="AgendaItemCounter">4.1</div>
              <div class="AgendaItemTitle">Adopt RES-2025-01 road levy</div>
              <div class="AgendaItemContentRow">Report from the treasurer.</div>
              <a href="/FileStream.ashx?DocumentId=991">Report.pdf</a>
            </div>
            <div class="AgendaItemContainer"><div class="AgendaItemTitle"></div></div>
        "#;
        let items = adapter().parse_merged_agenda(html, "https://pickering.escribemeetings.com/Meeting.aspx");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].vendor_item_id, "escribe_4411");
        assert_eq!(items[0].agenda_number.as_deref(), Some("4.1"));
        assert_eq!(items[0].matter_file.as_deref(), Some("RES-2025-01"));
        assert_eq!(items[0].attachments.len(), 1);
        assert!(items[0].attachments[0].url.contains("FileStream.ashx"));
    }
}
