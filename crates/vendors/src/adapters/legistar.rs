//! Legistar adapter.
//!
//! API-first against `webapi.legistar.com`, falling back to the HTML
//! calendar when the API is closed off (400/403/404) or returns nothing.
//! Item attachments are enriched from `LegislationDetail.aspx` pages,
//! fetched concurrently under a small semaphore.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::adapter::{AdapterCore, ItemRecord, MeetingRecord, SyncWindow, VendorAdapter};
use crate::dates::combine_date_time;
use crate::error::VendorError;
use crate::filters::should_skip_item;
use crate::parsers::legistar::{
    find_agenda_pdf_link, parse_calendar_listing, parse_legislation_attachments,
};

const DETAIL_CONCURRENCY: usize = 5;

static MEETING_ID_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[?&]ID=(\d+)").expect("static regex"));

pub struct LegistarAdapter {
    core: AdapterCore,
    api_base: String,
    web_base: String,
    api_token: Option<String>,
}

impl LegistarAdapter {
    pub fn new(core: AdapterCore, api_token: Option<String>) -> Self {
        let api_base = format!("https://webapi.legistar.com/v1/{}", core.slug());
        let web_base = format!("https://{}.legistar.com", core.slug());
        Self::with_bases(core, api_base, web_base, api_token)
    }

    /// Construct against specific API and web bases (tests, proxies).
    pub fn with_bases(
        core: AdapterCore,
        api_base: String,
        web_base: String,
        api_token: Option<String>,
    ) -> Self {
        Self {
            core,
            api_base,
            web_base,
            api_token,
        }
    }

    fn token_query(&self) -> Vec<(&'static str, String)> {
        self.api_token
            .as_ref()
            .map(|t| vec![("token", t.clone())])
            .unwrap_or_default()
    }

    async fn fetch_meetings_api(
        &self,
        window: SyncWindow,
    ) -> Result<Vec<MeetingRecord>, VendorError> {
        let filter = format!(
            "EventDate ge datetime'{}' and EventDate lt datetime'{}'",
            window.start.format("%Y-%m-%d"),
            window.end.format("%Y-%m-%d")
        );
        let mut query = vec![
            ("$filter", filter),
            ("$orderby", "EventDate asc".to_string()),
        ];
        query.extend(self.token_query());

        let url = format!("{}/Events", self.api_base);
        let events = self.core.get_json_with_query(&url, &query).await?;
        let Value::Array(events) = events else {
            return Err(VendorError::parse(
                self.core.vendor(),
                self.core.slug(),
                "Events response is not an array",
                &events.to_string(),
            ));
        };

        let mut meetings = Vec::new();
        for event in &events {
            if let Some(meeting) = self.process_api_event(event).await {
                meetings.push(meeting);
            }
        }
        Ok(meetings)
    }

    async fn process_api_event(&self, event: &Value) -> Option<MeetingRecord> {
        let event_id = match event.get("EventId") {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            _ => return None,
        };

        let start = event
            .get("EventDate")
            .and_then(Value::as_str)
            .and_then(|date| {
                combine_date_time(date, event.get("EventTime").and_then(Value::as_str))
            });

        let title = event
            .get("EventBodyName")
            .and_then(Value::as_str)
            .unwrap_or("Unknown Body")
            .to_string();

        let items = self.fetch_event_items(&event_id).await;

        let mut agenda_url = event
            .get("EventAgendaFile")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from);
        let minutes_file = event
            .get("EventMinutesFile")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from);

        // The API often omits document URLs; the meeting detail page has
        // a plain agenda PDF link.
        if agenda_url.is_none() {
            if let Some(guid) = event.get("EventGuid").and_then(Value::as_str) {
                let detail_url = format!("{}/MeetingDetail.aspx?GUID={}", self.web_base, guid);
                if let Ok(html) = self.core.get_text(&detail_url).await {
                    agenda_url = find_agenda_pdf_link(&html, &self.web_base);
                }
            }
        }

        let mut record = MeetingRecord {
            vendor_id: event_id,
            title,
            start,
            ..Default::default()
        };

        if !items.is_empty() {
            record.items = items;
            record.agenda_url = agenda_url;
        } else if agenda_url.is_some() || minutes_file.is_some() {
            record.packet_url = agenda_url.or(minutes_file);
        }

        Some(record)
    }

    async fn fetch_event_items(&self, event_id: &str) -> Vec<ItemRecord> {
        let url = format!("{}/Events/{}/EventItems", self.api_base, event_id);
        let query = self.token_query();

        let event_items = match self.core.get_json_with_query(&url, &query).await {
            Ok(Value::Array(items)) => items,
            Ok(_) | Err(_) => {
                tracing::debug!(event_id, "failed to fetch event items from API");
                return Vec::new();
            }
        };

        let mut items: Vec<ItemRecord> = event_items
            .iter()
            .filter_map(process_api_item)
            .filter(|item| item.has_matter_reference() || !should_skip_item(&item.title, ""))
            .collect();

        self.enrich_attachments(&mut items).await;
        items
    }

    /// Fill in attachments from each matter's LegislationDetail page,
    /// concurrently but bounded.
    async fn enrich_attachments(&self, items: &mut [ItemRecord]) {
        let semaphore = Arc::new(Semaphore::new(DETAIL_CONCURRENCY));
        let mut join_set = tokio::task::JoinSet::new();

        for (index, item) in items.iter().enumerate() {
            let Some(matter_id) = item.matter_id.clone() else { continue };
            if !item.attachments.is_empty() {
                continue;
            }
            let core = self.core.clone();
            let web_base = self.web_base.clone();
            let semaphore = semaphore.clone();

            join_set.spawn(async move {
                let _permit = semaphore.acquire().await.ok()?;
                let url = format!("{web_base}/LegislationDetail.aspx?ID={matter_id}");
                let html = core.get_text(&url).await.ok()?;
                Some((index, parse_legislation_attachments(&html, &web_base)))
            });
        }

        while let Some(result) = join_set.join_next().await {
            if let Ok(Some((index, attachments))) = result {
                if let Some(item) = items.get_mut(index) {
                    item.attachments = attachments;
                }
            }
        }
    }

    async fn fetch_meetings_html(
        &self,
        window: SyncWindow,
    ) -> Result<Vec<MeetingRecord>, VendorError> {
        let calendar_url = format!("{}/Calendar.aspx", self.web_base);
        let html = self.core.get_text(&calendar_url).await?;
        let rows = parse_calendar_listing(&html, &self.web_base);

        let meetings = rows
            .into_iter()
            .filter(|row| row.start.map(|s| window.contains(s)).unwrap_or(false))
            .map(|row| {
                let vendor_id = row
                    .detail_url
                    .as_deref()
                    .and_then(|url| MEETING_ID_PARAM.captures(url).map(|c| c[1].to_string()))
                    .unwrap_or_else(|| {
                        self.core.fallback_vendor_id(&row.body_name, row.start, None)
                    });
                MeetingRecord {
                    vendor_id,
                    title: row.body_name,
                    start: row.start,
                    packet_url: row.agenda_url,
                    ..Default::default()
                }
            })
            .collect();
        Ok(meetings)
    }
}

fn process_api_item(item_data: &Value) -> Option<ItemRecord> {
    let vendor_item_id = match item_data.get("EventItemId") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => return None,
    };

    let matter_id = match item_data.get("EventItemMatterId") {
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    };
    let matter_file = item_data
        .get("EventItemMatterFile")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from);
    let matter_type = item_data
        .get("EventItemMatterType")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from);

    let title = item_data
        .get("EventItemTitle")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .or_else(|| item_data.get("EventItemMatterName").and_then(Value::as_str))
        .unwrap_or("Untitled Item")
        .to_string();

    let sequence = item_data
        .get("EventItemAgendaSequence")
        .and_then(Value::as_i64)
        .unwrap_or(0) as i32;

    let agenda_number = item_data
        .get("EventItemAgendaNumber")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from);

    let mut attachments = Vec::new();
    if let Some(url) = item_data
        .get("EventItemMatterAttachmentHyperlink")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
    {
        let label = matter_file.clone().unwrap_or_else(|| vendor_item_id.clone());
        attachments.push(crate::adapter::AttachmentRecord::new(
            format!("{label} Attachment"),
            url,
        ));
    }

    Some(ItemRecord {
        vendor_item_id,
        title,
        sequence,
        agenda_number,
        matter_id,
        matter_file,
        matter_type,
        attachments,
        ..Default::default()
    })
}

#[async_trait]
impl VendorAdapter for LegistarAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn fetch_meetings_impl(
        &self,
        days_back: i64,
        days_forward: i64,
    ) -> Result<Vec<MeetingRecord>, VendorError> {
        let window = SyncWindow::new(days_back, days_forward);

        let meetings = match self.fetch_meetings_api(window).await {
            Ok(meetings) => meetings,
            Err(e) if matches!(e.status(), Some(400 | 403 | 404)) => {
                tracing::warn!(
                    slug = self.core.slug(),
                    status = e.status(),
                    "legistar API failed, falling back to HTML"
                );
                return self.fetch_meetings_html(window).await;
            }
            Err(e) => return Err(e),
        };

        if meetings.is_empty() {
            tracing::warn!(
                slug = self.core.slug(),
                "legistar API returned 0 events, falling back to HTML"
            );
            return self.fetch_meetings_html(window).await;
        }

        tracing::info!(slug = self.core.slug(), count = meetings.len(), "legistar API success");
        Ok(meetings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_item_extraction_maps_matter_fields() {
        let data = serde_json::json!({
            "EventItemId": 71001,
            "EventItemTitle": "CB 120000 - Land use omnibus",
            "EventItemMatterId": 4455,
            "EventItemMatterFile": "CB 120000",
            "EventItemMatterType": "Council Bill",
            "EventItemAgendaSequence": 3,
            "EventItemMatterAttachmentHyperlink": "https://seattle.legistar.com/View.ashx?ID=1"
        });
        let item = process_api_item(&data).unwrap();
        assert_eq!(item.vendor_item_id, "71001");
        assert_eq!(item.matter_id.as_deref(), Some("4455"));
        assert_eq!(item.matter_file.as_deref(), Some("CB 120000"));
        assert_eq!(item.sequence, 3);
        assert_eq!(item.attachments.len(), 1);
    }

    #[test]
    fn items_without_event_id_are_dropped() {
        assert!(process_api_item(&serde_json::json!({"EventItemTitle": "x"})).is_none());
    }
}
