//! Municode adapter.
//!
//! Meeting list and details come from the public JSON API
//! (`/api/v1/public/meeting/list.json`); each meeting's
//! `OriginMeetingID` GUID keys both the accessible HTML packet
//! (`meetings.municode.com/adaHtmlDocument/index`) and the blob-storage
//! PDF packet. Items parse from the HTML packet.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::adapter::{
    parse_meeting_status, AdapterCore, MeetingRecord, SyncWindow, VendorAdapter,
};
use crate::error::VendorError;
use crate::filters::filter_items;
use crate::parsers::municode::parse_html_agenda;

static CITY_CODE_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[?&]cc=([A-Za-z0-9]+)").expect("static regex"));

pub struct MunicodeAdapter {
    core: AdapterCore,
    base_url: String,
    configured_city_code: Option<String>,
    discovered_city_code: Mutex<Option<String>>,
}

impl MunicodeAdapter {
    pub fn new(core: AdapterCore, city_code: Option<String>) -> Self {
        let base_url = format!("https://{}.municodemeetings.com", core.slug());
        Self {
            core,
            base_url,
            configured_city_code: city_code,
            discovered_city_code: Mutex::new(None),
        }
    }

    async fn city_code(&self) -> String {
        if let Some(code) = &self.configured_city_code {
            return code.clone();
        }
        if let Some(code) = self.discovered_city_code.lock().await.clone() {
            return code;
        }
        // Last resort: the slug with hyphens removed usually matches.
        self.core.slug().replace('-', "")
    }

    async fn try_discover_city_code(&self, meetings: &[Value]) {
        if self.configured_city_code.is_some() {
            return;
        }
        let mut discovered = self.discovered_city_code.lock().await;
        if discovered.is_some() {
            return;
        }
        for meeting in meetings {
            for field in ["HtmlPacketUrl", "AgendaUrl", "PacketUrl"] {
                if let Some(url) = meeting.get(field).and_then(Value::as_str) {
                    if let Some(caps) = CITY_CODE_PARAM.captures(url) {
                        tracing::debug!(
                            vendor = "municode",
                            slug = self.core.slug(),
                            city_code = &caps[1],
                            "discovered city code"
                        );
                        *discovered = Some(caps[1].to_string());
                        return;
                    }
                }
            }
        }
    }

    async fn html_packet_url(&self, guid: &str) -> String {
        format!(
            "https://meetings.municode.com/adaHtmlDocument/index?cc={}&me={}&ip=True",
            self.city_code().await,
            guid
        )
    }

    fn pdf_packet_url(&self, guid: &str) -> String {
        let slug_clean = self.core.slug().replace('-', "");
        format!(
            "https://mccmeetings.blob.core.usgovcloudapi.net/{slug_clean}-pubu/MEET-Packet-{guid}.pdf"
        )
    }

    /// `CalendarDate` arrives as `[year, month, day, hour?, minute?, ...]`.
    fn parse_calendar_date(calendar_date: Option<&Value>) -> Option<chrono::NaiveDateTime> {
        let parts: Vec<i64> = calendar_date?
            .as_array()?
            .iter()
            .filter_map(Value::as_i64)
            .collect();
        if parts.len() < 3 {
            return None;
        }
        let date = chrono::NaiveDate::from_ymd_opt(
            parts[0] as i32,
            parts[1] as u32,
            parts[2] as u32,
        )?;
        date.and_hms_opt(
            parts.get(3).copied().unwrap_or(0) as u32,
            parts.get(4).copied().unwrap_or(0) as u32,
            parts.get(5).copied().unwrap_or(0) as u32,
        )
    }

    async fn process_meeting(&self, meeting: &Value) -> Option<MeetingRecord> {
        let meeting_id = meeting.get("MeetingID").map(|v| v.to_string())?;
        let title = meeting.get("Title").and_then(Value::as_str).unwrap_or("");
        let group_name = meeting.get("GroupName").and_then(Value::as_str).unwrap_or("");

        let Some(start) = Self::parse_calendar_date(meeting.get("CalendarDate")) else {
            tracing::warn!(
                vendor = "municode",
                slug = self.core.slug(),
                meeting_id = %meeting_id,
                "meeting has no valid date"
            );
            return None;
        };

        let full_title = match (group_name.is_empty(), title.is_empty()) {
            (false, false) => format!("{group_name} - {title}"),
            (false, true) => group_name.to_string(),
            _ => title.to_string(),
        };

        let mut record = MeetingRecord {
            vendor_id: meeting_id,
            meeting_status: parse_meeting_status(&full_title, None),
            title: full_title.clone(),
            start: Some(start),
            ..Default::default()
        };

        let guid = meeting
            .get("OriginMeetingID")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(|s| s.replace('-', ""));

        if let Some(guid) = guid {
            let html_url = self.html_packet_url(&guid).await;
            record.agenda_url = Some(html_url.clone());
            record.packet_url = Some(self.pdf_packet_url(&guid));

            match self.core.get_text(&html_url).await {
                Ok(html) => {
                    let items = filter_items(parse_html_agenda(&html, &html_url));
                    if !items.is_empty() {
                        tracing::info!(
                            vendor = "municode",
                            slug = self.core.slug(),
                            count = items.len(),
                            "found agenda items"
                        );
                        record.items = items;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        vendor = "municode",
                        slug = self.core.slug(),
                        error = %e,
                        "failed to fetch HTML agenda"
                    );
                }
            }
        } else {
            tracing::debug!(vendor = "municode", slug = self.core.slug(), "meeting has no GUID");
        }

        Some(record)
    }
}

#[async_trait]
impl VendorAdapter for MunicodeAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn fetch_meetings_impl(
        &self,
        days_back: i64,
        days_forward: i64,
    ) -> Result<Vec<MeetingRecord>, VendorError> {
        let window = SyncWindow::new(days_back, days_forward);

        let url = format!("{}/api/v1/public/meeting/list.json", self.base_url);
        let query = vec![
            ("datefrom", window.start.format("%Y-%m-%d").to_string()),
            ("dateto", window.end.format("%Y-%m-%d").to_string()),
        ];
        let data = self.core.get_json_with_query(&url, &query).await?;

        let empty = Vec::new();
        let listings = data.get("Meetings").and_then(Value::as_array).unwrap_or(&empty);
        tracing::info!(
            vendor = "municode",
            slug = self.core.slug(),
            count = listings.len(),
            "municode meetings retrieved"
        );

        self.try_discover_city_code(listings).await;

        let mut results = Vec::new();
        for meeting in listings {
            if let Some(record) = self.process_meeting(meeting).await {
                results.push(record);
            }
        }

        tracing::info!(
            vendor = "municode",
            slug = self.core.slug(),
            processed = results.len(),
            total = listings.len(),
            "municode meetings processed"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calendar_date_array_parses() {
        let value = serde_json::json!([2026, 2, 24, 18, 30]);
        let dt = MunicodeAdapter::parse_calendar_date(Some(&value)).unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M").to_string(), "2026-02-24 18:30");

        let date_only = serde_json::json!([2026, 2, 24]);
        let dt = MunicodeAdapter::parse_calendar_date(Some(&date_only)).unwrap();
        assert_eq!(dt.format("%H:%M").to_string(), "00:00");

        assert!(MunicodeAdapter::parse_calendar_date(Some(&serde_json::json!([2026]))).is_none());
        assert!(MunicodeAdapter::parse_calendar_date(None).is_none());
    }
}
