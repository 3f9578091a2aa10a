//! PrimeGov adapter.
//!
//! API-first: `api/v2/PublicPortal/ListUpcomingMeetings` plus the archived
//! listing per year, merged and deduplicated. Meetings whose document list
//! carries an HTML Agenda template get item-level extraction from
//! `Portal/Meeting`; PDF-only templates get a compiled-packet URL.

use async_trait::async_trait;
use chrono::Datelike;
use serde_json::Value;

use crate::adapter::{
    parse_meeting_status, AdapterCore, MeetingRecord, SyncWindow, VendorAdapter,
};
use crate::dates::parse_civic_date;
use crate::error::VendorError;
use crate::filters::filter_items;
use crate::parsers::primegov::parse_html_agenda;

pub struct PrimeGovAdapter {
    core: AdapterCore,
    base_url: String,
}

impl PrimeGovAdapter {
    pub fn new(core: AdapterCore) -> Self {
        let base_url = format!("https://{}.primegov.com", core.slug());
        Self::with_base_url(core, base_url)
    }

    /// Construct against a specific portal base URL (tests, proxies).
    pub fn with_base_url(core: AdapterCore, base_url: String) -> Self {
        Self { core, base_url }
    }

    async fn fetch_listing(&self, url: &str) -> Vec<Value> {
        match self.core.get_json(url).await {
            Ok(Value::Array(meetings)) => meetings,
            Ok(other) => {
                tracing::error!(
                    vendor = "primegov",
                    slug = self.core.slug(),
                    got = other.to_string().chars().take(80).collect::<String>(),
                    "unexpected listing shape"
                );
                Vec::new()
            }
            Err(e) => {
                tracing::error!(
                    vendor = "primegov",
                    slug = self.core.slug(),
                    error = %e,
                    "failed to fetch meeting listing"
                );
                Vec::new()
            }
        }
    }

    fn packet_url(&self, doc: &Value) -> Option<String> {
        let template_id = doc.get("templateId").and_then(Value::as_i64)?;
        let output_type = doc
            .get("compileOutputType")
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| "pdf".to_string());
        Some(format!(
            "{}/Public/CompiledDocument?meetingTemplateId={}&compileOutputType={}",
            self.base_url,
            template_id,
            urlencoding::encode(&output_type)
        ))
    }

    async fn process_meeting(&self, meeting: &Value) -> Option<MeetingRecord> {
        let title = meeting.get("title").and_then(Value::as_str).unwrap_or("");
        // SAP broadcasts duplicate the English-language meeting.
        if title.contains(" - SAP") {
            tracing::debug!(slug = self.core.slug(), title, "skipping SAP broadcast");
            return None;
        }

        let vendor_id = match meeting.get("id") {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.clone(),
            _ => return None,
        };
        let date_time = meeting.get("dateTime").and_then(Value::as_str).unwrap_or("");

        let mut status = parse_meeting_status(title, Some(date_time));
        // meetingState 3 is cancelled/recess in the portal model.
        if status.is_none() && meeting.get("meetingState").and_then(Value::as_i64) == Some(3) {
            status = Some(db::models::MeetingStatus::Cancelled);
        }

        let empty = Vec::new();
        let documents = meeting
            .get("documentList")
            .and_then(Value::as_array)
            .unwrap_or(&empty);

        if status.is_none() {
            let cancelled_doc = documents.iter().any(|doc| {
                let name = doc
                    .get("templateName")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_lowercase();
                name.contains("cancel") || name.contains("recess")
            });
            if cancelled_doc {
                status = Some(db::models::MeetingStatus::Cancelled);
            }
        }

        let agenda_doc = documents.iter().find(|doc| {
            let name = doc.get("templateName").and_then(Value::as_str).unwrap_or("");
            name.contains("HTML Agenda")
                || name.to_lowercase().contains("packet")
                || name.to_lowercase().contains("agenda")
        });

        let mut record = MeetingRecord {
            vendor_id,
            title: title.to_string(),
            start: parse_civic_date(date_time),
            meeting_status: status,
            ..Default::default()
        };

        match agenda_doc {
            Some(doc) => {
                let template_name = doc.get("templateName").and_then(Value::as_str).unwrap_or("");
                if template_name.contains("HTML Agenda") {
                    if let Some(template_id) = doc.get("templateId").and_then(Value::as_i64) {
                        let html_url =
                            format!("{}/Portal/Meeting?meetingTemplateId={}", self.base_url, template_id);
                        record.agenda_url = Some(html_url.clone());

                        match self.core.get_text(&html_url).await {
                            Ok(html) => {
                                let parsed = parse_html_agenda(&html, &self.base_url);
                                record.items = filter_items(parsed.items);
                                record.participation = parsed.participation;
                                tracing::info!(
                                    slug = self.core.slug(),
                                    title,
                                    count = record.items.len(),
                                    "found agenda items"
                                );
                            }
                            Err(e) => {
                                tracing::warn!(
                                    vendor = "primegov",
                                    slug = self.core.slug(),
                                    title,
                                    error = %e,
                                    "failed to fetch HTML agenda items"
                                );
                            }
                        }
                    }
                } else if let Some(packet_url) = self.packet_url(doc) {
                    tracing::info!(slug = self.core.slug(), title, packet_url, "found PDF packet");
                    record.packet_url = Some(packet_url);
                }
            }
            None => {
                tracing::warn!(
                    slug = self.core.slug(),
                    title,
                    doc_count = documents.len(),
                    "no agenda or packet found"
                );
            }
        }

        Some(record)
    }
}

#[async_trait]
impl VendorAdapter for PrimeGovAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn fetch_meetings_impl(
        &self,
        days_back: i64,
        days_forward: i64,
    ) -> Result<Vec<MeetingRecord>, VendorError> {
        let window = SyncWindow::new(days_back, days_forward);

        let upcoming = self
            .fetch_listing(&format!(
                "{}/api/v2/PublicPortal/ListUpcomingMeetings",
                self.base_url
            ))
            .await;

        // Archived listings are per-year; a window spanning New Year needs
        // both years.
        let mut archived = Vec::new();
        let mut years: Vec<i32> = vec![window.start.year(), window.end.year()];
        years.dedup();
        for year in years {
            let url = format!(
                "{}/api/v2/PublicPortal/ListArchivedMeetings?year={}",
                self.base_url, year
            );
            archived.extend(self.fetch_listing(&url).await);
        }

        let mut seen_ids = std::collections::HashSet::new();
        let mut in_range = Vec::new();
        for meeting in upcoming.into_iter().chain(archived) {
            let id = meeting.get("id").map(|v| v.to_string()).unwrap_or_default();
            if id.is_empty() || !seen_ids.insert(id) {
                continue;
            }

            let date_str = meeting.get("dateTime").and_then(Value::as_str).unwrap_or("");
            if date_str.is_empty() {
                continue;
            }
            // Unparseable dates are kept; validation decides later.
            match parse_civic_date(date_str) {
                Some(date) if !window.contains(date) => continue,
                _ => in_range.push(meeting),
            }
        }

        tracing::info!(
            slug = self.core.slug(),
            count = in_range.len(),
            "primegov meetings filtered to date range"
        );

        let mut records = Vec::new();
        for meeting in &in_range {
            if let Some(record) = self.process_meeting(meeting).await {
                records.push(record);
            }
        }
        Ok(records)
    }
}
