//! Adapter framework: normalized DTOs, shared HTTP/parsing core, and the
//! vendor adapter trait.
//!
//! Contract: configuration errors surface at construction, runtime errors
//! turn into an empty meeting list from [`VendorAdapter::fetch_meetings`].

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDateTime};
use common::Vendor;
use db::models::{AttachmentType, MeetingStatus, ParticipationInfo};
use serde_json::Value;

use crate::error::VendorError;
use crate::session::SessionPool;

/// A document attached to an agenda item, as extracted from the vendor.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentRecord {
    pub name: String,
    pub url: String,
    pub attachment_type: AttachmentType,
}

impl AttachmentRecord {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        let attachment_type = AttachmentType::from_url(&url);
        Self {
            name: name.into(),
            url,
            attachment_type,
        }
    }
}

/// One agenda item in vendor-normalized form.
#[derive(Debug, Clone, Default)]
pub struct ItemRecord {
    pub vendor_item_id: String,
    pub title: String,
    /// 1-based agenda position.
    pub sequence: i32,
    pub agenda_number: Option<String>,
    pub matter_file: Option<String>,
    pub matter_id: Option<String>,
    pub matter_type: Option<String>,
    pub sponsors: Vec<String>,
    pub attachments: Vec<AttachmentRecord>,
    /// Longer descriptive text when the vendor distinguishes it from the
    /// title.
    pub description: Option<String>,
    /// Agenda section heading the item appeared under.
    pub section: Option<String>,
    /// Vote result when the vendor publishes one inline.
    pub vote_outcome: Option<String>,
    pub vote_tally: Option<Value>,
}

impl ItemRecord {
    pub fn has_matter_reference(&self) -> bool {
        self.matter_id.is_some() || self.matter_file.is_some()
    }
}

/// One meeting in vendor-normalized form. This is the only shape the rest
/// of the pipeline ever sees.
#[derive(Debug, Clone, Default)]
pub struct MeetingRecord {
    pub vendor_id: String,
    pub title: String,
    /// Local civic wall-clock time. `None` fails validation.
    pub start: Option<NaiveDateTime>,
    pub agenda_url: Option<String>,
    pub packet_url: Option<String>,
    pub meeting_status: Option<MeetingStatus>,
    pub location: Option<String>,
    pub participation: Option<ParticipationInfo>,
    pub committee_name: Option<String>,
    pub items: Vec<ItemRecord>,
}

/// Inclusive sync window around now, in local civic time.
#[derive(Debug, Clone, Copy)]
pub struct SyncWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl SyncWindow {
    pub fn new(days_back: i64, days_forward: i64) -> Self {
        let now = Local::now().naive_local();
        Self {
            start: now - Duration::days(days_back),
            end: now + Duration::days(days_forward),
        }
    }

    pub fn contains(&self, date: NaiveDateTime) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Shared HTTP and parsing helpers, composed into every adapter.
#[derive(Clone)]
pub struct AdapterCore {
    vendor: Vendor,
    slug: String,
    sessions: Arc<SessionPool>,
}

impl AdapterCore {
    pub fn new(
        vendor: Vendor,
        city_slug: impl Into<String>,
        sessions: Arc<SessionPool>,
    ) -> Result<Self, VendorError> {
        let slug = city_slug.into();
        if slug.trim().is_empty() {
            return Err(VendorError::config(vendor, "city_slug required"));
        }
        tracing::info!(vendor = %vendor, city_slug = %slug, "initialized adapter");
        Ok(Self {
            vendor,
            slug,
            sessions,
        })
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    async fn request(
        &self,
        method: reqwest::Method,
        url: &str,
        query: Option<&[(&str, String)]>,
        form: Option<&[(&str, String)]>,
        json: Option<&Value>,
        headers: Option<&[(&str, String)]>,
    ) -> Result<reqwest::Response, VendorError> {
        let client = self.sessions.get(self.vendor)?;

        let mut request = client.request(method, url);
        // The Legistar web API answers XML unless asked for JSON.
        if url.contains("webapi.legistar.com") {
            request = request.header(
                reqwest::header::ACCEPT,
                "application/json, application/xml;q=0.9, */*;q=0.8",
            );
        }
        if let Some(query) = query {
            request = request.query(query);
        }
        if let Some(form) = form {
            request = request.form(form);
        }
        if let Some(json) = json {
            request = request.json(json);
        }
        if let Some(headers) = headers {
            for (name, value) in headers {
                request = request.header(*name, value);
            }
        }

        let started = Instant::now();
        tracing::debug!(
            vendor = %self.vendor,
            slug = %self.slug,
            url = truncate(url, 100),
            "vendor request"
        );

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let duration = started.elapsed();
                let kind = if e.is_timeout() { "timeout" } else { "error" };
                metrics::counter!(
                    "vendor_requests_total", 1,
                    "vendor" => self.vendor.as_str(), "status" => kind
                );
                tracing::error!(
                    vendor = %self.vendor,
                    slug = %self.slug,
                    url = truncate(url, 100),
                    error = %e,
                    duration_secs = duration.as_secs_f64(),
                    "vendor request failed"
                );
                let message = if e.is_timeout() {
                    format!("request timeout after {:.1}s", duration.as_secs_f64())
                } else {
                    format!("request failed: {e}")
                };
                return Err(VendorError::http(
                    self.vendor,
                    &self.slug,
                    url,
                    e.status().map(|s| s.as_u16()),
                    message,
                ));
            }
        };

        let duration = started.elapsed();
        let status = response.status();

        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            metrics::counter!(
                "vendor_requests_total", 1,
                "vendor" => self.vendor.as_str(),
                "status" => format!("http_{}", status.as_u16())
            );
            tracing::error!(
                vendor = %self.vendor,
                slug = %self.slug,
                status_code = status.as_u16(),
                url = truncate(url, 100),
                body_preview = truncate(&body, 500),
                "vendor http error"
            );
            return Err(VendorError::http(
                self.vendor,
                &self.slug,
                url,
                Some(status.as_u16()),
                format!("HTTP {} error", status.as_u16()),
            ));
        }

        metrics::counter!(
            "vendor_requests_total", 1,
            "vendor" => self.vendor.as_str(), "status" => "success"
        );
        metrics::histogram!(
            "vendor_request_duration_seconds", duration.as_secs_f64(),
            "vendor" => self.vendor.as_str()
        );

        Ok(response)
    }

    /// GET. Raises [`VendorError::Http`] on failure.
    pub async fn get(&self, url: &str) -> Result<reqwest::Response, VendorError> {
        self.request(reqwest::Method::GET, url, None, None, None, None).await
    }

    pub async fn get_with_query(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, VendorError> {
        self.request(reqwest::Method::GET, url, Some(query), None, None, None)
            .await
    }

    /// POST with form data.
    pub async fn post_form(
        &self,
        url: &str,
        form: &[(&str, String)],
    ) -> Result<reqwest::Response, VendorError> {
        self.request(reqwest::Method::POST, url, None, Some(form), None, None)
            .await
    }

    /// POST a JSON body and parse the JSON response.
    pub async fn post_json(&self, url: &str, body: &Value) -> Result<Value, VendorError> {
        let response = self
            .request(reqwest::Method::POST, url, None, None, Some(body), None)
            .await?;
        self.read_json(url, response).await
    }

    /// GET with extra request headers, parsing the JSON response.
    pub async fn get_json_with_headers(
        &self,
        url: &str,
        headers: &[(&str, String)],
    ) -> Result<Value, VendorError> {
        let response = self
            .request(reqwest::Method::GET, url, None, None, None, Some(headers))
            .await?;
        self.read_json(url, response).await
    }

    /// GET and read the body as text.
    pub async fn get_text(&self, url: &str) -> Result<String, VendorError> {
        let response = self.get(url).await?;
        response.text().await.map_err(|e| {
            VendorError::http(self.vendor, &self.slug, url, None, format!("body read failed: {e}"))
        })
    }

    /// GET and parse the body as JSON.
    pub async fn get_json(&self, url: &str) -> Result<Value, VendorError> {
        self.get_json_with_query(url, &[]).await
    }

    pub async fn get_json_with_query(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Value, VendorError> {
        let response = if query.is_empty() {
            self.get(url).await?
        } else {
            self.get_with_query(url, query).await?
        };
        self.read_json(url, response).await
    }

    async fn read_json(&self, url: &str, response: reqwest::Response) -> Result<Value, VendorError> {
        let text = response.text().await.map_err(|e| {
            VendorError::http(self.vendor, &self.slug, url, None, format!("body read failed: {e}"))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(
                vendor = %self.vendor,
                slug = %self.slug,
                url = truncate(url, 100),
                body_preview = truncate(&text, 200),
                "vendor json parse failed"
            );
            VendorError::parse(self.vendor, &self.slug, format!("JSON parse failed: {e}"), &text)
        })
    }

    /// Stable 8-hex-char id for vendors without native meeting ids:
    /// digest of `slug|date|title[|type]`.
    pub fn fallback_vendor_id(
        &self,
        title: &str,
        date: Option<NaiveDateTime>,
        meeting_type: Option<&str>,
    ) -> String {
        let date_str = date
            .map(|d| d.format("%Y%m%d").to_string())
            .unwrap_or_else(|| "nodate".to_string());
        let mut input = format!("{}|{}|{}", self.slug, date_str, title);
        if let Some(meeting_type) = meeting_type {
            input.push('|');
            input.push_str(meeting_type);
        }
        use sha2::Digest;
        let hash = sha2::Sha256::digest(input.as_bytes());
        hex::encode(&hash[..4])
    }

    /// Drop records missing id, title, or start; warn about what fell out.
    pub fn validate(&self, meetings: Vec<MeetingRecord>) -> Vec<MeetingRecord> {
        let total = meetings.len();
        let valid: Vec<MeetingRecord> = meetings
            .into_iter()
            .filter(|m| {
                let ok = !m.vendor_id.trim().is_empty()
                    && !m.title.trim().is_empty()
                    && m.start.is_some();
                if !ok {
                    tracing::warn!(
                        vendor = %self.vendor,
                        slug = %self.slug,
                        title = truncate(&m.title, 50),
                        "meeting missing required fields"
                    );
                }
                ok
            })
            .collect();
        if valid.len() < total {
            tracing::warn!(
                vendor = %self.vendor,
                slug = %self.slug,
                total,
                valid = valid.len(),
                "filtered invalid meetings"
            );
        }
        valid
    }
}

/// Detect cancelled/postponed/revised wording in a title or date string.
///
/// Later keywords win when several appear, matching how agenda titles
/// layer amendments over cancellations.
pub fn parse_meeting_status(title: &str, date_str: Option<&str>) -> Option<MeetingStatus> {
    const KEYWORDS: &[(&str, MeetingStatus)] = &[
        ("CANCEL", MeetingStatus::Cancelled),
        ("POSTPONE", MeetingStatus::Postponed),
        ("DEFER", MeetingStatus::Deferred),
        ("RESCHEDULE", MeetingStatus::Rescheduled),
        ("REVISED", MeetingStatus::Revised),
        ("AMENDMENT", MeetingStatus::Revised),
        ("UPDATED", MeetingStatus::Revised),
    ];

    let mut status = None;
    for text in [Some(title), date_str].into_iter().flatten() {
        let upper = text.to_uppercase();
        for (keyword, label) in KEYWORDS {
            if upper.contains(keyword) {
                status = Some(*label);
            }
        }
    }
    status
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Outcome of one adapter fetch: the validated meetings plus the error
/// that cut the fetch short, when one did. Distinguishes "nothing
/// scheduled" from "the vendor is down" so the fetcher can retry the
/// latter.
#[derive(Debug, Default)]
pub struct FetchResult {
    pub meetings: Vec<MeetingRecord>,
    pub error: Option<String>,
}

impl FetchResult {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// A vendor adapter: fetches meetings for one city over a date window.
#[async_trait]
pub trait VendorAdapter: Send + Sync {
    fn core(&self) -> &AdapterCore;

    /// Vendor-specific discovery and parsing. Errors propagate to the
    /// safety net in [`fetch_meetings`].
    async fn fetch_meetings_impl(
        &self,
        days_back: i64,
        days_forward: i64,
    ) -> Result<Vec<MeetingRecord>, VendorError>;

    /// Fetch and validate, reporting failure without propagating it.
    async fn fetch_result(&self, days_back: i64, days_forward: i64) -> FetchResult {
        match self.fetch_meetings_impl(days_back, days_forward).await {
            Ok(meetings) => FetchResult {
                meetings: self.core().validate(meetings),
                error: None,
            },
            Err(e) => {
                let core = self.core();
                tracing::error!(
                    vendor = %core.vendor(),
                    slug = core.slug(),
                    error = %e,
                    "fetch_meetings failed"
                );
                metrics::counter!(
                    "vendor_fetch_failures_total", 1,
                    "vendor" => core.vendor().as_str()
                );
                FetchResult {
                    meetings: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Fetch, validate, and never fail: any error is logged and becomes
    /// an empty list so one broken city cannot poison a sync pass.
    async fn fetch_meetings(&self, days_back: i64, days_forward: i64) -> Vec<MeetingRecord> {
        self.fetch_result(days_back, days_forward).await.meetings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core() -> AdapterCore {
        AdapterCore::new(Vendor::Primegov, "cityofpaloalto", Arc::new(SessionPool::new())).unwrap()
    }

    #[test]
    fn construction_requires_slug() {
        let err = AdapterCore::new(Vendor::Primegov, " ", Arc::new(SessionPool::new()));
        assert!(err.is_err());
    }

    #[test]
    fn status_keywords_map_to_statuses() {
        assert_eq!(
            parse_meeting_status("City Council (CANCELLED)", None),
            Some(MeetingStatus::Cancelled)
        );
        assert_eq!(
            parse_meeting_status("Planning Commission", Some("POSTPONED to 3/2")),
            Some(MeetingStatus::Postponed)
        );
        assert_eq!(
            parse_meeting_status("Council - REVISED agenda", None),
            Some(MeetingStatus::Revised)
        );
        assert_eq!(parse_meeting_status("Regular Meeting", None), None);
    }

    #[test]
    fn fallback_vendor_id_is_stable_and_short() {
        let core = core();
        let date = chrono::NaiveDate::from_ymd_opt(2026, 2, 24)
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap();
        let a = core.fallback_vendor_id("City Council", Some(date), None);
        let b = core.fallback_vendor_id("City Council", Some(date), None);
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert_ne!(a, core.fallback_vendor_id("City Council", Some(date), Some("special")));
    }

    #[test]
    fn validate_drops_incomplete_records() {
        let core = core();
        let complete = MeetingRecord {
            vendor_id: "1".to_string(),
            title: "Council".to_string(),
            start: chrono::NaiveDate::from_ymd_opt(2026, 1, 5)
                .unwrap()
                .and_hms_opt(18, 0, 0),
            ..Default::default()
        };
        let missing_start = MeetingRecord {
            vendor_id: "2".to_string(),
            title: "Council".to_string(),
            ..Default::default()
        };
        let missing_title = MeetingRecord {
            vendor_id: "3".to_string(),
            start: complete.start,
            ..Default::default()
        };
        let valid = core.validate(vec![complete, missing_start, missing_title]);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].vendor_id, "1");
    }
}
