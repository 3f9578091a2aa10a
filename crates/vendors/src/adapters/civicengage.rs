//! CivicEngage adapter.
//!
//! Archive Center listings (`Archive.aspx`) support server-side date
//! filtering; each `ADID=` link resolves directly to a packet PDF, so one
//! listing request covers the whole window. The base URL is discovered
//! like CivicPlus; the archive category id comes from static config with
//! a sensible default.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use crate::adapter::{
    parse_meeting_status, AdapterCore, MeetingRecord, SyncWindow, VendorAdapter,
};
use crate::dates::parse_civic_date;
use crate::discovery::DomainCache;
use crate::error::VendorError;
use crate::parsers::{absolutize, text_of};
use crate::sites::SiteConfigs;

const DEFAULT_CATEGORY_ID: u32 = 1;
const BODY_MARKERS: &[&str] = &["archive", "agenda"];

static ADID: Lazy<Regex> = Lazy::new(|| Regex::new(r"ADID=(\d+)").expect("static regex"));
static MONTH_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2},?\s+\d{4}\b",
    )
    .expect("static regex")
});
static NUMERIC_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,2}/\d{1,2}/\d{4}\b").expect("static regex"));

pub struct CivicEngageAdapter {
    core: AdapterCore,
    domains: std::sync::Arc<DomainCache>,
    category_id: u32,
}

impl CivicEngageAdapter {
    pub fn new(core: AdapterCore, domains: std::sync::Arc<DomainCache>, sites: &SiteConfigs) -> Self {
        let category_id = sites
            .civicengage_category(core.slug())
            .unwrap_or(DEFAULT_CATEGORY_ID);
        Self {
            core,
            domains,
            category_id,
        }
    }

    fn parse_listing(&self, html: &str, base_url: &str) -> Vec<MeetingRecord> {
        let document = Html::parse_document(html);
        let link_sel = Selector::parse("a[href*=\"ADID=\"]").expect("static selector");

        let mut results = Vec::new();
        let mut seen_adids = std::collections::HashSet::new();

        for link in document.select(&link_sel) {
            let href = link.value().attr("href").unwrap_or("");
            let title = text_of(&link);
            let Some(adid) = ADID.captures(href).map(|c| c[1].to_string()) else {
                continue;
            };
            if title.is_empty() || !seen_adids.insert(adid.clone()) {
                continue;
            }

            let date_str = MONTH_DATE
                .find(&title)
                .or_else(|| NUMERIC_DATE.find(&title))
                .map(|m| m.as_str().to_string());
            let start = date_str.as_deref().and_then(parse_civic_date);

            results.push(MeetingRecord {
                vendor_id: format!("ce_adid_{adid}"),
                meeting_status: parse_meeting_status(&title, date_str.as_deref()),
                title,
                start,
                packet_url: Some(absolutize(base_url, href)),
                ..Default::default()
            });
        }
        results
    }
}

#[async_trait]
impl VendorAdapter for CivicEngageAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn fetch_meetings_impl(
        &self,
        days_back: i64,
        days_forward: i64,
    ) -> Result<Vec<MeetingRecord>, VendorError> {
        let window = SyncWindow::new(days_back, days_forward);

        let (base_url, _) = self
            .domains
            .discover(&self.core, &["/Archive.aspx"], BODY_MARKERS)
            .await?;

        let listing_url = format!(
            "{}/Archive.aspx?ysnExecuteSearch=1&txtKeywords=&lngArchiveMasterID={}&txtDateRange=&dtiStartDate={}&dtiEndDate={}",
            base_url,
            self.category_id,
            window.start.format("%m/%d/%Y"),
            window.end.format("%m/%d/%Y")
        );

        let html = self.core.get_text(&listing_url).await?;
        let meetings = self.parse_listing(&html, &base_url);

        tracing::info!(
            vendor = "civicengage",
            slug = self.core.slug(),
            count = meetings.len(),
            "parsed meetings from listing"
        );
        Ok(meetings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionPool;
    use common::Vendor;
    use std::sync::Arc;

    fn adapter() -> CivicEngageAdapter {
        let core =
            AdapterCore::new(Vendor::CivicEngage, "auroraco", Arc::new(SessionPool::new())).unwrap();
        CivicEngageAdapter::new(core, Arc::new(DomainCache::new()), &SiteConfigs::default())
    }

    #[test]
    fn adid_links_become_meetings() {
        let html = r#"
            <a href="/Archive.aspx?ADID=4121">City Council Agenda - February 24, 2026</a>
            <a href="/Archive.aspx?ADID=4121">City Council Agenda - February 24, 2026</a>
            <a href="/Archive.aspx?ADID=4122">Planning Commission (CANCELLED) - 03/02/2026</a>
            <a href="/Other.aspx">No adid</a>
        "#;
        let meetings = adapter().parse_listing(html, "https://auroraco.gov");
        assert_eq!(meetings.len(), 2, "duplicate ADIDs collapse");

        assert_eq!(meetings[0].vendor_id, "ce_adid_4121");
        assert_eq!(
            meetings[0].start.unwrap().format("%Y-%m-%d").to_string(),
            "2026-02-24"
        );
        assert!(meetings[0].packet_url.as_deref().unwrap().starts_with("https://auroraco.gov/"));

        assert_eq!(
            meetings[1].meeting_status,
            Some(db::models::MeetingStatus::Cancelled)
        );
        assert_eq!(
            meetings[1].start.unwrap().format("%Y-%m-%d").to_string(),
            "2026-03-02"
        );
    }
}
