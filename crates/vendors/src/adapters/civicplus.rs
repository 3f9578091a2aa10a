//! CivicPlus adapter.
//!
//! CivicPlus cities sit on varied hosting (`{slug}.civicplus.com`, custom
//! `.gov`/`.org` domains), so the working base URL is discovered by
//! probing agenda paths. Listings are AgendaCenter pages whose
//! `/ViewFile/Agenda/_MMDDYYYY-ID` links resolve straight to packet PDFs.

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

const AGENDA_PATHS: &[&str] = &["/AgendaCenter", "/Calendar.aspx", "/calendar", "/meetings", "/agendas"];
const BODY_MARKERS: &[&str] = &["agenda", "meeting"];

static VIEWFILE_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_(\d{2})(\d{2})(\d{4})-\d+").expect("static regex"));
static VIEWFILE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_(\d{8}-\d+)").expect("static regex"));
static TEXT_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]* \d{1,2},? \d{4}\b")
        .expect("static regex")
});
static NUMERIC_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,2}/\d{1,2}/\d{4}\b").expect("static regex"));

pub struct CivicPlusAdapter {
    core: AdapterCore,
    domains: std::sync::Arc<DomainCache>,
}

struct MeetingLink {
    url: String,
    title: String,
}

impl CivicPlusAdapter {
    pub fn new(core: AdapterCore, domains: std::sync::Arc<DomainCache>) -> Self {
        Self { core, domains }
    }

    fn extract_meeting_links(&self, html: &str, page_url: &str) -> Vec<MeetingLink> {
        let document = Html::parse_document(html);
        let link_sel = Selector::parse("a[href]").expect("static selector");

        const SKIP_PREFIXES: &[&str] = &[
            "<<<", "Back to", "back to", "Agendas & Minutes", "agendas & minutes",
            "Calendar", "All Agendas", "all agendas",
        ];

        let mut links = Vec::new();
        for link in document.select(&link_sel) {
            let text = text_of(&link);
            let href = link.value().attr("href").unwrap_or("");

            if text.len() < 5 || SKIP_PREFIXES.iter().any(|p| text.starts_with(p) || text == *p) {
                continue;
            }

            let is_viewfile = href.contains("/ViewFile/Agenda/") || href.contains("/ViewFile/Item/");
            let has_date = TEXT_DATE.is_match(&text) || NUMERIC_DATE.is_match(&text);
            if is_viewfile || has_date {
                links.push(MeetingLink {
                    url: absolutize(page_url, href),
                    title: text,
                });
            }
        }
        links
    }

    /// Build a record straight from a ViewFile link; the URL itself is
    /// the packet.
    fn meeting_from_viewfile(&self, link: &MeetingLink) -> MeetingRecord {
        let date = VIEWFILE_DATE.captures(&link.url).and_then(|caps| {
            chrono::NaiveDate::from_ymd_opt(
                caps[3].parse().unwrap_or(0),
                caps[1].parse().unwrap_or(0),
                caps[2].parse().unwrap_or(0),
            )
            .and_then(|d| d.and_hms_opt(0, 0, 0))
        });
        let date = date.or_else(|| {
            TEXT_DATE
                .find(&link.title)
                .or_else(|| NUMERIC_DATE.find(&link.title))
                .and_then(|m| parse_civic_date(m.as_str()))
        });

        let vendor_id = VIEWFILE_ID
            .captures(&link.url)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| self.core.fallback_vendor_id(&link.title, date, None));

        let title = if matches!(link.title.as_str(), "Agenda" | "View Meeting Agenda" | "View Agenda Packet") {
            match date {
                Some(d) => format!("Meeting - {}", d.format("%B %d, %Y")),
                None => link.title.clone(),
            }
        } else {
            link.title.clone()
        };

        MeetingRecord {
            vendor_id,
            meeting_status: parse_meeting_status(&title, None),
            title,
            start: date,
            packet_url: Some(link.url.clone()),
            ..Default::default()
        }
    }

    async fn scrape_meeting_page(&self, link: &MeetingLink) -> Option<MeetingRecord> {
        let html = self.core.get_text(&link.url).await.ok()?;

        let (date, pdf_url) = {
            let document = Html::parse_document(&html);
            let link_sel = Selector::parse("a[href]").expect("static selector");

            let page_text = document.root_element().text().collect::<Vec<_>>().join(" ");
            let date = TEXT_DATE
                .find(&page_text)
                .or_else(|| NUMERIC_DATE.find(&page_text))
                .and_then(|m| parse_civic_date(m.as_str()))
                .or_else(|| {
                    TEXT_DATE
                        .find(&link.title)
                        .or_else(|| NUMERIC_DATE.find(&link.title))
                        .and_then(|m| parse_civic_date(m.as_str()))
                });

            let pdf_url = document
                .select(&link_sel)
                .filter_map(|a| a.value().attr("href"))
                .find(|href| href.to_lowercase().contains(".pdf"))
                .map(|href| absolutize(&link.url, href));

            (date, pdf_url)
        };

        Some(MeetingRecord {
            vendor_id: self.core.fallback_vendor_id(&link.title, date, None),
            title: link.title.clone(),
            start: date,
            meeting_status: parse_meeting_status(&link.title, None),
            agenda_url: pdf_url.is_none().then(|| link.url.clone()),
            packet_url: pdf_url,
            ..Default::default()
        })
    }
}

/// Keep the last record per start time; packets are uploaded after the
/// bare agendas they replace.
fn dedupe_by_date(meetings: Vec<MeetingRecord>) -> Vec<MeetingRecord> {
    let mut by_date: std::collections::HashMap<String, MeetingRecord> = std::collections::HashMap::new();
    for meeting in meetings {
        let key = meeting
            .start
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        by_date.insert(key, meeting);
    }
    let mut result: Vec<MeetingRecord> = by_date.into_values().collect();
    result.sort_by_key(|m| m.start);
    result
}

#[async_trait]
impl VendorAdapter for CivicPlusAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn fetch_meetings_impl(
        &self,
        days_back: i64,
        days_forward: i64,
    ) -> Result<Vec<MeetingRecord>, VendorError> {
        let window = SyncWindow::new(days_back, days_forward);

        let (_base, agenda_page_url) = self
            .domains
            .discover(&self.core, AGENDA_PATHS, BODY_MARKERS)
            .await?;

        let html = self.core.get_text(&agenda_page_url).await?;
        let links = self.extract_meeting_links(&html, &agenda_page_url);
        tracing::info!(
            vendor = "civicplus",
            slug = self.core.slug(),
            count = links.len(),
            "found meeting links"
        );

        let mut results = Vec::new();
        for link in links {
            let record = if link.url.contains("/ViewFile/Agenda/") {
                Some(self.meeting_from_viewfile(&link))
            } else {
                self.scrape_meeting_page(&link).await
            };

            // Unparseable dates are retained; validation culls them later.
            if let Some(record) = record {
                match record.start {
                    Some(start) if !window.contains(start) => continue,
                    _ => results.push(record),
                }
            }
        }

        let deduped = dedupe_by_date(results);
        tracing::info!(
            vendor = "civicplus",
            slug = self.core.slug(),
            count = deduped.len(),
            "filtered meetings in date range"
        );
        Ok(deduped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionPool;
    use common::Vendor;

    fn adapter() -> CivicPlusAdapter {
        let core = AdapterCore::new(
            Vendor::CivicPlus,
            "cityofithacany",
            std::sync::Arc::new(SessionPool::new()),
        )
        .unwrap();
        CivicPlusAdapter::new(core, std::sync::Arc::new(DomainCache::new()))
    }

    #[test]
    fn viewfile_links_carry_their_own_dates() {
        let link = MeetingLink {
            url: "https://cityofithacany.gov/AgendaCenter/ViewFile/Agenda/_12042025-786".to_string(),
            title: "View Meeting Agenda".to_string(),
        };
        let record = adapter().meeting_from_viewfile(&link);
        assert_eq!(record.vendor_id, "12042025-786");
        assert_eq!(record.start.unwrap().format("%Y-%m-%d").to_string(), "2025-12-04");
        assert_eq!(record.title, "Meeting - December 04, 2025");
        assert_eq!(record.packet_url.as_deref(), Some(link.url.as_str()));
    }

    #[test]
    fn listing_extraction_skips_navigation() {
        let html = r#"
            <a href="/AgendaCenter/ViewFile/Agenda/_06252025-701">Common Council June 25, 2025</a>
            <a href="/AgendaCenter">Back to AgendaCenter</a>
            <a href="/x">Jun</a>
        "#;
        let links = adapter().extract_meeting_links(html, "https://cityofithacany.gov/AgendaCenter");
        assert_eq!(links.len(), 1);
        assert!(links[0].url.contains("_06252025-701"));
    }

    #[test]
    fn dedupe_keeps_last_record_per_date() {
        let date = chrono::NaiveDate::from_ymd_opt(2025, 6, 25).unwrap().and_hms_opt(0, 0, 0);
        let agenda = MeetingRecord {
            vendor_id: "a".into(),
            title: "Agenda".into(),
            start: date,
            ..Default::default()
        };
        let packet = MeetingRecord {
            vendor_id: "b".into(),
            title: "Packet".into(),
            start: date,
            packet_url: Some("https://x/packet.pdf".into()),
            ..Default::default()
        };
        let deduped = dedupe_by_date(vec![agenda, packet]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].vendor_id, "b");
    }
}
