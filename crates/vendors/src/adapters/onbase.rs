//! OnBase adapter.
//!
//! OnBase agenda sites are bespoke per city, so the site paths come from
//! static configuration. Listings embed meeting JSON inline
//! (`{"ID":...,"Name":...,"Time":...}`) with a static-HTML link fallback;
//! agendas use the accessible AgendaOnline format; item documents hang
//! off `ViewMeetingAgendaItem` pages as `DownloadFile` links, rewritten to
//! stable `ViewDocument` URLs.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::adapter::{AdapterCore, AttachmentRecord, ItemRecord, MeetingRecord, SyncWindow, VendorAdapter};
use crate::dates::parse_civic_date;
use crate::error::VendorError;
use crate::filters::filter_items;
use crate::parsers::granicus::parse_agenda_online;
use crate::parsers::{absolutize, text_of};
use crate::sites::SiteConfigs;

const ITEM_CONCURRENCY: usize = 5;

static INLINE_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\{"ID":\d+[^}]+\}"#).expect("static regex"));
static ID_PARAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[?&]id=(\d+)").expect("static regex"));
static DOWNLOAD_DOC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/Documents/DownloadFile/([^?/]+)").expect("static regex"));

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// Rewrite a `DownloadFile` link to the stable `ViewDocument` form.
fn translate_download_url(url: &str) -> String {
    let Some(caps) = DOWNLOAD_DOC.captures(url) else {
        return url.to_string();
    };
    let doc_name = &caps[1];
    let Some(prefix_end) = url.find("/Documents/DownloadFile/") else {
        return url.to_string();
    };
    format!("{}/Documents/ViewDocument/{}", &url[..prefix_end], doc_name)
}

struct ListedMeeting {
    id: String,
    title: String,
    date: Option<chrono::NaiveDateTime>,
}

pub struct OnBaseAdapter {
    core: AdapterCore,
    site_urls: Vec<String>,
}

impl OnBaseAdapter {
    /// Fails at construction when the city has no configured sites.
    pub fn new(core: AdapterCore, sites: &SiteConfigs) -> Result<Self, VendorError> {
        let site_urls = sites
            .onbase_sites(core.slug())?
            .iter()
            .map(|path| format!("https://{path}"))
            .collect::<Vec<_>>();
        tracing::info!(
            vendor = "onbase",
            slug = core.slug(),
            site_count = site_urls.len(),
            "adapter initialized"
        );
        Ok(Self { core, site_urls })
    }

    fn parse_listing(&self, html: &str) -> Vec<ListedMeeting> {
        let mut meetings = Vec::new();
        let mut seen = std::collections::HashSet::new();

        // Durham-style pages embed the meeting objects inline.
        for json_str in INLINE_JSON.find_iter(html) {
            let Ok(data) = serde_json::from_str::<Value>(json_str.as_str()) else {
                continue;
            };
            let Some(id) = data.get("ID").map(|v| v.to_string()) else { continue };
            if !seen.insert(id.clone()) {
                continue;
            }
            meetings.push(ListedMeeting {
                id,
                title: data
                    .get("Name")
                    .and_then(Value::as_str)
                    .unwrap_or("Meeting")
                    .to_string(),
                date: data
                    .get("Time")
                    .and_then(Value::as_str)
                    .and_then(parse_civic_date),
            });
        }
        if !meetings.is_empty() {
            return meetings;
        }

        // Static-HTML fallback.
        let document = Html::parse_document(html);
        let link_sel = sel("a[href]");
        for link in document.select(&link_sel) {
            let href = link.value().attr("href").unwrap_or("");
            if !href.contains("ViewMeeting") || !href.contains("id=") {
                continue;
            }
            let title = text_of(&link);
            if title.is_empty() {
                continue;
            }
            let Some(id) = ID_PARAM.captures(href).map(|c| c[1].to_string()) else {
                continue;
            };
            if !seen.insert(id.clone()) {
                continue;
            }
            meetings.push(ListedMeeting {
                id,
                title,
                date: None,
            });
        }
        meetings
    }

    fn parse_attachments(&self, html: &str, base_url: &str) -> Vec<AttachmentRecord> {
        let document = Html::parse_document(html);
        let link_sel = sel("a[href]");

        let mut attachments = Vec::new();
        for link in document.select(&link_sel) {
            let href = link.value().attr("href").unwrap_or("");
            if !href.contains("DownloadFile") && !href.contains("ViewDocument") {
                continue;
            }
            let name = {
                let text = text_of(&link);
                if text.is_empty() {
                    format!("Attachment {}", attachments.len() + 1)
                } else {
                    text
                }
            };
            let url = translate_download_url(&absolutize(base_url, href));
            attachments.push(AttachmentRecord::new(name, url));
        }
        attachments
    }

    async fn fetch_item_attachments(&self, items: &mut [ItemRecord], meeting_id: &str, base_url: &str) {
        let semaphore = Arc::new(Semaphore::new(ITEM_CONCURRENCY));
        let mut join_set = tokio::task::JoinSet::new();

        for (index, item) in items.iter().enumerate() {
            if item.vendor_item_id.is_empty() {
                continue;
            }
            let url = format!(
                "{}/Meetings/ViewMeetingAgendaItem?meetingId={}&itemId={}&isSection=false&type=agenda",
                base_url, meeting_id, item.vendor_item_id
            );
            let core = self.core.clone();
            let semaphore = semaphore.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire().await.ok()?;
                core.get_text(&url).await.ok().map(|html| (index, html))
            });
        }

        while let Some(result) = join_set.join_next().await {
            if let Ok(Some((index, html))) = result {
                let attachments = self.parse_attachments(&html, base_url);
                if let Some(item) = items.get_mut(index) {
                    if !attachments.is_empty() {
                        item.attachments = attachments;
                    }
                }
            }
        }
    }

    async fn fetch_meeting(&self, base_url: &str, listed: &ListedMeeting) -> Option<MeetingRecord> {
        let agenda_urls = [
            format!(
                "{base_url}/Documents/ViewAgenda?meetingId={}&type=agenda&doctype=1",
                listed.id
            ),
            format!(
                "{base_url}/Meetings/ViewMeetingAgenda?meetingId={}&type=agenda",
                listed.id
            ),
        ];

        let mut best_items: Vec<ItemRecord> = Vec::new();
        let mut best_url = None;
        let mut best_html = None;

        for url in &agenda_urls {
            let Ok(html) = self.core.get_text(url).await else { continue };
            let items = parse_agenda_online(&html);
            if items.len() > best_items.len() {
                best_items = items;
                best_url = Some(url.clone());
                best_html = Some(html);
            }
            if !best_items.is_empty() {
                break;
            }
        }

        let html = best_html?;
        let mut items = filter_items(best_items);
        if !items.is_empty() {
            self.fetch_item_attachments(&mut items, &listed.id, base_url).await;
        }

        let mut record = MeetingRecord {
            vendor_id: listed.id.clone(),
            title: listed.title.clone(),
            start: listed.date,
            items,
            ..Default::default()
        };

        if !record.items.is_empty() {
            record.agenda_url = best_url;
        } else {
            // Packet fallback: first document link on the agenda page.
            record.packet_url = self
                .parse_attachments(&html, base_url)
                .into_iter()
                .next()
                .map(|a| a.url);
        }

        Some(record)
    }
}

#[async_trait]
impl VendorAdapter for OnBaseAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn fetch_meetings_impl(
        &self,
        days_back: i64,
        days_forward: i64,
    ) -> Result<Vec<MeetingRecord>, VendorError> {
        let window = SyncWindow::new(days_back, days_forward);
        let mut meetings = Vec::new();

        for base_url in &self.site_urls {
            let html = match self.core.get_text(base_url).await {
                Ok(html) => html,
                Err(e) => {
                    tracing::warn!(vendor = "onbase", slug = self.core.slug(), site = %base_url, error = %e, "site fetch failed");
                    continue;
                }
            };

            for listed in self.parse_listing(&html) {
                if let Some(date) = listed.date {
                    if !window.contains(date) {
                        continue;
                    }
                }
                if let Some(record) = self.fetch_meeting(base_url, &listed).await {
                    meetings.push(record);
                }
            }
        }

        tracing::info!(
            vendor = "onbase",
            slug = self.core.slug(),
            site_count = self.site_urls.len(),
            count = meetings.len(),
            "collected meetings"
        );
        Ok(meetings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionPool;
    use common::Vendor;
    use std::collections::HashMap;

    fn adapter() -> OnBaseAdapter {
        let core = AdapterCore::new(Vendor::OnBase, "durhamNC", Arc::new(SessionPool::new())).unwrap();
        let sites = SiteConfigs::from_parts(
            HashMap::new(),
            HashMap::from([(
                "durhamNC".to_string(),
                vec!["durhamnc.onbaseonline.com/236agendaonline".to_string()],
            )]),
            HashMap::new(),
        );
        OnBaseAdapter::new(core, &sites).unwrap()
    }

    #[test]
    fn construction_requires_site_config() {
        let core = AdapterCore::new(Vendor::OnBase, "nowhereKS", Arc::new(SessionPool::new())).unwrap();
        assert!(OnBaseAdapter::new(core, &SiteConfigs::default()).is_err());
    }

    #[test]
    fn inline_json_listing_wins_over_links() {
        let html = r#"
            var meetings = [{"ID":512,"Name":"City Council","Time":"2026-01-13T19:00:00","IsAgendaAvailable":true}];
            <a href="/Meetings/ViewMeeting?id=999&doctype=1">Ignored fallback</a>
        "#;
        let listed = adapter().parse_listing(html);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "512");
        assert_eq!(listed[0].title, "City Council");
        assert_eq!(listed[0].date.unwrap().format("%H:%M").to_string(), "19:00");
    }

    #[test]
    fn download_urls_become_view_document() {
        assert_eq!(
            translate_download_url(
                "https://durhamnc.onbaseonline.com/236agendaonline/Documents/DownloadFile/doc-991.pdf?meetingId=512"
            ),
            "https://durhamnc.onbaseonline.com/236agendaonline/Documents/ViewDocument/doc-991.pdf"
        );
        // Non-download URLs pass through untouched.
        assert_eq!(translate_download_url("https://x/Documents/ViewDocument/a.pdf"), "https://x/Documents/ViewDocument/a.pdf");
    }
}
