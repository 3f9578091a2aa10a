//! Berkeley adapter.
//!
//! Custom city site: the council agendas page is a plain table (date cell
//! with a `<time>` tag, link cell pointing at the HTML agenda). Agenda
//! detail pages mark items with bold headings followed by attachment
//! links, and carry participation info in the intro paragraphs.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::adapter::{
    parse_meeting_status, AdapterCore, AttachmentRecord, ItemRecord, MeetingRecord, SyncWindow,
    VendorAdapter,
};
use crate::dates::parse_civic_date;
use crate::error::VendorError;
use crate::filters::filter_items;
use crate::parsers::{absolutize, text_of};
use crate::participation::extract_participation;

const BASE_URL: &str = "https://berkeleyca.gov";

static TIME_OF_DAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d{1,2}):(\d{2})\s*([ap])m").expect("static regex"));
static ITEM_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}\.\s+\S").expect("static regex"));

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

pub struct BerkeleyAdapter {
    core: AdapterCore,
}

impl BerkeleyAdapter {
    pub fn new(core: AdapterCore) -> Self {
        Self { core }
    }

    fn parse_listing(&self, html: &str, window: SyncWindow) -> Vec<(String, chrono::NaiveDateTime, String)> {
        let document = Html::parse_document(html);
        let row_sel = sel("tr");
        let cell_sel = sel("td");
        let time_sel = sel("time");
        let link_sel = sel("a[href]");

        let mut rows = Vec::new();
        for row in document.select(&row_sel) {
            let cells: Vec<ElementRef> = row.select(&cell_sel).collect();
            if cells.len() < 2 {
                continue;
            }

            let date_text = cells
                .iter()
                .find_map(|c| c.select(&time_sel).next())
                .map(|t| {
                    t.value()
                        .attr("datetime")
                        .map(String::from)
                        .unwrap_or_else(|| text_of(&t))
                })
                .unwrap_or_else(|| text_of(&cells[0]));

            let Some(mut start) = parse_civic_date(&date_text) else { continue };

            // The date cell often carries the start time as plain text.
            let full_row_text = text_of(&row);
            if let Some(caps) = TIME_OF_DAY.captures(&full_row_text) {
                let mut hour: u32 = caps[1].parse().unwrap_or(0);
                let minute: u32 = caps[2].parse().unwrap_or(0);
                if caps[3].eq_ignore_ascii_case("p") && hour != 12 {
                    hour += 12;
                }
                if let Some(with_time) = start.date().and_hms_opt(hour % 24, minute, 0) {
                    start = with_time;
                }
            }

            if !window.contains(start) {
                continue;
            }

            let Some(link) = row.select(&link_sel).next() else { continue };
            let agenda_url = absolutize(BASE_URL, link.value().attr("href").unwrap_or(""));
            rows.push((text_of(&link), start, agenda_url));
        }
        rows
    }

    /// Items are numbered bold headings; the nearest following link is
    /// the item's report attachment.
    fn parse_agenda_detail(&self, html: &str, page_url: &str) -> (Vec<ItemRecord>, Option<db::models::ParticipationInfo>) {
        let document = Html::parse_document(html);
        let strong_sel = sel("strong");
        let link_sel = sel("a[href]");

        let page_text = document.root_element().text().collect::<Vec<_>>().join(" ");
        let participation = extract_participation(&page_text);

        let mut items = Vec::new();
        let mut sequence = 0;

        for strong in document.select(&strong_sel) {
            let heading = text_of(&strong);
            if !ITEM_HEADING.is_match(&heading) {
                continue;
            }

            sequence += 1;
            let (agenda_number, title) = match heading.split_once('.') {
                Some((num, rest)) => (format!("{num}."), rest.trim().to_string()),
                None => (sequence.to_string(), heading.clone()),
            };
            if title.is_empty() {
                sequence -= 1;
                continue;
            }

            // Nearest following link inside the same block.
            let mut attachments = Vec::new();
            if let Some(parent) = strong.parent().and_then(ElementRef::wrap) {
                if let Some(link) = parent.select(&link_sel).next() {
                    let href = link.value().attr("href").unwrap_or("");
                    if !href.is_empty() {
                        let name = {
                            let text = text_of(&link);
                            if text.is_empty() {
                                "Attachment".to_string()
                            } else {
                                text
                            }
                        };
                        attachments.push(AttachmentRecord::new(name, absolutize(page_url, href)));
                    }
                }
            }

            items.push(ItemRecord {
                vendor_item_id: format!("berkeley_{sequence}"),
                title,
                sequence,
                agenda_number: Some(agenda_number),
                attachments,
                ..Default::default()
            });
        }

        (items, participation)
    }
}

#[async_trait]
impl VendorAdapter for BerkeleyAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn fetch_meetings_impl(
        &self,
        days_back: i64,
        days_forward: i64,
    ) -> Result<Vec<MeetingRecord>, VendorError> {
        let window = SyncWindow::new(days_back, days_forward);
        let meetings_url = format!("{BASE_URL}/your-government/city-council/city-council-agendas");
        tracing::info!(vendor = "berkeley", url = %meetings_url, "fetching meetings list");

        let html = self.core.get_text(&meetings_url).await?;
        let listed = self.parse_listing(&html, window);

        let mut meetings = Vec::new();
        for (link_text, start, agenda_url) in listed {
            let url_path = agenda_url.replace(BASE_URL, "");
            let vendor_id = self
                .core
                .fallback_vendor_id(url_path.trim_matches('/'), Some(start), None);

            let title = if link_text.len() > 5 {
                link_text.clone()
            } else {
                "Berkeley City Council".to_string()
            };

            let mut record = MeetingRecord {
                vendor_id,
                meeting_status: parse_meeting_status(&title, None),
                title,
                start: Some(start),
                agenda_url: Some(agenda_url.clone()),
                ..Default::default()
            };

            match self.core.get_text(&agenda_url).await {
                Ok(detail_html) => {
                    let (items, participation) = self.parse_agenda_detail(&detail_html, &agenda_url);
                    record.items = filter_items(items);
                    record.participation = participation;
                }
                Err(e) => {
                    tracing::warn!(
                        vendor = "berkeley",
                        error = %e,
                        "failed to fetch agenda detail"
                    );
                }
            }

            meetings.push(record);
        }

        Ok(meetings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionPool;
    use common::Vendor;

    fn adapter() -> BerkeleyAdapter {
        let core = AdapterCore::new(
            Vendor::Berkeley,
            "berkeley",
            std::sync::Arc::new(SessionPool::new()),
        )
        .unwrap();
        BerkeleyAdapter::new(core)
    }

    #[test]
    fn agenda_detail_extracts_numbered_items() {
        let html = r#"
            <p>Join via https://cityofberkeley-info.zoomgov.com/j/1606088273.
               Written comments: council@berkeleyca.gov. This is a hybrid meeting.</p>
            <p><strong>1. Adopt ORD-2025-7 sidewalk vending rules</strong>
               <a href="/files/ord-2025-7.pdf">Staff Report</a></p>
            <p><strong>2. Budget referral: crossing guards</strong></p>
            <p><strong>From:</strong> City Manager</p>
        "#;
        let (items, participation) =
            adapter().parse_agenda_detail(html, "https://berkeleyca.gov/agenda");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].agenda_number.as_deref(), Some("1."));
        assert!(items[0].title.starts_with("Adopt ORD-2025-7"));
        assert_eq!(items[0].attachments.len(), 1);
        assert!(items[1].attachments.is_empty());

        let participation = participation.unwrap();
        assert_eq!(participation.email.as_deref(), Some("council@berkeleyca.gov"));
        assert!(participation.is_hybrid);
        assert!(participation.virtual_url.as_deref().unwrap().contains("zoomgov.com"));
    }
}
