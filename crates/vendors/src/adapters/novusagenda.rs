//! NovusAgenda adapter.
//!
//! `/agendapublic` is a grid of meeting rows. Each row links a packet PDF
//! (`DisplayAgendaPDF.ashx`) and usually an HTML agenda
//! (`MeetingView.aspx` in an onclick). Item documents hide behind
//! `CoverSheet.aspx` detail pages whose `AttachmentViewer.ashx` links are
//! the real files.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tokio::sync::Semaphore;

use crate::adapter::{
    parse_meeting_status, AdapterCore, AttachmentRecord, ItemRecord, MeetingRecord, SyncWindow,
    VendorAdapter,
};
use crate::dates::parse_civic_date;
use crate::error::VendorError;
use crate::filters::filter_items;
use crate::parsers::text_of;

const COVERSHEET_CONCURRENCY: usize = 5;

static MEETING_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"MeetingID=(\d+)").expect("static regex"));
static ITEM_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"ItemID=(\d+)").expect("static regex"));
static MEETING_VIEW_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"MeetingView\.aspx\?[^'"]+"#).expect("static regex"));
static ATTACHMENT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"AttachmentID=(\d+)").expect("static regex"));
static SHORT_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}/\d{1,2}/\d{2}$").expect("static regex"));

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

pub struct NovusAgendaAdapter {
    core: AdapterCore,
    base_url: String,
}

impl NovusAgendaAdapter {
    pub fn new(core: AdapterCore) -> Self {
        let base_url = format!("https://{}.novusagenda.com", core.slug());
        Self { core, base_url }
    }

    fn agendapublic_url(&self, relative: &str) -> String {
        if relative.starts_with("http") {
            relative.to_string()
        } else {
            format!("{}/agendapublic/{}", self.base_url, relative)
        }
    }

    /// Parse the MeetingView HTML agenda: items are CoverSheet links.
    fn parse_meeting_view(&self, html: &str) -> Vec<ItemRecord> {
        let document = Html::parse_document(html);
        let link_sel = sel("a[href]");

        let mut items = Vec::new();
        let mut sequence = 0;
        for link in document.select(&link_sel) {
            let href = link.value().attr("href").unwrap_or("");
            if !href.contains("CoverSheet.aspx") {
                continue;
            }
            let Some(item_id) = ITEM_ID.captures(href).map(|c| c[1].to_string()) else {
                continue;
            };

            let mut title = text_of(&link);
            if title.is_empty() {
                if let Some(parent) = link.parent().and_then(ElementRef::wrap) {
                    title = text_of(&parent);
                }
            }
            if title.is_empty() {
                continue;
            }

            sequence += 1;
            items.push(ItemRecord {
                vendor_item_id: item_id,
                title,
                sequence,
                ..Default::default()
            });
        }
        items
    }

    fn parse_coversheet_attachments(&self, html: &str) -> Vec<AttachmentRecord> {
        let document = Html::parse_document(html);
        let link_sel = sel("a[href]");

        let mut attachments = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for link in document.select(&link_sel) {
            let href = link.value().attr("href").unwrap_or("");
            if !href.to_lowercase().contains("attachmentviewer.ashx") {
                continue;
            }
            let Some(att_id) = ATTACHMENT_ID.captures(href).map(|c| c[1].to_string()) else {
                continue;
            };
            if !seen.insert(att_id.clone()) {
                continue;
            }

            let mut name = text_of(&link);
            if name.is_empty() {
                if let Some(parent) = link.parent().and_then(ElementRef::wrap) {
                    name = text_of(&parent);
                }
            }
            if name.is_empty() {
                name = format!("Attachment {att_id}");
            }

            attachments.push(AttachmentRecord::new(name, self.agendapublic_url(href)));
        }
        attachments
    }

    /// Fetch CoverSheet pages for all items, bounded.
    async fn fetch_coversheet_attachments(&self, items: &mut [ItemRecord], meeting_id: &str) {
        let semaphore = Arc::new(Semaphore::new(COVERSHEET_CONCURRENCY));
        let mut join_set = tokio::task::JoinSet::new();

        for (index, item) in items.iter().enumerate() {
            if item.vendor_item_id.is_empty() {
                continue;
            }
            let url = format!(
                "{}/agendapublic/CoverSheet.aspx?ItemID={}&MeetingID={}",
                self.base_url, item.vendor_item_id, meeting_id
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
                let attachments = self.parse_coversheet_attachments(&html);
                if let Some(item) = items.get_mut(index) {
                    if !attachments.is_empty() {
                        item.attachments = attachments;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl VendorAdapter for NovusAgendaAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn fetch_meetings_impl(
        &self,
        days_back: i64,
        days_forward: i64,
    ) -> Result<Vec<MeetingRecord>, VendorError> {
        let window = SyncWindow::new(days_back, days_forward);
        let listing_url = format!("{}/agendapublic", self.base_url);
        let html = self.core.get_text(&listing_url).await?;

        struct RowData {
            title: String,
            start: chrono::NaiveDateTime,
            status: Option<db::models::MeetingStatus>,
            meeting_id: Option<String>,
            packet_url: Option<String>,
            agenda_url: Option<String>,
        }

        // Parse the grid synchronously; detail fetches happen after.
        let rows: Vec<RowData> = {
            let document = Html::parse_document(&html);
            let row_sel = sel("tr.rgRow, tr.rgAltRow");
            let cell_sel = sel("td");
            let link_sel = sel("a");
            let img_sel = sel("img");

            let mut rows = Vec::new();
            for row in document.select(&row_sel) {
                let cells: Vec<ElementRef> = row.select(&cell_sel).collect();
                if cells.len() < 5 {
                    continue;
                }

                let date_str = text_of(&cells[0]);
                let meeting_type = text_of(&cells[1]);

                // Grid dates are short form: 11/04/25.
                let Some(start) = (if SHORT_DATE.is_match(&date_str) {
                    chrono::NaiveDate::parse_from_str(&date_str, "%m/%d/%y")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                } else {
                    parse_civic_date(&date_str)
                }) else {
                    tracing::warn!(
                        vendor = "novusagenda",
                        slug = self.core.slug(),
                        date = %date_str,
                        "could not parse date"
                    );
                    continue;
                };

                if !window.contains(start) {
                    continue;
                }

                let time_field = cells.get(3).map(|c| text_of(c)).unwrap_or_default();
                let status = parse_meeting_status(&meeting_type, Some(&time_field));

                let mut meeting_id = None;
                let mut packet_url = None;
                for link in row.select(&link_sel) {
                    let href = link.value().attr("href").unwrap_or("");
                    if href.contains("DisplayAgendaPDF.ashx") {
                        meeting_id = MEETING_ID.captures(href).map(|c| c[1].to_string());
                        packet_url = Some(self.agendapublic_url(href));
                        break;
                    }
                }

                // Prefer parsable HTML agendas over summary views.
                let mut best_score = 0;
                let mut best_onclick = None;
                for link in row.select(&link_sel) {
                    let onclick = link.value().attr("onclick").unwrap_or("");
                    if !onclick.contains("MeetingView.aspx") {
                        continue;
                    }
                    let mut link_text = text_of(&link).to_lowercase();
                    if let Some(img) = link.select(&img_sel).next() {
                        if let Some(alt) = img.value().attr("alt") {
                            link_text = format!("{link_text} {}", alt.to_lowercase());
                        }
                    }
                    let score = if link_text.contains("html agenda") || link_text.contains("online agenda") {
                        3
                    } else if link_text.contains("agenda") && !link_text.contains("summary") {
                        2
                    } else {
                        0
                    };
                    if score > best_score {
                        best_score = score;
                        best_onclick = Some(onclick.to_string());
                    }
                }

                let agenda_url = best_onclick.as_deref().and_then(|onclick| {
                    MEETING_VIEW_URL
                        .find(onclick)
                        .map(|m| self.agendapublic_url(m.as_str()))
                });
                if meeting_id.is_none() {
                    if let Some(url) = agenda_url.as_deref() {
                        meeting_id = MEETING_ID.captures(url).map(|c| c[1].to_string());
                    }
                }

                rows.push(RowData {
                    title: meeting_type,
                    start,
                    status,
                    meeting_id,
                    packet_url,
                    agenda_url,
                });
            }
            rows
        };

        let mut meetings = Vec::new();
        for row in rows {
            let meeting_id = row.meeting_id.clone().unwrap_or_else(|| {
                self.core.fallback_vendor_id(&row.title, Some(row.start), None)
            });

            let mut items = Vec::new();
            if let Some(agenda_url) = &row.agenda_url {
                match self.core.get_text(agenda_url).await {
                    Ok(agenda_html) => {
                        items = filter_items(self.parse_meeting_view(&agenda_html));
                        if !items.is_empty() {
                            self.fetch_coversheet_attachments(&mut items, &meeting_id).await;
                        }
                        tracing::info!(
                            vendor = "novusagenda",
                            slug = self.core.slug(),
                            meeting_id = %meeting_id,
                            item_count = items.len(),
                            "extracted items from HTML agenda"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            vendor = "novusagenda",
                            slug = self.core.slug(),
                            meeting_id = %meeting_id,
                            error = %e,
                            "failed to fetch HTML agenda"
                        );
                    }
                }
            }

            meetings.push(MeetingRecord {
                vendor_id: meeting_id,
                title: row.title,
                start: Some(row.start),
                agenda_url: row.agenda_url,
                packet_url: row.packet_url,
                meeting_status: row.status,
                items,
                ..Default::default()
            });
        }

        tracing::info!(
            vendor = "novusagenda",
            slug = self.core.slug(),
            count = meetings.len(),
            "collected meetings in date range"
        );
        Ok(meetings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionPool;
    use common::Vendor;

    fn adapter() -> NovusAgendaAdapter {
        let core = AdapterCore::new(
            Vendor::NovusAgenda,
            "hagerstown",
            std::sync::Arc::new(SessionPool::new()),
        )
        .unwrap();
        NovusAgendaAdapter::new(core)
    }

    #[test]
    fn meeting_view_items_come_from_coversheet_links() {
        let html = r#"
            <table>
              <tr><td><a href="CoverSheet.aspx?ItemID=101&MeetingID=9">Adopt RES-2025-12 water rates</a></td></tr>
              <tr><td><a href="CoverSheet.aspx?ItemID=102&MeetingID=9">Second reading of parking ordinance</a></td></tr>
              <tr><td><a href="Other.aspx?X=1">Not an item</a></td></tr>
            </table>
        "#;
        let items = adapter().parse_meeting_view(html);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].vendor_item_id, "101");
        assert_eq!(items[1].sequence, 2);
    }

    #[test]
    fn coversheet_attachments_dedupe_by_attachment_id() {
        let html = r#"
            <td><a href="AttachmentViewer.ashx?AttachmentID=55&ItemID=101">Staff Report.pdf</a></td>
            <td><a href="AttachmentViewer.ashx?AttachmentID=55&ItemID=101">Staff Report.pdf</a></td>
            <td><a href="AttachmentViewer.ashx?AttachmentID=56&ItemID=101"></a></td>
        "#;
        let attachments = adapter().parse_coversheet_attachments(html);
        assert_eq!(attachments.len(), 2);
        assert!(attachments[0].url.starts_with("https://hagerstown.novusagenda.com/agendapublic/"));
        assert_eq!(attachments[1].name, "Attachment 56");
    }
}
