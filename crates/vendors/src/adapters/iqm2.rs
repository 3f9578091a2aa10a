//! IQM2 adapter (Granicus subsidiary).
//!
//! Calendar pages (`/Citizens`, `/Citizens/Calendar.aspx`,
//! `/Citizens/Default.aspx` — sites vary) list `div.MeetingRow` entries.
//! `Detail_Meeting.aspx` holds the item table; `Detail_LegiFile.aspx`
//! holds matter metadata (category, sponsors) and `FileOpen.aspx`
//! attachments.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tokio::sync::Semaphore;

use crate::adapter::{AdapterCore, AttachmentRecord, ItemRecord, MeetingRecord, SyncWindow, VendorAdapter};
use crate::dates::parse_civic_date;
use crate::error::VendorError;
use crate::filters::filter_items;
use crate::parsers::{absolutize, text_of};

const LEGIFILE_CONCURRENCY: usize = 5;

static ID_PARAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[?&]ID=(\d+)").expect("static regex"));
static NUM_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z0-9]+\.\s*$").expect("static regex"));
static COMPOUND_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z]+\s+\d+\s+#\d+)\s*:").expect("static regex"));
static WS_HASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+#\s*").expect("static regex"));
static WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// Matter metadata recovered from a Detail_LegiFile page.
#[derive(Debug, Default)]
struct LegiFileMetadata {
    matter_type: Option<String>,
    sponsors: Vec<String>,
    attachments: Vec<AttachmentRecord>,
}

struct ListedMeeting {
    meeting_id: String,
    title: String,
    start: chrono::NaiveDateTime,
}

pub struct Iqm2Adapter {
    core: AdapterCore,
    base_url: String,
}

impl Iqm2Adapter {
    pub fn new(core: AdapterCore) -> Self {
        let base_url = format!("https://{}.iqm2.com", core.slug());
        Self { core, base_url }
    }

    fn calendar_urls(&self) -> [String; 3] {
        [
            format!("{}/Citizens", self.base_url),
            format!("{}/Citizens/Calendar.aspx", self.base_url),
            format!("{}/Citizens/Default.aspx", self.base_url),
        ]
    }

    fn parse_calendar(&self, html: &str, window: SyncWindow) -> Vec<ListedMeeting> {
        let document = Html::parse_document(html);
        let row_sel = sel("div.MeetingRow");
        let cancelled_sel = sel("span.MeetingCancelled");
        let link_sel = sel("a[href]");
        let details_sel = sel("div.RowDetails");

        let mut meetings = Vec::new();
        for row in document.select(&row_sel) {
            if row.select(&cancelled_sel).next().is_some() {
                continue;
            }

            let Some(link) = row
                .select(&link_sel)
                .find(|a| a.value().attr("href").is_some_and(|h| h.contains("Detail_Meeting.aspx?ID=")))
            else {
                continue;
            };

            let href = link.value().attr("href").unwrap_or("");
            let Some(meeting_id) = ID_PARAM.captures(href).map(|c| c[1].to_string()) else {
                continue;
            };

            // Link text carries "Jan 28, 2025 5:30 PM".
            let datetime_text = text_of(&link);
            let Some(start) = parse_civic_date(&datetime_text) else {
                tracing::warn!(
                    vendor = "iqm2",
                    slug = self.core.slug(),
                    datetime_text,
                    "could not parse datetime"
                );
                continue;
            };
            if !window.contains(start) {
                continue;
            }

            let title = row
                .select(&details_sel)
                .next()
                .map(|d| text_of(&d))
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Meeting".to_string());

            meetings.push(ListedMeeting {
                meeting_id,
                title,
                start,
            });
        }
        meetings
    }

    /// Parse the Detail_Meeting item table.
    ///
    /// Rows interleave section headers (bold Num cells), items (letter or
    /// number labels in a `td.Num`, titles linking to Detail_LegiFile),
    /// and Cambridge-style rows where the matter number lives in the
    /// title text (`COF 2025 #141 : ...`).
    fn parse_meeting_items(&self, html: &str, meeting_id: &str, page_url: &str) -> Vec<ItemRecord> {
        let document = Html::parse_document(html);
        let table_sel = sel("table#MeetingDetail");
        let row_sel = sel("tr");
        let cell_sel = sel("td");
        let strong_sel = sel("strong");
        let legifile_sel = sel("a[href*=\"Detail_LegiFile.aspx\"]");
        let fileopen_sel = sel("a[href*=\"FileOpen.aspx\"]");

        let Some(table) = document.select(&table_sel).next() else {
            tracing::warn!(vendor = "iqm2", slug = self.core.slug(), "no MeetingDetail table found");
            return Vec::new();
        };

        let mut items: Vec<ItemRecord> = Vec::new();
        let mut current_section: Option<String> = None;
        let mut counter = 0;

        for row in table.select(&row_sel) {
            let cells: Vec<ElementRef> = row.select(&cell_sel).collect();
            if cells.len() < 2 {
                continue;
            }

            // Attachment rows annotate the item above them.
            if let Some(file_link) = row.select(&fileopen_sel).next() {
                if let Some(current) = items.last_mut() {
                    let href = file_link.value().attr("href").unwrap_or("");
                    let name = {
                        let text = text_of(&file_link);
                        if text.is_empty() {
                            format!("Attachment {}", current.attachments.len() + 1)
                        } else {
                            text
                        }
                    };
                    current.attachments.push(AttachmentRecord::new(name, absolutize(page_url, href)));
                }
                continue;
            }

            // Locate the Num cell; nesting depth shifts it right.
            let Some(num_index) = cells.iter().position(|c| {
                c.value().attr("class").is_some_and(|cl| cl.split_whitespace().any(|c| c == "Num"))
            }) else {
                continue;
            };
            let Some(title_cell) = cells.get(num_index + 1) else { continue };

            let num_text = text_of(&cells[num_index]);
            let legifile_link = title_cell.select(&legifile_sel).next();
            let title_strong = title_cell.select(&strong_sel).next();

            // Bold title without a LegiFile link is a section header.
            if title_strong.is_some() && legifile_link.is_none() {
                let section = text_of(title_cell);
                if !section.is_empty() {
                    current_section = Some(section);
                }
                continue;
            }

            if !NUM_LABEL.is_match(&num_text) && !(num_text.is_empty() && legifile_link.is_some()) {
                continue;
            }

            counter += 1;

            let (title, legifile_id) = match &legifile_link {
                Some(link) => {
                    let href = link.value().attr("href").unwrap_or("");
                    (text_of(link), ID_PARAM.captures(href).map(|c| c[1].to_string()))
                }
                None => (text_of(title_cell), None),
            };
            if title.is_empty() {
                counter -= 1;
                continue;
            }

            let agenda_number = if num_text.is_empty() {
                COMPOUND_PREFIX
                    .captures(&title)
                    .map(|c| c[1].to_string())
                    .unwrap_or_else(|| counter.to_string())
            } else {
                num_text.trim().to_string()
            };

            let mut item = ItemRecord {
                vendor_item_id: legifile_id
                    .clone()
                    .unwrap_or_else(|| format!("iqm2-{}-{}-{}", self.core.slug(), meeting_id, counter)),
                title: title.clone(),
                sequence: counter,
                agenda_number: Some(agenda_number),
                section: current_section.clone(),
                ..Default::default()
            };

            if let Some(legifile_id) = legifile_id {
                item.matter_id = Some(legifile_id.clone());
                item.matter_file = Some(clean_matter_file(&title).unwrap_or(legifile_id));
            }

            items.push(item);
        }

        items
    }

    async fn fetch_legifile_metadata(&self, legifile_id: &str) -> LegiFileMetadata {
        let detail_url = format!("{}/Citizens/Detail_LegiFile.aspx?ID={}", self.base_url, legifile_id);
        let html = match self.core.get_text(&detail_url).await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(
                    vendor = "iqm2",
                    slug = self.core.slug(),
                    legifile_id,
                    error = %e,
                    "failed to fetch matter metadata"
                );
                return LegiFileMetadata::default();
            }
        };

        parse_legifile_page(&html, &detail_url)
    }

    /// Enrich items that reference LegiFiles, bounded.
    async fn enrich_items(&self, items: &mut [ItemRecord]) {
        let semaphore = Arc::new(Semaphore::new(LEGIFILE_CONCURRENCY));
        let mut join_set = tokio::task::JoinSet::new();

        for (index, item) in items.iter().enumerate() {
            let Some(legifile_id) = item.matter_id.clone() else { continue };
            let semaphore = semaphore.clone();
            let adapter_core = self.core.clone();
            let base_url = self.base_url.clone();

            join_set.spawn(async move {
                let _permit = semaphore.acquire().await.ok()?;
                let detail_url =
                    format!("{base_url}/Citizens/Detail_LegiFile.aspx?ID={legifile_id}");
                let html = adapter_core.get_text(&detail_url).await.ok()?;
                Some((index, parse_legifile_page(&html, &detail_url)))
            });
        }

        while let Some(result) = join_set.join_next().await {
            if let Ok(Some((index, metadata))) = result {
                if let Some(item) = items.get_mut(index) {
                    if item.matter_type.is_none() {
                        item.matter_type = metadata.matter_type;
                    }
                    if item.sponsors.is_empty() {
                        item.sponsors = metadata.sponsors;
                    }
                    item.attachments.extend(metadata.attachments);
                }
            }
        }
    }
}

/// Pull a case number out of an item title: the segment before " / ", or
/// a normalized ":"-prefixed label (`COF 2025 #141` → `COF-2025-141`).
fn clean_matter_file(title: &str) -> Option<String> {
    if let Some((prefix, _)) = title.split_once(" / ") {
        let prefix = prefix.trim();
        if !prefix.is_empty() {
            return Some(prefix.to_string());
        }
    }
    if let Some((prefix, _)) = title.split_once(':') {
        let prefix = prefix.trim();
        if prefix.is_empty() || prefix.len() > 40 {
            return None;
        }
        let normalized = WS_HASH.replace_all(prefix, "-");
        let normalized = WS.replace_all(&normalized, "-");
        return Some(normalized.to_string());
    }
    None
}

fn parse_legifile_page(html: &str, page_url: &str) -> LegiFileMetadata {
    let document = Html::parse_document(html);
    let info_table_sel = sel("table#tblLegiFileInfo");
    let row_sel = sel("tr");
    let cell_sel = sel("th, td");
    let fileopen_sel = sel("a[href*=\"FileOpen.aspx\"]");

    let mut metadata = LegiFileMetadata::default();

    if let Some(info_table) = document.select(&info_table_sel).next() {
        for row in info_table.select(&row_sel) {
            let cells: Vec<ElementRef> = row.select(&cell_sel).collect();
            let mut i = 0;
            while i + 1 < cells.len() {
                let label = text_of(&cells[i]).to_lowercase().replace(':', "");
                let value = text_of(&cells[i + 1]);
                if !value.is_empty() {
                    if label.contains("category") {
                        metadata.matter_type = Some(value);
                    } else if label.contains("sponsor") {
                        metadata.sponsors = value
                            .split([',', ';'])
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(String::from)
                            .collect();
                    }
                }
                i += 2;
            }
        }
    }

    for link in document.select(&fileopen_sel) {
        let name = text_of(&link);
        let href = link.value().attr("href").unwrap_or("");
        if name.is_empty() || href.is_empty() {
            continue;
        }
        metadata.attachments.push(AttachmentRecord::new(name, absolutize(page_url, href)));
    }

    metadata
}

#[async_trait]
impl VendorAdapter for Iqm2Adapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn fetch_meetings_impl(
        &self,
        days_back: i64,
        days_forward: i64,
    ) -> Result<Vec<MeetingRecord>, VendorError> {
        let window = SyncWindow::new(days_back, days_forward);

        let mut listed = Vec::new();
        for calendar_url in self.calendar_urls() {
            match self.core.get_text(&calendar_url).await {
                Ok(html) => {
                    listed = self.parse_calendar(&html, window);
                    if !listed.is_empty() {
                        tracing::info!(
                            vendor = "iqm2",
                            slug = self.core.slug(),
                            url = %calendar_url,
                            count = listed.len(),
                            "found meetings on calendar"
                        );
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        vendor = "iqm2",
                        slug = self.core.slug(),
                        url = %calendar_url,
                        error = %e,
                        "failed to fetch calendar URL"
                    );
                }
            }
        }

        if listed.is_empty() {
            tracing::error!(
                vendor = "iqm2",
                slug = self.core.slug(),
                "could not find working calendar URL"
            );
            return Ok(Vec::new());
        }

        let mut meetings = Vec::new();
        for entry in listed {
            let detail_url = format!(
                "{}/Citizens/Detail_Meeting.aspx?ID={}",
                self.base_url, entry.meeting_id
            );
            let html = match self.core.get_text(&detail_url).await {
                Ok(html) => html,
                Err(e) => {
                    tracing::warn!(
                        vendor = "iqm2",
                        slug = self.core.slug(),
                        meeting_id = %entry.meeting_id,
                        error = %e,
                        "failed to fetch meeting details"
                    );
                    continue;
                }
            };

            let (mut items, packet_url) = {
                let items = self.parse_meeting_items(&html, &entry.meeting_id, &detail_url);
                let packet_url = {
                    let document = Html::parse_document(&html);
                    let packet_sel = sel("a[id*=\"hlFullAgendaFile\"]");
                    document
                        .select(&packet_sel)
                        .next()
                        .and_then(|a| a.value().attr("href"))
                        .map(|href| absolutize(&self.base_url, href))
                };
                (filter_items(items), packet_url)
            };

            self.enrich_items(&mut items).await;

            tracing::info!(
                vendor = "iqm2",
                slug = self.core.slug(),
                meeting_id = %entry.meeting_id,
                item_count = items.len(),
                "extracted items from meeting"
            );

            meetings.push(MeetingRecord {
                vendor_id: entry.meeting_id,
                title: entry.title,
                start: Some(entry.start),
                agenda_url: Some(detail_url),
                packet_url,
                items,
                ..Default::default()
            });
        }

        tracing::info!(
            vendor = "iqm2",
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

    fn adapter() -> Iqm2Adapter {
        let core = AdapterCore::new(
            Vendor::Iqm2,
            "cambridgema",
            std::sync::Arc::new(SessionPool::new()),
        )
        .unwrap();
        Iqm2Adapter::new(core)
    }

    #[test]
    fn matter_file_cleaning() {
        assert_eq!(
            clean_matter_file("ORD 2025-4 / Second reading of the tree ordinance"),
            Some("ORD 2025-4".to_string())
        );
        assert_eq!(
            clean_matter_file("COF 2025 #141 : Communication from the Manager"),
            Some("COF-2025-141".to_string())
        );
        assert_eq!(clean_matter_file("Plain title with no case number"), None);
    }

    #[test]
    fn meeting_items_parse_sections_and_legifiles() {
        let html = r#"
        <table id="MeetingDetail">
          <tr><td class="Num"><strong>1.</strong></td><td class="Title"><strong>CONSENT AGENDA</strong></td></tr>
          <tr><td></td><td class="Num">A. </td>
              <td class="Title"><a href="Detail_LegiFile.aspx?ID=7001&MeetingID=99">ORD 2025-4 / Tree protection ordinance</a></td></tr>
          <tr><td></td><td></td><td><a href="FileOpen.aspx?Type=4&ID=12">Staff Memo.pdf</a></td></tr>
          <tr><td></td><td class="Num">B. </td><td class="Title">Unfiled discussion item</td></tr>
        </table>
        "#;
        let items = adapter().parse_meeting_items(html, "99", "https://cambridgema.iqm2.com/Citizens/Detail_Meeting.aspx?ID=99");
        assert_eq!(items.len(), 2);

        assert_eq!(items[0].matter_id.as_deref(), Some("7001"));
        assert_eq!(items[0].matter_file.as_deref(), Some("ORD 2025-4"));
        assert_eq!(items[0].section.as_deref(), Some("CONSENT AGENDA"));
        assert_eq!(items[0].attachments.len(), 1);
        assert!(items[0].attachments[0].url.contains("FileOpen.aspx"));

        assert_eq!(items[1].matter_id, None);
        assert!(items[1].vendor_item_id.starts_with("iqm2-cambridgema-99-"));
    }

    #[test]
    fn legifile_metadata_parses_category_and_sponsors() {
        let html = r#"
        <table id="tblLegiFileInfo">
          <tr><th>Category:</th><td>Ordinance</td><th>Department:</th><td>Clerk</td></tr>
          <tr><th>Sponsors:</th><td>Burhan Azeem; Patricia Nolan</td></tr>
        </table>
        <a href="FileOpen.aspx?Type=4&ID=88">Ordinance text.pdf</a>
        "#;
        let metadata = parse_legifile_page(html, "https://cambridgema.iqm2.com/Citizens/Detail_LegiFile.aspx?ID=7001");
        assert_eq!(metadata.matter_type.as_deref(), Some("Ordinance"));
        assert_eq!(metadata.sponsors, vec!["Burhan Azeem", "Patricia Nolan"]);
        assert_eq!(metadata.attachments.len(), 1);
    }
}
