//! Granicus HTML parsing.
//!
//! Two page shapes matter:
//! 1. `ViewPublisher.php` — the meeting listing (title, date, AgendaViewer
//!    link per row).
//! 2. `AgendaViewer.php` — the agenda itself: numbered item tables with a
//!    `File ID:` suffix and MetaViewer attachment links in a following
//!    blockquote.

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::adapter::{AttachmentRecord, ItemRecord};
use crate::dates::parse_civic_date;
use crate::parsers::{absolutize, text_of};

/// One row of the ViewPublisher listing.
#[derive(Debug, Clone)]
pub struct ListedMeeting {
    pub event_id: String,
    pub title: String,
    pub start: Option<NaiveDateTime>,
    pub agenda_viewer_url: String,
}

static EVENT_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"event_id=(\d+)").expect("static regex"));
static MATTER_FILE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d+$").expect("static regex"));

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// Parse the ViewPublisher listing into meetings with AgendaViewer links.
pub fn parse_viewpublisher_listing(html: &str, base_url: &str) -> Vec<ListedMeeting> {
    let document = Html::parse_document(html);
    let row_sel = sel("tr.odd, tr.even");
    let cell_sel = sel("td.listItem");
    let link_sel = sel("a[href]");
    let span_sel = sel("span");

    let mut meetings = Vec::new();

    for row in document.select(&row_sel) {
        let cells: Vec<ElementRef> = row.select(&cell_sel).collect();
        if cells.len() < 2 {
            continue;
        }

        let title = text_of(&cells[0]);
        let date_cell = &cells[1];

        // Hidden span with a unix timestamp, when present, beats the
        // display text.
        let mut start = date_cell
            .select(&span_sel)
            .find(|s| {
                s.value()
                    .attr("style")
                    .map(|style| style.replace(' ', "").contains("display:none"))
                    .unwrap_or(false)
            })
            .and_then(|s| text_of(&s).parse::<i64>().ok())
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.naive_utc());

        if start.is_none() {
            let date_text = text_of(date_cell).replace('\u{a0}', " ");
            start = parse_civic_date(&date_text)
                .or_else(|| parse_civic_date(&date_text.replace(" - ", " ")));
        }

        let Some(agenda_link) = row
            .select(&link_sel)
            .find(|a| a.value().attr("href").is_some_and(|h| h.contains("AgendaViewer")))
        else {
            continue;
        };

        let href = absolutize(base_url, agenda_link.value().attr("href").unwrap_or(""));
        let Some(event_id) = EVENT_ID.captures(&href).map(|c| c[1].to_string()) else {
            continue;
        };

        meetings.push(ListedMeeting {
            event_id,
            title,
            start,
            agenda_viewer_url: href,
        });
    }

    tracing::debug!(meeting_count = meetings.len(), "parsed viewpublisher listing");
    meetings
}

/// Parse an AgendaViewer page into items with MetaViewer attachments.
pub fn parse_agenda_viewer(html: &str, base_url: &str) -> Vec<ItemRecord> {
    let document = Html::parse_document(html);
    let table_sel = sel("table");
    let row_sel = sel("tr");
    let cell_sel = sel("td");
    let meta_link_sel = sel("a[href]");

    let mut items = Vec::new();
    let mut sequence = 0;

    for table in document.select(&table_sel) {
        let styled = table
            .value()
            .attr("style")
            .map(|s| s.to_lowercase().contains("border-collapse"))
            .unwrap_or(false);
        if !styled {
            continue;
        }

        let Some(first_row) = table.select(&row_sel).next() else {
            continue;
        };
        let cells: Vec<ElementRef> = first_row.select(&cell_sel).collect();
        if cells.len() < 2 {
            continue;
        }

        let number_text = text_of(&cells[0]);
        if number_text.is_empty() || !number_text.replace('.', "").chars().all(|c| c.is_ascii_digit())
        {
            continue;
        }

        sequence += 1;
        let title_full = text_of(&cells[1]);

        let (title, vendor_item_id) = match title_full.split_once("File ID:") {
            Some((title, id)) => (title.trim().to_string(), id.trim().to_string()),
            None => (title_full.clone(), sequence.to_string()),
        };

        // MetaViewer links live in a blockquote following the item table.
        let mut attachments = Vec::new();
        if let Some(blockquote) = following_blockquote(&table) {
            for link in blockquote.select(&meta_link_sel) {
                let href = link.value().attr("href").unwrap_or("");
                if !href.contains("MetaViewer") {
                    continue;
                }
                let name = {
                    let text = text_of(&link);
                    if text.is_empty() {
                        format!("Attachment {sequence}")
                    } else {
                        text
                    }
                };
                attachments.push(AttachmentRecord::new(name, absolutize(base_url, href)));
            }
        }

        let matter_file = MATTER_FILE_ID
            .is_match(&vendor_item_id)
            .then(|| vendor_item_id.clone());

        items.push(ItemRecord {
            vendor_item_id,
            title,
            sequence,
            matter_file,
            attachments,
            ..Default::default()
        });
    }

    tracing::debug!(item_count = items.len(), "parsed agendaviewer html");
    items
}

static LOAD_AGENDA_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"loadAgendaItem\((\d+)\)").expect("static regex"));
static ACCESSIBLE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+\.?[A-Z]?\.?)\s+(.+)$").expect("static regex"));

/// Parse the accessible AgendaOnline format (`ViewMeetingAgenda` pages,
/// also served by OnBase sites): items are `div.accessible-item` blocks
/// whose links call `loadAgendaItem(id)`.
pub fn parse_agenda_online(html: &str) -> Vec<ItemRecord> {
    let document = Html::parse_document(html);
    let item_sel = sel("div.accessible-item");
    let link_sel = sel("a");
    let title_span_sel = sel("span.accessible-item-text");

    let mut items = Vec::new();
    let mut seen_ids = std::collections::HashSet::new();
    let mut sequence = 0;

    for item_div in document.select(&item_sel) {
        let Some(link) = item_div.select(&link_sel).find(|a| {
            a.value()
                .attr("onclick")
                .is_some_and(|oc| oc.contains("loadAgendaItem"))
        }) else {
            continue;
        };
        let onclick = link.value().attr("onclick").unwrap_or("");
        let Some(item_id) = LOAD_AGENDA_ITEM.captures(onclick).map(|c| c[1].to_string()) else {
            continue;
        };
        if !seen_ids.insert(item_id.clone()) {
            continue;
        }

        let link_text = text_of(&link);
        let (agenda_number, title) = match link.select(&title_span_sel).next() {
            Some(span) => {
                let title = text_of(&span);
                let number = link_text.replace(&title, "").trim().to_string();
                (number, title)
            }
            None => match ACCESSIBLE_NUMBER.captures(&link_text) {
                Some(caps) => (caps[1].to_string(), caps[2].to_string()),
                None => (String::new(), link_text.clone()),
            },
        };
        if title.is_empty() {
            continue;
        }

        sequence += 1;
        items.push(ItemRecord {
            vendor_item_id: item_id,
            title,
            sequence,
            agenda_number: (!agenda_number.is_empty()).then_some(agenda_number),
            ..Default::default()
        });
    }

    tracing::debug!(item_count = items.len(), "parsed agendaonline html");
    items
}

/// First blockquote element following the table's parent chain, where
/// Granicus puts the item's attachment list.
fn following_blockquote<'a>(table: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    let mut node = table.parent()?;
    loop {
        let mut sibling = node.next_sibling();
        while let Some(s) = sibling {
            if let Some(el) = ElementRef::wrap(s) {
                if el.value().name() == "blockquote" {
                    return Some(el);
                }
                if el.value().name() == "table" {
                    return None;
                }
            }
            sibling = s.next_sibling();
        }
        node = node.parent()?;
        if ElementRef::wrap(node).is_none() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <table>
          <tr class="odd">
            <td class="listItem">City Council</td>
            <td class="listItem">December 22, 2025 - 06:00 PM</td>
            <td class="listItem">
              <a href="//cambridge.granicus.com/AgendaViewer.php?view_id=1&event_id=4521">Agenda</a>
            </td>
          </tr>
          <tr class="even">
            <td class="listItem">No agenda row</td>
            <td class="listItem">January 5, 2026</td>
          </tr>
        </table>
    "#;

    #[test]
    fn listing_extracts_event_rows() {
        let meetings = parse_viewpublisher_listing(LISTING, "https://cambridge.granicus.com");
        assert_eq!(meetings.len(), 1);
        let m = &meetings[0];
        assert_eq!(m.event_id, "4521");
        assert_eq!(m.title, "City Council");
        assert!(m.agenda_viewer_url.starts_with("https://cambridge.granicus.com/AgendaViewer"));
        let start = m.start.unwrap();
        assert_eq!(start.format("%Y-%m-%d %H:%M").to_string(), "2025-12-22 18:00");
    }

    const AGENDA: &str = r#"
        <div>
          <table style="BORDER-COLLAPSE: collapse">
            <tr><td>1.</td><td>Zoning petition for 12 Elm St File ID: 2025-143</td></tr>
          </table>
        </div>
        <blockquote>
          <a href="/MetaViewer.php?view_id=1&meta_id=998">Staff Report</a>
          <a href="/MetaViewer.php?view_id=1&meta_id=999">Petition Text</a>
        </blockquote>
        <div>
          <table style="border-collapse: collapse">
            <tr><td>2.</td><td>Committee report on bike lanes</td></tr>
          </table>
        </div>
    "#;

    #[test]
    fn agenda_online_accessible_items_parse() {
        let html = r#"
            <div class="accessible-item">
              <a onclick="loadAgendaItem(301)">1.A. <span class="accessible-item-text">Approve the consent calendar</span></a>
            </div>
            <div class="accessible-item">
              <a onclick="loadAgendaItem(302)">2. Public hearing on the budget</a>
            </div>
            <div class="accessible-item">
              <a onclick="loadAgendaItem(301)">duplicate</a>
            </div>
        "#;
        let items = parse_agenda_online(html);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].vendor_item_id, "301");
        assert_eq!(items[0].title, "Approve the consent calendar");
        assert_eq!(items[0].agenda_number.as_deref(), Some("1.A."));
        assert_eq!(items[1].agenda_number.as_deref(), Some("2."));
    }

    #[test]
    fn agenda_viewer_extracts_items_and_attachments() {
        let items = parse_agenda_viewer(AGENDA, "https://cambridge.granicus.com");
        assert_eq!(items.len(), 2);

        assert_eq!(items[0].vendor_item_id, "2025-143");
        assert_eq!(items[0].matter_file.as_deref(), Some("2025-143"));
        assert_eq!(items[0].title, "Zoning petition for 12 Elm St");
        assert_eq!(items[0].attachments.len(), 2);
        assert_eq!(
            items[0].attachments[0].url,
            "https://cambridge.granicus.com/MetaViewer.php?view_id=1&meta_id=998"
        );

        assert_eq!(items[1].vendor_item_id, "2");
        assert!(items[1].attachments.is_empty());
        assert_eq!(items[1].matter_file, None);
    }
}
