//! PrimeGov HTML agenda parsing.
//!
//! `Portal/Meeting?meetingTemplateId=N` renders the agenda as item blocks
//! (`div.agenda-item` with a `data-item-id`, number and title spans, and
//! attachment anchors pointing at the attachment-history download API).
//! Older templates fall back to a plain numbered table.

use db::models::ParticipationInfo;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::adapter::{AttachmentRecord, ItemRecord};
use crate::parsers::{absolutize, text_of};
use crate::participation::extract_participation;

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static AGENDA_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}\.?[A-Z]?\.?$").expect("static regex"));

/// Parsed agenda page: items plus participation details from the prose.
#[derive(Debug, Default)]
pub struct ParsedAgenda {
    pub items: Vec<ItemRecord>,
    pub participation: Option<ParticipationInfo>,
}

/// Parse a PrimeGov HTML agenda page.
pub fn parse_html_agenda(html: &str, base_url: &str) -> ParsedAgenda {
    let document = Html::parse_document(html);

    let page_text = document
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ");
    let participation = extract_participation(&page_text);

    let mut items = parse_item_blocks(&document, base_url);
    if items.is_empty() {
        items = parse_item_table(&document, base_url);
    }

    tracing::debug!(parser = "primegov", items = items.len(), "parsed html agenda");
    ParsedAgenda {
        items,
        participation,
    }
}

fn parse_item_blocks(document: &Html, base_url: &str) -> Vec<ItemRecord> {
    let block_sel = sel("div.agenda-item[data-item-id]");
    let number_sel = sel(".item-number");
    let title_sel = sel(".item-title");
    let link_sel = sel("a[href]");

    let mut items = Vec::new();
    let mut sequence = 0;

    for block in document.select(&block_sel) {
        let vendor_item_id = block
            .value()
            .attr("data-item-id")
            .unwrap_or_default()
            .to_string();
        let title = block
            .select(&title_sel)
            .next()
            .map(|t| text_of(&t))
            .unwrap_or_default();
        if vendor_item_id.is_empty() || title.is_empty() {
            continue;
        }

        sequence += 1;
        let agenda_number = block
            .select(&number_sel)
            .next()
            .map(|n| text_of(&n))
            .filter(|n| !n.is_empty());

        let attachments = block
            .select(&link_sel)
            .filter_map(|link| attachment_from_link(&link, base_url))
            .collect();

        items.push(ItemRecord {
            vendor_item_id,
            title,
            sequence,
            agenda_number,
            attachments,
            ..Default::default()
        });
    }

    items
}

fn parse_item_table(document: &Html, base_url: &str) -> Vec<ItemRecord> {
    let row_sel = sel("table tr");
    let cell_sel = sel("td");
    let link_sel = sel("a[href]");

    let mut items = Vec::new();
    let mut sequence = 0;

    for row in document.select(&row_sel) {
        let cells: Vec<ElementRef> = row.select(&cell_sel).collect();
        if cells.len() < 2 {
            continue;
        }

        let number = text_of(&cells[0]);
        if !AGENDA_NUMBER.is_match(&number) {
            continue;
        }
        let title = text_of(&cells[1]);
        if title.is_empty() {
            continue;
        }

        sequence += 1;
        let attachments = row
            .select(&link_sel)
            .filter_map(|link| attachment_from_link(&link, base_url))
            .collect();

        items.push(ItemRecord {
            vendor_item_id: sequence.to_string(),
            title,
            sequence,
            agenda_number: Some(number),
            attachments,
            ..Default::default()
        });
    }

    items
}

fn attachment_from_link(link: &ElementRef, base_url: &str) -> Option<AttachmentRecord> {
    let href = link.value().attr("href")?;
    let lower = href.to_lowercase();
    let is_attachment = lower.contains("historyattachment")
        || lower.contains("compiledocument")
        || lower.ends_with(".pdf");
    if !is_attachment {
        return None;
    }
    let name = {
        let text = text_of(link);
        if text.is_empty() {
            "Attachment".to_string()
        } else {
            text
        }
    };
    let mut record = AttachmentRecord::new(name, absolutize(base_url, href));
    // Download-API links carry no extension; they serve PDFs.
    if record.attachment_type == db::models::AttachmentType::Unknown {
        record.attachment_type = db::models::AttachmentType::Pdf;
    }
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGENDA: &str = r#"
        <html><body>
          <p>Public comments: city.clerk@cityofpaloalto.org</p>
          <div class="agenda-item" data-item-id="9001">
            <span class="item-number">1.A.</span>
            <span class="item-title">Adopt RES-2025-123 approving the budget</span>
            <a href="/api/compilemeetingattachmenthistory/historyattachment/?historyId=abc">Staff Report</a>
          </div>
          <div class="agenda-item" data-item-id="9002">
            <span class="item-number">2.</span>
            <span class="item-title">Housing element update</span>
          </div>
        </body></html>
    "#;

    #[test]
    fn item_blocks_parse_with_attachments() {
        let parsed = parse_html_agenda(AGENDA, "https://cityofpaloalto.primegov.com");
        assert_eq!(parsed.items.len(), 2);

        let first = &parsed.items[0];
        assert_eq!(first.vendor_item_id, "9001");
        assert_eq!(first.agenda_number.as_deref(), Some("1.A."));
        assert_eq!(first.attachments.len(), 1);
        assert!(first.attachments[0]
            .url
            .starts_with("https://cityofpaloalto.primegov.com/api/"));
        assert_eq!(first.attachments[0].attachment_type, db::models::AttachmentType::Pdf);

        assert_eq!(
            parsed.participation.unwrap().email.as_deref(),
            Some("city.clerk@cityofpaloalto.org")
        );
    }

    #[test]
    fn table_fallback_parses_numbered_rows() {
        let html = r#"
            <table>
              <tr><td>1.</td><td>Approve the consent calendar</td></tr>
              <tr><td>not-a-number</td><td>skipped</td></tr>
              <tr><td>2.A.</td><td>Appeal hearing <a href="/docs/appeal.pdf">Appeal</a></td></tr>
            </table>
        "#;
        let parsed = parse_html_agenda(html, "https://x.primegov.com");
        assert_eq!(parsed.items.len(), 2);
        assert_eq!(parsed.items[1].agenda_number.as_deref(), Some("2.A."));
        assert_eq!(parsed.items[1].attachments.len(), 1);
    }
}
