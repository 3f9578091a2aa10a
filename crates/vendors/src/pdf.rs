//! PDF agenda support.
//!
//! Text extraction itself is an external concern behind
//! [`PdfTextExtractor`]; this module owns the structural parser that
//! turns extracted packet text into agenda items with hyperlinked
//! attachments (Menlo Park, some Municode cities).

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::adapter::{AttachmentRecord, ItemRecord};

/// A hyperlink recovered from a PDF, with the text it annotates.
#[derive(Debug, Clone)]
pub struct PdfLink {
    pub text: String,
    pub url: String,
}

/// Extracted text plus embedded links for one PDF.
#[derive(Debug, Clone, Default)]
pub struct PdfContent {
    pub text: String,
    pub links: Vec<PdfLink>,
}

/// External PDF text extraction boundary. The production implementation
/// wraps a PDF library; tests substitute fixtures.
#[async_trait]
pub trait PdfTextExtractor: Send + Sync {
    async fn extract(&self, pdf_bytes: &[u8]) -> Result<PdfContent, String>;
}

// Items look like "J1. Adopt an ordinance ... (Staff Report #25-167-CC)";
// sections are single letters: "J. Consent Calendar".
static ITEM_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z])(\d{1,2})\.\s+(.+)$").expect("static regex"));
static SECTION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z])\.\s+(.+)$").expect("static regex"));
static ATTACHMENT_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\((Attachment[^)]*|Staff Report[^)]*|Presentation[^)]*|Exhibit[^)]*)\)")
        .expect("static regex")
});

/// Parse a letter-sectioned agenda packet ("H1.", "J1.", "K2." items)
/// into item records, attaching hyperlinks whose annotation text matches
/// the item's attachment references.
pub fn parse_structured_agenda(content: &PdfContent) -> Vec<ItemRecord> {
    let mut items: Vec<ItemRecord> = Vec::new();
    let mut current_section: Option<String> = None;
    let mut sequence = 0;

    for raw_line in content.text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = ITEM_LINE.captures(line) {
            sequence += 1;
            let agenda_number = format!("{}{}.", &caps[1], &caps[2]);
            let raw_title = caps[3].trim().to_string();

            let mut attachments = Vec::new();
            for reference in ATTACHMENT_REF.captures_iter(&raw_title) {
                let name = reference[1].trim().to_string();
                if let Some(link) = find_link_for(&content.links, &name) {
                    attachments.push(AttachmentRecord::new(name, link));
                }
            }
            let title = ATTACHMENT_REF.replace_all(&raw_title, "").trim().to_string();

            items.push(ItemRecord {
                vendor_item_id: agenda_number.trim_end_matches('.').to_lowercase(),
                title,
                sequence,
                agenda_number: Some(agenda_number),
                section: current_section.clone(),
                attachments,
                ..Default::default()
            });
        } else if let Some(caps) = SECTION_LINE.captures(line) {
            current_section = Some(caps[2].trim().to_string());
        } else if let Some(last) = items.last_mut() {
            // Continuation lines extend the previous item's title until
            // the next numbered line, a common artifact of PDF text flow.
            if !SECTION_LINE.is_match(line) && line.len() > 3 && items_continues(line) {
                last.title.push(' ');
                last.title.push_str(line);
            }
        }
    }

    items
}

fn items_continues(line: &str) -> bool {
    // Page furniture is all-caps or page numbers; real continuations are
    // sentence-like.
    !line.chars().all(|c| c.is_uppercase() || !c.is_alphabetic())
        && !line.starts_with("Page ")
}

fn find_link_for(links: &[PdfLink], annotation: &str) -> Option<String> {
    let needle = annotation.to_lowercase();
    links
        .iter()
        .find(|l| {
            let text = l.text.to_lowercase();
            text.contains(&needle) || needle.contains(text.trim())
        })
        .map(|l| l.url.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_letter_sectioned_agenda() {
        let content = PdfContent {
            text: "\
J. Consent Calendar
J1. Waive the second reading and adopt an ordinance amending the zoning map (Staff Report #25-167-CC)
J2. Approve the five-year capital improvement plan (Attachment A)
K. Regular Business
K1. Consider appeal of the planning commission decision
"
            .to_string(),
            links: vec![
                PdfLink {
                    text: "Staff Report #25-167-CC".to_string(),
                    url: "https://menlopark.gov/files/25-167.pdf".to_string(),
                },
                PdfLink {
                    text: "Attachment A".to_string(),
                    url: "https://menlopark.gov/files/cip.pdf".to_string(),
                },
            ],
        };

        let items = parse_structured_agenda(&content);
        assert_eq!(items.len(), 3);

        assert_eq!(items[0].agenda_number.as_deref(), Some("J1."));
        assert_eq!(items[0].section.as_deref(), Some("Consent Calendar"));
        assert_eq!(items[0].attachments.len(), 1);
        assert_eq!(items[0].attachments[0].url, "https://menlopark.gov/files/25-167.pdf");
        assert!(!items[0].title.contains("Staff Report"));

        assert_eq!(items[1].attachments[0].url, "https://menlopark.gov/files/cip.pdf");

        assert_eq!(items[2].agenda_number.as_deref(), Some("K1."));
        assert_eq!(items[2].section.as_deref(), Some("Regular Business"));
        assert!(items[2].attachments.is_empty());
    }

    #[test]
    fn empty_text_yields_no_items() {
        assert!(parse_structured_agenda(&PdfContent::default()).is_empty());
    }
}
