//! Municode HTML agenda parsing.
//!
//! Municode's accessible agenda pages are cleanly structured:
//! `<section class="agenda-section">` with an `<h2 class="section-header">`
//! heading, `<ul class="agenda-items">` of `<li>` items, and attachment
//! lists in `<ul class="agenda_item_attachments">` following each item.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::adapter::{AttachmentRecord, ItemRecord};
use crate::parsers::{absolutize, text_of};

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static NUM_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\.\s*").expect("static regex"));

/// Parse a Municode HTML agenda document into items.
pub fn parse_html_agenda(html: &str, base_url: &str) -> Vec<ItemRecord> {
    let document = Html::parse_document(html);
    let section_sel = sel("section.agenda-section");
    let header_sel = sel("h2.section-header");
    let items_ul_sel = sel("ul.agenda-items");
    let num_sel = sel("num");
    let attachment_ul_sel = sel("ul.agenda_item_attachments");
    let attachment_link_sel = sel("li a[href]");

    let mut items: Vec<ItemRecord> = Vec::new();
    let mut sequence = 0;

    for section in document.select(&section_sel) {
        let section_name = section
            .select(&header_sel)
            .next()
            .map(|h| text_of(&h))
            .filter(|t| !t.is_empty());

        let Some(agenda_ul) = section.select(&items_ul_sel).next() else {
            continue;
        };

        // Walk direct children in order: an attachments <ul> annotates the
        // <li> that precedes it.
        for child in agenda_ul.children() {
            let Some(el) = ElementRef::wrap(child) else { continue };

            match el.value().name() {
                "li" => {
                    let full_text = text_of(&el);
                    if full_text.is_empty() {
                        continue;
                    }
                    sequence += 1;

                    let agenda_number = el
                        .select(&num_sel)
                        .next()
                        .map(|n| text_of(&n).trim_end_matches('.').to_string())
                        .unwrap_or_else(|| sequence.to_string());

                    let title = NUM_PREFIX.replace(&full_text, "").trim().to_string();
                    if title.is_empty() {
                        sequence -= 1;
                        continue;
                    }

                    items.push(ItemRecord {
                        vendor_item_id: format!("item_{sequence}"),
                        title,
                        sequence,
                        agenda_number: Some(agenda_number),
                        section: section_name.clone(),
                        ..Default::default()
                    });
                }
                "ul" => {
                    let is_attachments = el
                        .value()
                        .attr("class")
                        .is_some_and(|c| c.contains("agenda_item_attachments"));
                    if !is_attachments {
                        continue;
                    }
                    let Some(current) = items.last_mut() else { continue };
                    for link in el.select(&attachment_link_sel) {
                        let href = link.value().attr("href").unwrap_or("");
                        let name = text_of(&link);
                        if href.is_empty() || name.is_empty() {
                            continue;
                        }
                        current
                            .attachments
                            .push(AttachmentRecord::new(name, absolutize(base_url, href)));
                    }
                }
                _ => {}
            }
        }
    }

    tracing::debug!(parser = "municode", items = items.len(), "parsed municode agenda");
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGENDA: &str = r#"
        <section class="agenda-section">
          <h2 class="section-header"><div><p>ORDINANCES</p></div></h2>
          <ul class="agenda-items">
            <li><div><p><num>1.</num><span>First reading of the noise ordinance</span></p></div></li>
            <ul class="agenda_item_attachments">
              <li><a href="/files/noise.pdf">noise.pdf</a> (0.02 MB)</li>
            </ul>
            <li><div><p><num>2.</num><span>Rezoning petition for Oak Street</span></p></div></li>
          </ul>
        </section>
        <section class="agenda-section">
          <h2 class="section-header"><div><p>RESOLUTIONS</p></div></h2>
          <ul class="agenda-items">
            <li><div><p><num>1.</num><span>Accept the annual audit</span></p></div></li>
          </ul>
        </section>
    "#;

    #[test]
    fn sections_items_and_attachments_parse() {
        let items = parse_html_agenda(AGENDA, "https://columbusga.municodemeetings.com/agenda");
        assert_eq!(items.len(), 3);

        assert_eq!(items[0].section.as_deref(), Some("ORDINANCES"));
        assert_eq!(items[0].agenda_number.as_deref(), Some("1"));
        assert!(items[0].title.contains("noise ordinance"));
        assert_eq!(items[0].attachments.len(), 1);
        assert_eq!(
            items[0].attachments[0].url,
            "https://columbusga.municodemeetings.com/files/noise.pdf"
        );

        assert_eq!(items[1].sequence, 2);
        assert!(items[1].attachments.is_empty());

        assert_eq!(items[2].section.as_deref(), Some("RESOLUTIONS"));
        assert_eq!(items[2].sequence, 3, "sequence is global across sections");
    }

    #[test]
    fn empty_document_parses_to_nothing() {
        assert!(parse_html_agenda("<html></html>", "https://x").is_empty());
    }
}
