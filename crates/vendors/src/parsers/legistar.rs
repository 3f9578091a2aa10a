//! Legistar HTML parsing.
//!
//! Used on the HTML fallback path (API down or empty) and for per-matter
//! attachment discovery on `LegislationDetail.aspx`.

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::adapter::AttachmentRecord;
use crate::dates::combine_date_time;
use crate::parsers::{absolutize, text_of};

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// Extract attachments from a `LegislationDetail.aspx` page.
///
/// Primary strategy targets the exact ASP.NET control ids Legistar
/// renders today; the fallback accepts any `View.ashx` link on the page.
pub fn parse_legislation_attachments(html: &str, base_url: &str) -> Vec<AttachmentRecord> {
    let document = Html::parse_document(html);

    let primary_sel = sel(
        "table#ctl00_ContentPlaceHolder1_tblAttachments \
         span#ctl00_ContentPlaceHolder1_lblAttachments2 a[href]",
    );
    let mut links: Vec<ElementRef> = document.select(&primary_sel).collect();

    if links.is_empty() {
        let fallback_sel = sel("a[href*=\"View.ashx\"]");
        links = document.select(&fallback_sel).collect();
        if !links.is_empty() {
            tracing::warn!(parser = "legistar", "using fallback selector for attachments");
        }
    }

    let mut attachments = Vec::new();
    for link in links {
        let href = link.value().attr("href").unwrap_or("");
        let name = text_of(&link);
        if href.is_empty() || name.is_empty() {
            continue;
        }
        attachments.push(AttachmentRecord::new(name, absolutize(base_url, href)));
    }

    tracing::debug!(
        parser = "legistar",
        attachment_count = attachments.len(),
        "found attachments"
    );
    attachments
}

static AGENDA_PDF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"href="([^"]*Agenda\.pdf[^"]*)""#).expect("static regex"));

/// Find an agenda PDF link on a `MeetingDetail.aspx` page.
pub fn find_agenda_pdf_link(html: &str, base_url: &str) -> Option<String> {
    AGENDA_PDF
        .captures(html)
        .map(|caps| absolutize(base_url, &caps[1]))
}

/// One row of the `Calendar.aspx` grid.
#[derive(Debug, Clone)]
pub struct CalendarRow {
    pub body_name: String,
    pub start: Option<NaiveDateTime>,
    pub detail_url: Option<String>,
    pub agenda_url: Option<String>,
}

/// Parse the `Calendar.aspx` meeting grid (the HTML fallback listing).
pub fn parse_calendar_listing(html: &str, base_url: &str) -> Vec<CalendarRow> {
    let document = Html::parse_document(html);
    let row_sel = sel("tr.rgRow, tr.rgAltRow");
    let cell_sel = sel("td");
    let link_sel = sel("a[href]");

    let mut rows = Vec::new();

    for row in document.select(&row_sel) {
        let cells: Vec<ElementRef> = row.select(&cell_sel).collect();
        if cells.len() < 2 {
            continue;
        }

        let body_name = text_of(&cells[0]);
        if body_name.is_empty() {
            continue;
        }

        // Grid layout: body, date, (icon), time, location, details...
        let date_text = cells.get(1).map(|c| text_of(c)).unwrap_or_default();
        let time_text = cells
            .iter()
            .skip(2)
            .map(text_of)
            .find(|t| t.contains("AM") || t.contains("PM"));
        let start = combine_date_time(&date_text, time_text.as_deref());

        let mut detail_url = None;
        let mut agenda_url = None;
        for link in row.select(&link_sel) {
            let href = link.value().attr("href").unwrap_or("");
            if href.contains("MeetingDetail.aspx") && detail_url.is_none() {
                detail_url = Some(absolutize(base_url, href));
            } else if href.contains("View.ashx") && agenda_url.is_none() {
                agenda_url = Some(absolutize(base_url, href));
            }
        }

        rows.push(CalendarRow {
            body_name,
            start,
            detail_url,
            agenda_url,
        });
    }

    tracing::debug!(parser = "legistar", row_count = rows.len(), "parsed calendar listing");
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_attachment_selector_wins() {
        let html = r#"
            <table id="ctl00_ContentPlaceHolder1_tblAttachments"><tr><td>
              <span id="ctl00_ContentPlaceHolder1_lblAttachments2">
                <a href="View.ashx?M=F&ID=101">Staff Report.pdf</a>
                <a href="View.ashx?M=F&ID=102">Ordinance Text.docx</a>
              </span>
            </td></tr></table>
            <a href="View.ashx?M=F&ID=999">Unrelated</a>
        "#;
        let attachments =
            parse_legislation_attachments(html, "https://seattle.legistar.com/LegislationDetail.aspx");
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0].name, "Staff Report.pdf");
        assert!(attachments[0].url.contains("ID=101"));
    }

    #[test]
    fn fallback_accepts_any_view_ashx_link() {
        let html = r#"<div><a href="View.ashx?M=F&ID=7">Attachment A</a></div>"#;
        let attachments = parse_legislation_attachments(html, "https://x.legistar.com/d.aspx");
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].url, "https://x.legistar.com/View.ashx?M=F&ID=7");
    }

    #[test]
    fn calendar_rows_parse_dates_and_links() {
        let html = r#"
            <table><tbody>
              <tr class="rgRow">
                <td><a href="MeetingDetail.aspx?ID=1&GUID=AAA">City Council</a></td>
                <td>2/24/2026</td>
                <td></td>
                <td>6:00 PM</td>
                <td><a href="View.ashx?M=A&ID=55">Agenda</a></td>
              </tr>
            </tbody></table>
        "#;
        let rows = parse_calendar_listing(html, "https://seattle.legistar.com/Calendar.aspx");
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.body_name, "City Council");
        let start = row.start.unwrap();
        assert_eq!(start.format("%Y-%m-%d %H:%M").to_string(), "2026-02-24 18:00");
        assert!(row.detail_url.as_deref().unwrap().contains("MeetingDetail.aspx"));
        assert!(row.agenda_url.as_deref().unwrap().contains("View.ashx"));
    }

    #[test]
    fn agenda_pdf_link_discovery() {
        let html = r#"<a href="Meetings/Council/Agenda.pdf?x=1">Agenda</a>"#;
        let url = find_agenda_pdf_link(html, "https://seattle.legistar.com/MeetingDetail.aspx");
        assert_eq!(url.as_deref(), Some("https://seattle.legistar.com/Meetings/Council/Agenda.pdf?x=1"));
    }
}
