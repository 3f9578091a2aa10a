//! Menlo Park adapter.
//!
//! The city publishes a plain table (date, agenda packet PDF, minutes,
//! video) and the packet PDF is the source of record. Items are recovered
//! from the PDF text via the structural parser; extraction itself lives
//! behind the `PdfTextExtractor` boundary.

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use crate::adapter::{AdapterCore, MeetingRecord, SyncWindow, VendorAdapter};
use crate::dates::parse_civic_date;
use crate::error::VendorError;
use crate::filters::filter_items;
use crate::parsers::{absolutize, text_of};
use crate::pdf::{parse_structured_agenda, PdfTextExtractor};

const BASE_URL: &str = "https://menlopark.gov";

pub struct MenloParkAdapter {
    core: AdapterCore,
    pdf_extractor: Option<Arc<dyn PdfTextExtractor>>,
}

impl MenloParkAdapter {
    pub fn new(core: AdapterCore, pdf_extractor: Option<Arc<dyn PdfTextExtractor>>) -> Self {
        Self {
            core,
            pdf_extractor,
        }
    }

    fn parse_listing(&self, html: &str, window: SyncWindow) -> Vec<(chrono::NaiveDateTime, String)> {
        let document = Html::parse_document(html);
        let row_sel = Selector::parse("tr").expect("static selector");
        let cell_sel = Selector::parse("td").expect("static selector");
        let pdf_link_sel = Selector::parse("a.document[href]").expect("static selector");

        let mut rows = Vec::new();
        for row in document.select(&row_sel) {
            let cells: Vec<ElementRef> = row.select(&cell_sel).collect();
            if cells.len() < 2 {
                continue;
            }

            // "Nov. 4, 2025" — strip the abbreviation dot before parsing.
            let date_text = text_of(&cells[0]).replace(". ", " ");
            let Some(date) = parse_civic_date(&date_text) else { continue };
            if !window.contains(date) {
                continue;
            }

            let Some(link) = cells[1].select(&pdf_link_sel).next() else {
                tracing::debug!(vendor = "menlopark", date = %date_text, "no PDF packet");
                continue;
            };
            let href = link.value().attr("href").unwrap_or("");
            rows.push((date, absolutize(BASE_URL, href)));
        }
        rows
    }
}

#[async_trait]
impl VendorAdapter for MenloParkAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn fetch_meetings_impl(
        &self,
        days_back: i64,
        days_forward: i64,
    ) -> Result<Vec<MeetingRecord>, VendorError> {
        let window = SyncWindow::new(days_back, days_forward);
        let meetings_url = format!("{BASE_URL}/Agendas-and-minutes");
        tracing::info!(vendor = "menlopark", url = %meetings_url, "fetching meetings list");

        let html = self.core.get_text(&meetings_url).await?;
        let listed = self.parse_listing(&html, window);

        let mut meetings = Vec::new();
        for (date, pdf_url) in listed {
            let vendor_id = format!("menlopark_{}", date.format("%Y%m%d"));

            let mut record = MeetingRecord {
                vendor_id: vendor_id.clone(),
                title: "City Council Meeting".to_string(),
                start: Some(date),
                agenda_url: Some(pdf_url.clone()),
                ..Default::default()
            };

            // PDF item extraction is best effort; the meeting stands on
            // its packet URL alone.
            if let Some(extractor) = &self.pdf_extractor {
                match self.core.get(&pdf_url).await {
                    Ok(response) => match response.bytes().await {
                        Ok(bytes) => match extractor.extract(&bytes).await {
                            Ok(content) => {
                                record.items = filter_items(parse_structured_agenda(&content));
                                tracing::info!(
                                    vendor = "menlopark",
                                    meeting_id = %vendor_id,
                                    item_count = record.items.len(),
                                    "extracted items from PDF"
                                );
                            }
                            Err(e) => {
                                tracing::error!(
                                    vendor = "menlopark",
                                    meeting_id = %vendor_id,
                                    error = %e,
                                    "PDF extraction failed"
                                );
                            }
                        },
                        Err(e) => {
                            tracing::warn!(vendor = "menlopark", error = %e, "failed to read PDF body");
                        }
                    },
                    Err(e) => {
                        tracing::warn!(vendor = "menlopark", error = %e, "failed to download PDF");
                    }
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
    use chrono::{Datelike, Local};

    fn adapter() -> MenloParkAdapter {
        let core = AdapterCore::new(Vendor::MenloPark, "menlopark", Arc::new(SessionPool::new())).unwrap();
        MenloParkAdapter::new(core, None)
    }

    #[test]
    fn listing_rows_need_date_and_pdf() {
        let today = Local::now().naive_local();
        let date_text = format!("{} {}, {}", today.format("%b."), today.day(), today.year());

        let html = format!(
            r#"
            <table>
              <tr>
                <td>{date_text}</td>
                <td><a class="document ext-pdf" href="/files/sharedassets/public/agenda.pdf">Agenda packet</a></td>
              </tr>
              <tr><td>Nov. 4, 1999</td><td><a class="document" href="/old.pdf">Old</a></td></tr>
              <tr><td>{date_text}</td><td>No link here</td></tr>
            </table>
            "#
        );
        let rows = adapter().parse_listing(&html, SyncWindow::new(7, 14));
        assert_eq!(rows.len(), 1);
        assert!(rows[0].1.starts_with("https://menlopark.gov/files/"));
    }
}
