//! Granicus adapter.
//!
//! Listing comes from `ViewPublisher.php?view_id=N`, where the view id is
//! static configuration per city. Agenda items come from the linked
//! AgendaViewer pages, with attachments behind MetaViewer links.

use async_trait::async_trait;

use crate::adapter::{
    parse_meeting_status, AdapterCore, MeetingRecord, SyncWindow, VendorAdapter,
};
use crate::error::VendorError;
use crate::filters::filter_items;
use crate::parsers::granicus::{parse_agenda_viewer, parse_viewpublisher_listing};
use crate::sites::SiteConfigs;

pub struct GranicusAdapter {
    core: AdapterCore,
    base_url: String,
    list_url: String,
}

impl GranicusAdapter {
    /// Fails at construction when the city has no configured view id.
    pub fn new(core: AdapterCore, sites: &SiteConfigs) -> Result<Self, VendorError> {
        let base_url = format!("https://{}.granicus.com", core.slug());
        let view_id = sites.granicus_view_id(&base_url)?;
        let list_url = format!("{base_url}/ViewPublisher.php?view_id={view_id}");
        tracing::info!(vendor = "granicus", slug = core.slug(), view_id, "adapter initialized");
        Ok(Self {
            core,
            base_url,
            list_url,
        })
    }
}

#[async_trait]
impl VendorAdapter for GranicusAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn fetch_meetings_impl(
        &self,
        days_back: i64,
        days_forward: i64,
    ) -> Result<Vec<MeetingRecord>, VendorError> {
        let window = SyncWindow::new(days_back, days_forward);
        let html = self.core.get_text(&self.list_url).await?;
        let listed = parse_viewpublisher_listing(&html, &self.base_url);

        let mut meetings = Vec::new();
        for entry in listed {
            match entry.start {
                Some(start) if !window.contains(start) => continue,
                None => continue,
                _ => {}
            }

            let mut record = MeetingRecord {
                vendor_id: entry.event_id,
                title: entry.title.clone(),
                start: entry.start,
                agenda_url: Some(entry.agenda_viewer_url.clone()),
                meeting_status: parse_meeting_status(&entry.title, None),
                ..Default::default()
            };

            match self.core.get_text(&entry.agenda_viewer_url).await {
                Ok(agenda_html) => {
                    record.items = filter_items(parse_agenda_viewer(&agenda_html, &self.base_url));
                }
                Err(e) => {
                    tracing::warn!(
                        vendor = "granicus",
                        slug = self.core.slug(),
                        error = %e,
                        "failed to fetch agenda viewer page"
                    );
                }
            }

            meetings.push(record);
        }

        tracing::info!(
            vendor = "granicus",
            slug = self.core.slug(),
            count = meetings.len(),
            "meetings fetched"
        );
        Ok(meetings)
    }
}
