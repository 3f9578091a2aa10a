//! Agenda item models.

use serde::{Deserialize, Serialize};

/// Coarse attachment format derived from the URL or vendor metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentType {
    Pdf,
    Doc,
    Xls,
    Ppt,
    Spreadsheet,
    Unknown,
}

impl AttachmentType {
    /// Classify from a file name or URL.
    pub fn from_url(url: &str) -> Self {
        let lower = url.to_ascii_lowercase();
        let path = lower.split(['?', '#']).next().unwrap_or(&lower);
        if path.ends_with(".pdf") {
            AttachmentType::Pdf
        } else if path.ends_with(".doc") || path.ends_with(".docx") {
            AttachmentType::Doc
        } else if path.ends_with(".xls") || path.ends_with(".xlsx") {
            AttachmentType::Xls
        } else if path.ends_with(".ppt") || path.ends_with(".pptx") {
            AttachmentType::Ppt
        } else if path.ends_with(".csv") || path.ends_with(".ods") {
            AttachmentType::Spreadsheet
        } else {
            AttachmentType::Unknown
        }
    }
}

impl Default for AttachmentType {
    fn default() -> Self {
        AttachmentType::Unknown
    }
}

/// A document attached to an agenda item or matter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentInfo {
    pub name: String,
    pub url: String,
    #[serde(rename = "type", default)]
    pub attachment_type: AttachmentType,
}

impl AttachmentInfo {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        let attachment_type = AttachmentType::from_url(&url);
        Self {
            name: name.into(),
            url,
            attachment_type,
        }
    }
}

/// One agenda item within a meeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgendaItem {
    pub id: String,
    pub meeting_id: String,
    pub title: String,
    /// 1-based position on the agenda. Unique within a meeting after
    /// dedup.
    pub sequence: i32,
    #[serde(default)]
    pub attachments: Vec<AttachmentInfo>,
    /// Digest of the ordered (name, url) pairs; see `ids::attachment_hash`.
    pub attachment_hash: Option<String>,
    /// Raw extracted text kept for the summarization processor.
    pub body_text: Option<String>,
    pub matter_id: Option<String>,
    pub matter_file: Option<String>,
    pub matter_type: Option<String>,
    /// Position label as printed on the agenda ("1.A.", "J1.").
    pub agenda_number: Option<String>,
    #[serde(default)]
    pub sponsors: Vec<String>,
    pub summary: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub quality_score: Option<f64>,
    #[serde(default)]
    pub rating_count: i32,
}

impl AgendaItem {
    /// True when the item references a tracked legislative matter.
    pub fn has_matter_reference(&self) -> bool {
        self.matter_id.is_some() || self.matter_file.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_type_from_url() {
        assert_eq!(AttachmentType::from_url("https://x/a.PDF"), AttachmentType::Pdf);
        assert_eq!(AttachmentType::from_url("https://x/a.docx"), AttachmentType::Doc);
        assert_eq!(AttachmentType::from_url("https://x/a.xlsx?dl=1"), AttachmentType::Xls);
        assert_eq!(AttachmentType::from_url("https://x/file"), AttachmentType::Unknown);
    }
}
