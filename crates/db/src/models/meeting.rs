//! Meeting models.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Vendor-published disposition of a meeting, when the agenda says so.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    Cancelled,
    Postponed,
    Deferred,
    Rescheduled,
    Revised,
}

impl MeetingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingStatus::Cancelled => "cancelled",
            MeetingStatus::Postponed => "postponed",
            MeetingStatus::Deferred => "deferred",
            MeetingStatus::Rescheduled => "rescheduled",
            MeetingStatus::Revised => "revised",
        }
    }
}

/// Summarization lifecycle of a meeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Contact/attendance info extracted from agenda prose.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticipationInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_url: Option<String>,
    #[serde(default)]
    pub is_hybrid: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
}

impl ParticipationInfo {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.phone.is_none()
            && self.virtual_url.is_none()
            && !self.is_hybrid
            && self.members.is_empty()
    }
}

/// A public meeting.
///
/// `date` is the vendor-published wall-clock time in local civic time;
/// no timezone conversion is applied anywhere in the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    pub id: String,
    pub banana: String,
    pub title: String,
    pub date: NaiveDateTime,
    /// HTML agenda source of record.
    pub agenda_url: Option<String>,
    /// Alternate agenda documents some vendors publish alongside the
    /// primary one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agenda_sources: Option<serde_json::Value>,
    /// Monolithic PDF packet.
    pub packet_url: Option<String>,
    /// Written by the external summarization processor.
    pub summary: Option<String>,
    pub participation: Option<ParticipationInfo>,
    pub status: Option<MeetingStatus>,
    pub processing_status: ProcessingStatus,
    pub processing_method: Option<String>,
    pub processing_time: Option<f64>,
    pub committee_id: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl Meeting {
    /// The URL summarization is derived from: the agenda when present,
    /// otherwise the packet.
    pub fn source_url(&self) -> Option<&str> {
        self.agenda_url.as_deref().or(self.packet_url.as_deref())
    }
}
