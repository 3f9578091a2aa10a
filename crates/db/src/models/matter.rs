//! Matter (tracked legislation) models.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::AttachmentInfo;

/// Typed slice of the matter metadata JSONB column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatterMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    /// Meeting the matter was first extracted from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_meeting_id: Option<String>,
}

/// A legislative matter tracked across meetings within one city.
///
/// Created on first sighting, never deleted. `status` is an open set
/// ("active", "passed", "failed", "tabled", "withdrawn", ...) because
/// vendors invent dispositions freely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Matter {
    pub id: String,
    pub banana: String,
    /// Vendor-native opaque id, when the vendor has one.
    pub matter_id: Option<String>,
    /// Human-readable case number ("RES-2025-123").
    pub matter_file: Option<String>,
    /// Derived from the matter-file prefix ("Resolution").
    pub matter_type: Option<String>,
    pub title: String,
    #[serde(default)]
    pub sponsors: Vec<String>,
    /// Written by the external summarization processor.
    pub canonical_summary: Option<String>,
    #[serde(default)]
    pub canonical_topics: Vec<String>,
    /// Snapshot from the most recent appearance.
    #[serde(default)]
    pub attachments: Vec<AttachmentInfo>,
    pub metadata: Option<MatterMetadata>,
    pub first_seen: Option<NaiveDateTime>,
    pub last_seen: Option<NaiveDateTime>,
    pub appearance_count: i32,
    pub status: String,
    pub final_vote_date: Option<NaiveDateTime>,
    pub quality_score: Option<f64>,
    #[serde(default)]
    pub rating_count: i32,
}

/// One sighting of a matter on a meeting's agenda.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatterAppearance {
    pub matter_id: String,
    pub meeting_id: String,
    pub item_id: String,
    pub appeared_at: Option<NaiveDateTime>,
    pub committee: Option<String>,
    pub committee_id: Option<String>,
    pub sequence: Option<i32>,
    pub vote_outcome: Option<String>,
    pub vote_tally: Option<serde_json::Value>,
}

/// Matter dispositions that end tracking-relevant activity.
pub const TERMINAL_MATTER_STATUSES: [&str; 4] = ["passed", "failed", "withdrawn", "tabled"];

/// True when a vote outcome should be promoted onto the matter row.
pub fn is_terminal_status(status: &str) -> bool {
    TERMINAL_MATTER_STATUSES.contains(&status)
}
