//! Committee and council member models.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A standing body within a city (council, planning commission, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Committee {
    pub id: String,
    pub banana: String,
    pub name: String,
    /// Lowercased, punctuation-stripped name used for matching.
    pub normalized_name: String,
    pub description: Option<String>,
    pub status: String,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

/// A person serving on one or more committees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilMember {
    pub id: String,
    pub banana: String,
    pub name: String,
    pub title: Option<String>,
    pub email: Option<String>,
}

/// Membership with history; `left_at` is null while the seat is held.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitteeMembership {
    pub committee_id: String,
    pub council_member_id: String,
    pub role: Option<String>,
    pub joined_at: Option<NaiveDateTime>,
    pub left_at: Option<NaiveDateTime>,
}

/// Lowercase a committee name and collapse punctuation/whitespace for
/// matching across vendor spelling variants.
pub fn normalize_committee_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_space = true;
    for c in name.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_collapses_punctuation() {
        assert_eq!(
            normalize_committee_name("City Council  - Regular"),
            "city council regular"
        );
        assert_eq!(
            normalize_committee_name("Planning & Transportation Comm."),
            "planning transportation comm"
        );
    }
}
