//! Sponsor extraction and name normalization.
//!
//! Vendors attach sponsor lists in slightly different shapes; titles and
//! honorifics vary per city ("Councilmember Smith", "CM Smith", "Mayor
//! Pro Tem Smith"). Normalization strips them so the same person matches
//! across meetings.

use once_cell::sync::Lazy;
use regex::Regex;

static HONORIFIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:council\s*member|councilmember|councilwoman|councilman|alder(?:man|woman|person)?|supervisor|commissioner|vice\s+mayor|mayor\s+pro\s+tem|mayor|cm\.?|hon\.?)\s+",
    )
    .expect("static regex")
});

/// Normalize a sponsor name for matching: strip honorifics, collapse
/// whitespace, lowercase.
pub fn normalize_sponsor_name(raw: &str) -> String {
    let stripped = HONORIFIC.replace(raw.trim(), "");
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Remove duplicate sponsors by normalized name, preserving the first
/// spelling seen.
pub fn dedupe_sponsors(sponsors: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();
    for sponsor in sponsors {
        let normalized = normalize_sponsor_name(sponsor);
        if normalized.is_empty() {
            continue;
        }
        if seen.insert(normalized) {
            result.push(sponsor.trim().to_string());
        }
    }
    result
}

/// Pull sponsor names out of the shapes vendors use: a list, a single
/// string, or a comma-separated string.
pub fn sponsors_from_value(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(list) => list
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        serde_json::Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn honorifics_are_stripped() {
        assert_eq!(normalize_sponsor_name("Councilmember Pat Burt"), "pat burt");
        assert_eq!(normalize_sponsor_name("Mayor Pro Tem  Lydia Kou"), "lydia kou");
        assert_eq!(normalize_sponsor_name("Vice Mayor Greer Stone"), "greer stone");
        assert_eq!(normalize_sponsor_name("Pat Burt"), "pat burt");
    }

    #[test]
    fn dedupe_matches_across_spellings() {
        let sponsors = vec![
            "Councilmember Pat Burt".to_string(),
            "Pat Burt".to_string(),
            "Greer Stone".to_string(),
        ];
        let deduped = dedupe_sponsors(&sponsors);
        assert_eq!(deduped, vec!["Councilmember Pat Burt", "Greer Stone"]);
    }

    #[test]
    fn sponsors_from_json_shapes() {
        let list = serde_json::json!(["A. Smith", "B. Jones"]);
        assert_eq!(sponsors_from_value(&list), vec!["A. Smith", "B. Jones"]);

        let csv = serde_json::json!("A. Smith, B. Jones");
        assert_eq!(sponsors_from_value(&csv), vec!["A. Smith", "B. Jones"]);

        assert!(sponsors_from_value(&serde_json::json!(42)).is_empty());
    }
}
