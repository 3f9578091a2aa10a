//! Matter-file extraction from item titles.
//!
//! Cities print case numbers in their own house styles: `BOA-0039-2025`,
//! `RES-2025-123`, `CUP25-00022`, `BB107`, Cambridge's `COF 2025 #141`.
//! The ladder tries explicit hyphenated patterns first, then known
//! separator styles that normalize into the hyphenated form.

use once_cell::sync::Lazy;
use regex::Regex;

/// Explicit patterns, most specific first. Each captures the full case
/// number in group 1.
static EXPLICIT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // BOA-0039-2025, RES-2025-123, CUP-25-0022
        r"\b([A-Z]{2,5}-\d{2,5}-\d{2,5})\b",
        // CUP25-00022, AB2334-2024 style: letters glued to first number
        r"\b([A-Z]{2,5}\d{2}-\d{3,6})\b",
        // Ordinance/resolution number with year prefix: 2025-0123
        r"\b(\d{4}-\d{3,5})\b",
        // Compact letter+digit ids: BB107, HB1234
        r"\b([A-Z]{2,4}\d{2,5})\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

// COF 2025 #141 → COF-2025-141
static SEPARATOR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Z]{2,5})\s+(\d{4})\s+#(\d+)").expect("static regex"));

/// Extract a matter file from an item title, normalized to hyphenated
/// form. Returns `None` when no recognizable case number appears.
pub fn extract_matter_file(title: &str) -> Option<String> {
    if let Some(caps) = SEPARATOR_PATTERN.captures(title) {
        return Some(format!("{}-{}-{}", &caps[1], &caps[2], &caps[3]));
    }
    for pattern in EXPLICIT_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(title) {
            return Some(caps[1].to_string());
        }
    }
    None
}

/// Expand a matter-file prefix to a matter type, when the prefix is one
/// of the well-known ones.
pub fn matter_type_from_prefix(matter_file: &str) -> Option<&'static str> {
    let prefix: String = matter_file
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_uppercase();

    let matter_type = match prefix.as_str() {
        "RES" => "Resolution",
        "ORD" => "Ordinance",
        "BOA" => "Board of Adjustment",
        "CUP" => "Conditional Use Permit",
        "SUP" => "Special Use Permit",
        "ZTA" => "Zoning Text Amendment",
        "CPA" => "Comprehensive Plan Amendment",
        "PUD" => "Planned Unit Development",
        "VAR" => "Variance",
        "APP" => "Appeal",
        "COF" => "Communication From",
        "POR" => "Policy Order",
        "MIN" => "Minutes",
        "PROC" => "Proclamation",
        _ => return None,
    };
    Some(matter_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_hyphenated_case_numbers() {
        assert_eq!(
            extract_matter_file("BOA-0039-2025: Variance request for 12 Elm"),
            Some("BOA-0039-2025".to_string())
        );
        assert_eq!(
            extract_matter_file("Adopt RES-2025-123 approving the budget"),
            Some("RES-2025-123".to_string())
        );
        assert_eq!(
            extract_matter_file("CUP25-00022 - Drive-through addition"),
            Some("CUP25-00022".to_string())
        );
    }

    #[test]
    fn normalizes_separator_style() {
        assert_eq!(
            extract_matter_file("COF 2025 #141 : Communication from the City Manager"),
            Some("COF-2025-141".to_string())
        );
    }

    #[test]
    fn extracts_compact_ids() {
        assert_eq!(extract_matter_file("BB107 Second Reading"), Some("BB107".to_string()));
    }

    #[test]
    fn plain_titles_yield_none() {
        assert_eq!(extract_matter_file("Public Hearing on the Housing Element"), None);
        assert_eq!(extract_matter_file(""), None);
    }

    #[test]
    fn type_prefix_lookup() {
        assert_eq!(matter_type_from_prefix("RES-2025-123"), Some("Resolution"));
        assert_eq!(matter_type_from_prefix("BOA-0039-2025"), Some("Board of Adjustment"));
        assert_eq!(matter_type_from_prefix("XYZ-1-2"), None);
    }
}
