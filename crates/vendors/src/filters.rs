//! Item and matter filtering.
//!
//! Agendas are padded with procedural business (roll call, pledge,
//! minutes approval) that has no summarization value. The filter drops
//! those by title pattern, with one hard rule: an item carrying a matter
//! reference is never dropped, because matter tracking must see every
//! appearance.

/// Procedural business: openings, closings, process votes.
const PROCEDURAL_PATTERNS: &[&str] = &[
    "roll call",
    "call to order",
    "pledge of allegiance",
    "adjournment",
    "adjourn",
    "approval of minutes",
    "approval of the minutes",
    "approve minutes",
    "minutes approval",
    "approval of agenda",
    "adoption of agenda",
    "agenda review",
    "agenda changes",
    "public comment",
    "oral communications",
    "invocation",
    "flag salute",
    "closed session report",
    "future agenda items",
    "announcements",
];

/// Ceremonial business: honors and observances.
const CEREMONIAL_PATTERNS: &[&str] = &[
    "proclamation",
    "commendation",
    "presentation of",
    "recognition of",
    "certificate of appreciation",
    "swearing in",
    "oath of office",
    "moment of silence",
];

/// Administrative scaffolding around the meeting itself.
const ADMINISTRATIVE_PATTERNS: &[&str] = &[
    "city manager's report",
    "city manager report",
    "committee reports",
    "council member reports",
    "staff report only",
    "informational report",
    "consent calendar approval",
    "reading of the journal",
];

/// Matter types that exist for process reasons and are not tracked.
const SKIP_MATTER_TYPES: &[&str] = &[
    "minutes",
    "agenda",
    "proclamation",
    "commendation",
    "appointment",
    "communication",
    "ceremonial",
    "presentation",
    "oath",
];

/// True when an item is procedural/ceremonial/administrative noise.
///
/// Items with a matter reference are retained regardless of title; the
/// caller checks that before consulting this.
pub fn should_skip_item(title: &str, item_type: &str) -> bool {
    let title = title.trim().to_lowercase();
    if title.is_empty() {
        return true;
    }

    let type_lower = item_type.trim().to_lowercase();
    if !type_lower.is_empty() && SKIP_MATTER_TYPES.iter().any(|t| type_lower.contains(t)) {
        return true;
    }

    PROCEDURAL_PATTERNS
        .iter()
        .chain(CEREMONIAL_PATTERNS)
        .chain(ADMINISTRATIVE_PATTERNS)
        .any(|p| title.contains(p))
}

/// Apply the shared filter to an adapter's extracted items.
pub fn filter_items(items: Vec<crate::adapter::ItemRecord>) -> Vec<crate::adapter::ItemRecord> {
    let before = items.len();
    let kept: Vec<_> = items
        .into_iter()
        .filter(|item| {
            item.has_matter_reference()
                || !should_skip_item(&item.title, item.matter_type.as_deref().unwrap_or(""))
        })
        .collect();
    let dropped = before - kept.len();
    if dropped > 0 {
        tracing::debug!(dropped, kept = kept.len(), "filtered procedural items");
    }
    kept
}

/// True when a matter type is in the administrative skip set; such
/// matters are stored as items but not tracked.
pub fn should_skip_matter(matter_type: &str) -> bool {
    let lower = matter_type.trim().to_lowercase();
    if lower.is_empty() {
        return false;
    }
    SKIP_MATTER_TYPES.iter().any(|t| lower.contains(t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ItemRecord;

    #[test]
    fn procedural_titles_are_skipped() {
        assert!(should_skip_item("Roll Call", ""));
        assert!(should_skip_item("Approval of Minutes - January 12", ""));
        assert!(should_skip_item("PLEDGE OF ALLEGIANCE", ""));
        assert!(should_skip_item("Proclamation Honoring Arbor Day", ""));
        assert!(!should_skip_item("Adopt Ordinance Rezoning 123 Main St", ""));
    }

    #[test]
    fn matter_reference_survives_the_filter() {
        let procedural_with_matter = ItemRecord {
            vendor_item_id: "1".to_string(),
            title: "Approval of Minutes".to_string(),
            matter_file: Some("MIN-2025-01".to_string()),
            ..Default::default()
        };
        let procedural_plain = ItemRecord {
            vendor_item_id: "2".to_string(),
            title: "Approval of Minutes".to_string(),
            ..Default::default()
        };
        let kept = filter_items(vec![procedural_with_matter, procedural_plain]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].vendor_item_id, "1");
    }

    #[test]
    fn skip_matter_types() {
        assert!(should_skip_matter("Minutes"));
        assert!(should_skip_matter("Ceremonial Item"));
        assert!(!should_skip_matter("Resolution"));
        assert!(!should_skip_matter(""));
    }
}
