//! Deterministic identifiers for synced entities.
//!
//! Ids must be stable across syncs: re-ingesting the same upstream record
//! has to produce the same row. Everything here is a pure function of the
//! city banana plus vendor-side identifiers, with a short digest fallback
//! when the vendor gives us nothing usable.

use sha2::{Digest, Sha256};

/// Short hex digest used wherever a vendor lacks a native identifier.
pub fn short_digest(input: &str) -> String {
    let hash = Sha256::digest(input.as_bytes());
    hex::encode(&hash[..4])
}

/// Stable meeting id from the city banana and the vendor's meeting id.
///
/// Vendor ids occasionally contain characters that make poor key material
/// (slashes, whitespace); those fall back to a digest of the raw id.
pub fn meeting_id(banana: &str, vendor_meeting_id: &str) -> String {
    let vendor_id = vendor_meeting_id.trim();
    if vendor_id.is_empty() {
        return format!("{banana}_{}", short_digest(banana));
    }
    if vendor_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        format!("{banana}_{vendor_id}")
    } else {
        format!("{banana}_{}", short_digest(vendor_id))
    }
}

/// Item id unique within a meeting, derived from the vendor's item id.
pub fn item_id(meeting_id: &str, vendor_item_id: &str) -> String {
    let vendor_id = vendor_item_id.trim();
    if vendor_id.is_empty() {
        return format!("{meeting_id}_item_{}", short_digest(meeting_id));
    }
    if vendor_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        format!("{meeting_id}_{vendor_id}")
    } else {
        format!("{meeting_id}_{}", short_digest(vendor_id))
    }
}

/// City-scoped matter id.
///
/// Prefers the human-readable matter file (`paloaltoCA_RES-2025-123`).
/// Without one, falls back to a digest over whatever identifying fields
/// the vendor supplied, so the same matter hashes to the same id on every
/// sync.
pub fn matter_id(
    banana: &str,
    matter_file: Option<&str>,
    vendor_matter_id: Option<&str>,
    title: &str,
) -> String {
    if let Some(file) = matter_file.map(str::trim).filter(|f| !f.is_empty()) {
        let normalized: String = file
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '-' })
            .collect();
        return format!("{banana}_{normalized}");
    }
    if let Some(vendor_id) = vendor_matter_id.map(str::trim).filter(|v| !v.is_empty()) {
        return format!("{banana}_m{}", short_digest(vendor_id));
    }
    format!("{banana}_m{}", short_digest(title))
}

/// Stable digest over an ordered attachment list.
///
/// Sorted by (name, url) before hashing so vendor-side reordering does not
/// register as a change.
pub fn attachment_hash(attachments: &[(String, String)]) -> String {
    let mut pairs: Vec<&(String, String)> = attachments.iter().collect();
    pairs.sort();
    let mut hasher = Sha256::new();
    for (name, url) in pairs {
        hasher.update(name.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(url.as_bytes());
        hasher.update(b"\x1e");
    }
    hex::encode(&hasher.finalize()[..16])
}

/// Change-detection digest for a meeting: identity plus the fields whose
/// change warrants a re-sync of the row.
pub fn meeting_change_digest(
    meeting_id: &str,
    title: &str,
    date: &str,
    packet_url: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(meeting_id.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(title.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(date.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(packet_url.unwrap_or("").as_bytes());
    hex::encode(&hasher.finalize()[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meeting_id_uses_clean_vendor_ids_verbatim() {
        assert_eq!(meeting_id("paloaltoCA", "4521"), "paloaltoCA_4521");
        assert_eq!(meeting_id("paloaltoCA", "abc-12.3"), "paloaltoCA_abc-12.3");
    }

    #[test]
    fn meeting_id_hashes_awkward_vendor_ids() {
        let id = meeting_id("paloaltoCA", "a/b c");
        assert!(id.starts_with("paloaltoCA_"));
        assert_eq!(id, meeting_id("paloaltoCA", "a/b c"));
        assert_ne!(id, meeting_id("paloaltoCA", "a/b d"));
    }

    #[test]
    fn matter_id_prefers_matter_file() {
        assert_eq!(
            matter_id("paloaltoCA", Some("RES-2025-123"), Some("99"), "t"),
            "paloaltoCA_RES-2025-123"
        );
    }

    #[test]
    fn matter_id_is_stable_without_matter_file() {
        let a = matter_id("paloaltoCA", None, Some("99"), "Some title");
        let b = matter_id("paloaltoCA", None, Some("99"), "Other title");
        assert_eq!(a, b, "vendor id outranks title in the fallback");
        let c = matter_id("paloaltoCA", None, None, "Some title");
        assert_eq!(c, matter_id("paloaltoCA", None, None, "Some title"));
    }

    #[test]
    fn attachment_hash_ignores_ordering() {
        let forward = vec![
            ("Staff Report".to_string(), "https://x/1.pdf".to_string()),
            ("Resolution".to_string(), "https://x/2.pdf".to_string()),
        ];
        let reversed: Vec<_> = forward.iter().rev().cloned().collect();
        assert_eq!(attachment_hash(&forward), attachment_hash(&reversed));
    }

    #[test]
    fn attachment_hash_tracks_content() {
        let a = vec![("Report".to_string(), "https://x/1.pdf".to_string())];
        let b = vec![("Report".to_string(), "https://x/2.pdf".to_string())];
        assert_ne!(attachment_hash(&a), attachment_hash(&b));
    }
}
