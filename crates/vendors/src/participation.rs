//! Participation info extraction from agenda prose.
//!
//! Agendas bury the how-to-attend details (public comment email, dial-in
//! number, Zoom link) in free text. This scans raw agenda text for them.

use db::models::ParticipationInfo;
use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("static regex"));

// (650) 329-2100, 650-329-2100, 650.329.2100, with optional +1
static PHONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+?1[\s.-]?)?\(?\d{3}\)?[\s.-]\d{3}[\s.-]\d{4}").expect("static regex")
});

static VIRTUAL_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://[^\s<>\x22]*(?:zoom\.us|zoomgov\.com|webex\.com|teams\.microsoft\.com|youtube\.com|youtu\.be|granicus\.com/MediaPlayer)[^\s<>\x22]*")
        .expect("static regex")
});

const HYBRID_MARKERS: &[&str] = &[
    "hybrid",
    "in person and via",
    "in-person and virtual",
    "both in person and",
    "teleconference and in person",
];

/// Scan agenda text for participation details. Returns `None` when
/// nothing useful was found.
pub fn extract_participation(text: &str) -> Option<ParticipationInfo> {
    if text.is_empty() {
        return None;
    }

    let info = ParticipationInfo {
        email: EMAIL.find(text).map(|m| m.as_str().to_string()),
        phone: PHONE.find(text).map(|m| m.as_str().trim().to_string()),
        virtual_url: VIRTUAL_URL
            .find(text)
            .map(|m| m.as_str().trim_end_matches(['.', ',', ')']).to_string()),
        is_hybrid: {
            let lower = text.to_lowercase();
            HYBRID_MARKERS.iter().any(|m| lower.contains(m))
        },
        members: Vec::new(),
    };

    if info.is_empty() {
        None
    } else {
        Some(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_contact_details() {
        let text = "Members of the public may submit comments to \
                    city.clerk@cityofpaloalto.org or call (650) 329-2100. \
                    Join via https://cityofpaloalto.zoom.us/j/362027238 . \
                    This is a hybrid meeting held in person and via teleconference.";
        let info = extract_participation(text).unwrap();
        assert_eq!(info.email.as_deref(), Some("city.clerk@cityofpaloalto.org"));
        assert_eq!(info.phone.as_deref(), Some("(650) 329-2100"));
        assert_eq!(
            info.virtual_url.as_deref(),
            Some("https://cityofpaloalto.zoom.us/j/362027238")
        );
        assert!(info.is_hybrid);
    }

    #[test]
    fn plain_text_yields_none() {
        assert!(extract_participation("Call to order. Roll call.").is_none());
        assert!(extract_participation("").is_none());
    }
}
