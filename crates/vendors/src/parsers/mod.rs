//! HTML parsers for vendor agenda and listing pages.
//!
//! Parsers are pure functions over HTML strings so they can be exercised
//! against fixture pages without any HTTP.

pub mod granicus;
pub mod legistar;
pub mod municode;
pub mod primegov;

use scraper::ElementRef;

/// Concatenated, whitespace-collapsed text of an element.
pub(crate) fn text_of(el: &ElementRef) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolve a possibly-relative href against a base URL.
pub(crate) fn absolutize(base_url: &str, href: &str) -> String {
    let href = href.trim();
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    if let Some(rest) = href.strip_prefix("//") {
        return format!("https://{rest}");
    }

    let origin = origin_of(base_url);
    if let Some(path) = href.strip_prefix('/') {
        return format!("{origin}/{path}");
    }

    // Relative to the base's directory.
    let dir = base_url.rsplit_once('/').map(|(d, _)| d).unwrap_or(base_url);
    format!("{dir}/{href}")
}

fn origin_of(url: &str) -> &str {
    let after_scheme = url.find("://").map(|i| i + 3).unwrap_or(0);
    match url[after_scheme..].find('/') {
        Some(i) => &url[..after_scheme + i],
        None => url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolutize_handles_common_shapes() {
        assert_eq!(
            absolutize("https://x.gov/a/b", "https://y.gov/c.pdf"),
            "https://y.gov/c.pdf"
        );
        assert_eq!(
            absolutize("https://x.gov/a/b", "//cdn.x.gov/c.pdf"),
            "https://cdn.x.gov/c.pdf"
        );
        assert_eq!(absolutize("https://x.gov/a/b", "/c.pdf"), "https://x.gov/c.pdf");
        assert_eq!(absolutize("https://x.gov/a/b", "c.pdf"), "https://x.gov/a/c.pdf");
    }
}
