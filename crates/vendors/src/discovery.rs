//! Domain discovery for CivicPlus/CivicEngage cities.
//!
//! These platforms live on varied hosting: `{slug}.civicplus.com`,
//! custom `.gov`/`.org` domains, sometimes behind `www.`. The first
//! candidate whose probe path answers 2xx with a plausible body wins and
//! is cached for the process lifetime.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::adapter::AdapterCore;
use crate::error::VendorError;

/// Candidate base URLs for a slug, in priority order. A slug that is
/// already a full domain is tried verbatim first.
pub fn candidate_base_urls(slug: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    if slug.contains('.') {
        candidates.push(format!("https://{slug}"));
    }
    candidates.extend([
        format!("https://{slug}.civicplus.com"),
        format!("https://www.{slug}.gov"),
        format!("https://{slug}.gov"),
        format!("https://www.{slug}.org"),
        format!("https://{slug}.org"),
    ]);
    candidates
}

/// Per-slug discovered base URLs, shared across adapter instances.
pub struct DomainCache {
    discovered: RwLock<HashMap<String, String>>,
}

impl DomainCache {
    pub fn new() -> Self {
        Self {
            discovered: RwLock::new(HashMap::new()),
        }
    }

    /// Find the working base URL for a slug by probing `probe_paths` on
    /// each candidate, accepting the first 2xx whose body mentions one of
    /// `body_markers`.
    pub async fn discover(
        &self,
        core: &AdapterCore,
        probe_paths: &[&str],
        body_markers: &[&str],
    ) -> Result<(String, String), VendorError> {
        let slug = core.slug().to_string();

        if let Some(base) = self.discovered.read().await.get(&slug) {
            // Re-probe only the cached base's first path to get the page URL.
            for path in probe_paths {
                if let Ok(body) = core.get_text(&format!("{base}{path}")).await {
                    if body_matches(&body, body_markers) {
                        return Ok((base.clone(), format!("{base}{path}")));
                    }
                }
            }
        }

        for base in candidate_base_urls(&slug) {
            for path in probe_paths {
                let url = format!("{base}{path}");
                let Ok(body) = core.get_text(&url).await else {
                    continue;
                };
                if body_matches(&body, body_markers) {
                    tracing::info!(
                        vendor = %core.vendor(),
                        slug = %slug,
                        base_url = %base,
                        path,
                        "discovered site domain"
                    );
                    self.discovered.write().await.insert(slug, base.clone());
                    return Ok((base, url));
                }
            }
        }

        Err(VendorError::config(
            core.vendor(),
            format!("no working domain found for slug {slug}"),
        ))
    }
}

impl Default for DomainCache {
    fn default() -> Self {
        Self::new()
    }
}

fn body_matches(body: &str, markers: &[&str]) -> bool {
    let lower = body.to_lowercase();
    markers.iter().any(|m| lower.contains(&m.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_domain_slug_is_tried_first() {
        let candidates = candidate_base_urls("cityofithacany.gov");
        assert_eq!(candidates[0], "https://cityofithacany.gov");
    }

    #[test]
    fn clean_slug_prefers_civicplus_subdomain() {
        let candidates = candidate_base_urls("cityofithacany");
        assert_eq!(candidates[0], "https://cityofithacany.civicplus.com");
        assert!(candidates.contains(&"https://www.cityofithacany.gov".to_string()));
    }
}
