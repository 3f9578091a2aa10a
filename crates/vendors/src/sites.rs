//! Static vendor site configuration, checked in under `data/`.
//!
//! Granicus and OnBase cities cannot be discovered mechanically; their
//! listing endpoints are keyed by opaque view ids or bespoke site paths
//! maintained by hand. A city missing from its mapping fails at adapter
//! construction.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use common::{ConfigError, Vendor};
use serde::de::DeserializeOwned;

use crate::error::VendorError;

pub const GRANICUS_VIEW_IDS_FILE: &str = "granicus_view_ids.json";
pub const ONBASE_SITES_FILE: &str = "onbase_sites.json";
pub const CIVICENGAGE_SITES_FILE: &str = "civicengage_sites.json";

/// Loaded static site mappings.
#[derive(Debug, Clone, Default)]
pub struct SiteConfigs {
    /// `https://{slug}.granicus.com` → ViewPublisher view id.
    granicus_view_ids: HashMap<String, u32>,
    /// City banana → list of OnBase host+path strings.
    onbase_sites: HashMap<String, Vec<String>>,
    /// Slug → CivicEngage category id override.
    civicengage_categories: HashMap<String, u32>,
}

impl SiteConfigs {
    /// Load all mappings from the data directory. The Granicus and
    /// OnBase files are required; the CivicEngage overrides are optional.
    pub fn load(data_dir: &Path) -> Result<Self, ConfigError> {
        Ok(Self {
            granicus_view_ids: read_json(&data_dir.join(GRANICUS_VIEW_IDS_FILE), true)?,
            onbase_sites: read_json(&data_dir.join(ONBASE_SITES_FILE), true)?,
            civicengage_categories: read_json(&data_dir.join(CIVICENGAGE_SITES_FILE), false)?,
        })
    }

    /// View id for a Granicus base URL; construction error when missing.
    pub fn granicus_view_id(&self, base_url: &str) -> Result<u32, VendorError> {
        self.granicus_view_ids.get(base_url).copied().ok_or_else(|| {
            VendorError::config(
                Vendor::Granicus,
                format!("view_id not configured for {base_url}; add mapping to {GRANICUS_VIEW_IDS_FILE}"),
            )
        })
    }

    /// OnBase site paths for a city; construction error when missing.
    pub fn onbase_sites(&self, banana: &str) -> Result<&[String], VendorError> {
        self.onbase_sites
            .get(banana)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                VendorError::config(
                    Vendor::OnBase,
                    format!("no site configured for {banana}; add mapping to {ONBASE_SITES_FILE}"),
                )
            })
    }

    /// CivicEngage category override, when one exists.
    pub fn civicengage_category(&self, slug: &str) -> Option<u32> {
        self.civicengage_categories.get(slug).copied()
    }

    /// Test-only constructor.
    pub fn from_parts(
        granicus_view_ids: HashMap<String, u32>,
        onbase_sites: HashMap<String, Vec<String>>,
        civicengage_categories: HashMap<String, u32>,
    ) -> Self {
        Self {
            granicus_view_ids,
            onbase_sites,
            civicengage_categories,
        }
    }
}

fn read_json<T: DeserializeOwned + Default>(path: &PathBuf, required: bool) -> Result<T, ConfigError> {
    let display = path.display().to_string();
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) if !required => return Ok(T::default()),
        Err(e) => return Err(ConfigError::file(display, format!("not readable: {e}"))),
    };
    serde_json::from_str(&raw).map_err(|e| ConfigError::file(display, format!("invalid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_granicus_mapping_is_a_config_error() {
        let configs = SiteConfigs::default();
        let err = configs.granicus_view_id("https://cambridge.granicus.com");
        assert!(matches!(err, Err(VendorError::Config { .. })));
    }

    #[test]
    fn lookups_hit_loaded_mappings() {
        let configs = SiteConfigs::from_parts(
            HashMap::from([("https://cambridge.granicus.com".to_string(), 42u32)]),
            HashMap::from([(
                "portlandOR".to_string(),
                vec!["onbase.portland.gov/agenda".to_string()],
            )]),
            HashMap::from([("auroraco".to_string(), 7u32)]),
        );
        assert_eq!(configs.granicus_view_id("https://cambridge.granicus.com").unwrap(), 42);
        assert_eq!(configs.onbase_sites("portlandOR").unwrap().len(), 1);
        assert_eq!(configs.civicengage_category("auroraco"), Some(7));
        assert_eq!(configs.civicengage_category("other"), None);
    }
}
