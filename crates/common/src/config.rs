//! Runtime configuration loaded from environment variables.
//!
//! All knobs use the `CIVICSYNC_` prefix. Values are validated once at
//! startup; a bad value is a [`ConfigError`], not a warning.

use std::path::PathBuf;

use crate::errors::ConfigError;
use crate::types::Vendor;

/// Process-wide configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL DSN.
    pub database_url: String,
    /// Directory holding static vendor site configs
    /// (`granicus_view_ids.json`, `onbase_sites.json`, ...).
    pub data_dir: PathBuf,
    /// Hours between full sync passes (daemon sync loop).
    pub sync_interval_hours: u64,
    /// Hours the sync loop backs off after an error.
    pub sync_error_backoff_hours: u64,
    /// Seconds between queue polls when the queue is empty.
    pub processing_poll_secs: u64,
    /// Vendors the fetcher is allowed to sync. Narrow this when a vendor
    /// adapter is misbehaving upstream.
    pub enabled_vendors: Vec<Vendor>,
    /// Days of history each adapter requests.
    pub sync_days_back: i64,
    /// Days of future meetings each adapter requests.
    pub sync_days_forward: i64,
    /// API token for the NYC Legistar instance (the one deployment that
    /// requires one).
    pub nyc_legistar_token: Option<String>,
    /// LLM API key handed to the external summarization processor.
    pub llm_api_key: Option<String>,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// `DATABASE_URL` is required; everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::missing("DATABASE_URL"))?;

        let data_dir = std::env::var("CIVICSYNC_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));

        let sync_interval_hours = parse_var("CIVICSYNC_SYNC_INTERVAL_HOURS", 168)?;
        let sync_error_backoff_hours = parse_var("CIVICSYNC_SYNC_ERROR_BACKOFF_HOURS", 48)?;
        let processing_poll_secs = parse_var("CIVICSYNC_PROCESSING_POLL_SECS", 30)?;
        let sync_days_back = parse_var("CIVICSYNC_SYNC_DAYS_BACK", 7)?;
        let sync_days_forward = parse_var("CIVICSYNC_SYNC_DAYS_FORWARD", 14)?;

        let enabled_vendors = match std::env::var("CIVICSYNC_ENABLED_VENDORS") {
            Ok(raw) if !raw.trim().is_empty() => parse_vendor_list(&raw)?,
            _ => Vendor::ALL.to_vec(),
        };

        let config = Self {
            database_url,
            data_dir,
            sync_interval_hours,
            sync_error_backoff_hours,
            processing_poll_secs,
            enabled_vendors,
            sync_days_back,
            sync_days_forward,
            nyc_legistar_token: optional_var("NYC_LEGISTAR_TOKEN"),
            llm_api_key: optional_var("LLM_API_KEY"),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sync_interval_hours == 0 {
            return Err(ConfigError::invalid(
                "CIVICSYNC_SYNC_INTERVAL_HOURS",
                "must be positive",
            ));
        }
        if self.sync_days_back < 0 || self.sync_days_forward < 0 {
            return Err(ConfigError::invalid(
                "CIVICSYNC_SYNC_DAYS_BACK/FORWARD",
                "must be non-negative",
            ));
        }
        if self.enabled_vendors.is_empty() {
            return Err(ConfigError::invalid(
                "CIVICSYNC_ENABLED_VENDORS",
                "at least one vendor must be enabled",
            ));
        }
        if self.llm_api_key.is_none() {
            tracing::warn!("no LLM API key configured - summarization will be disabled");
        }
        Ok(())
    }
}

fn optional_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid(key, format!("unparseable value {raw:?}"))),
        Err(_) => Ok(default),
    }
}

fn parse_vendor_list(raw: &str) -> Result<Vec<Vendor>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|tag| {
            Vendor::parse(tag).ok_or_else(|| {
                ConfigError::invalid("CIVICSYNC_ENABLED_VENDORS", format!("unknown vendor {tag:?}"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_list_parses_mixed_case_and_whitespace() {
        let vendors = parse_vendor_list("primegov, Legistar ,IQM2").unwrap();
        assert_eq!(
            vendors,
            vec![Vendor::Primegov, Vendor::Legistar, Vendor::Iqm2]
        );
    }

    #[test]
    fn vendor_list_rejects_unknown_tags() {
        assert!(parse_vendor_list("primegov,notavendor").is_err());
    }
}
