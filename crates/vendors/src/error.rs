//! Vendor error taxonomy.

use common::Vendor;
use thiserror::Error;

/// Errors raised while talking to or parsing a vendor platform.
#[derive(Debug, Error)]
pub enum VendorError {
    /// Non-2xx response, timeout, or connection failure.
    #[error("{vendor} HTTP error for {city_slug}: {message} ({url})")]
    Http {
        vendor: Vendor,
        city_slug: String,
        url: String,
        /// Status code when the server answered at all.
        status: Option<u16>,
        message: String,
    },

    /// Well-formed response whose shape does not match expectations.
    #[error("{vendor} parse error for {city_slug}: {message}")]
    Parse {
        vendor: Vendor,
        city_slug: String,
        message: String,
        /// First bytes of the offending body, for the log.
        body_preview: String,
    },

    /// Missing site mapping, missing slug, bad static config. Raised at
    /// adapter construction, never mid-sync.
    #[error("{vendor} configuration error: {message}")]
    Config { vendor: Vendor, message: String },
}

impl VendorError {
    pub fn http(
        vendor: Vendor,
        city_slug: impl Into<String>,
        url: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        VendorError::Http {
            vendor,
            city_slug: city_slug.into(),
            url: url.into(),
            status,
            message: message.into(),
        }
    }

    pub fn parse(
        vendor: Vendor,
        city_slug: impl Into<String>,
        message: impl Into<String>,
        body: &str,
    ) -> Self {
        VendorError::Parse {
            vendor,
            city_slug: city_slug.into(),
            message: message.into(),
            body_preview: body.chars().take(200).collect(),
        }
    }

    pub fn config(vendor: Vendor, message: impl Into<String>) -> Self {
        VendorError::Config {
            vendor,
            message: message.into(),
        }
    }

    /// HTTP status when this is an HTTP error with one.
    pub fn status(&self) -> Option<u16> {
        match self {
            VendorError::Http { status, .. } => *status,
            _ => None,
        }
    }
}
