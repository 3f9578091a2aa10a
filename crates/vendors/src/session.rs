//! Shared HTTP session pool.
//!
//! One keep-alive client per vendor for the process lifetime. Connection
//! reuse across all cities on the same platform makes syncs several times
//! faster and keeps us under the vendors' connection accounting.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use common::Vendor;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION, USER_AGENT};
use reqwest::Client;

use crate::error::VendorError;

const TOTAL_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const POOL_IDLE_TTL: Duration = Duration::from_secs(300);
const MAX_IDLE_PER_HOST: usize = 5;

/// Browser-like headers; several vendors reject obvious bot traffic.
fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
        ),
    );
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers
}

/// Lazily-built, process-lifetime `reqwest::Client` per vendor.
///
/// Clients are cheap to clone (internally reference counted) and safe for
/// concurrent use. No retry logic lives here; retries are the caller's
/// decision.
pub struct SessionPool {
    clients: Mutex<HashMap<Vendor, Client>>,
    closed: Mutex<bool>,
}

impl SessionPool {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            closed: Mutex::new(false),
        }
    }

    /// Get or create the shared client for a vendor.
    pub fn get(&self, vendor: Vendor) -> Result<Client, VendorError> {
        if *self.closed.lock().expect("session pool lock poisoned") {
            return Err(VendorError::config(vendor, "session pool is closed"));
        }

        let mut clients = self.clients.lock().expect("session pool lock poisoned");
        if let Some(client) = clients.get(&vendor) {
            return Ok(client.clone());
        }

        let mut builder = Client::builder()
            .timeout(TOTAL_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_idle_timeout(POOL_IDLE_TTL)
            .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
            .default_headers(default_headers())
            .gzip(true)
            .redirect(reqwest::redirect::Policy::limited(10));

        // Granicus serves attachments through an S3 redirect whose
        // certificate does not match the redirect host.
        if vendor == Vendor::Granicus {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| VendorError::config(vendor, format!("failed to build client: {e}")))?;

        tracing::debug!(vendor = %vendor, timeout_secs = 30, "created vendor session");
        clients.insert(vendor, client.clone());
        Ok(client)
    }

    /// Drop all clients. Idempotent; `get` fails fast afterwards.
    pub fn close_all(&self) {
        let mut closed = self.closed.lock().expect("session pool lock poisoned");
        if *closed {
            return;
        }
        *closed = true;

        let mut clients = self.clients.lock().expect("session pool lock poisoned");
        let count = clients.len();
        clients.clear();
        tracing::info!(session_count = count, "closed vendor sessions");
    }

    pub fn session_count(&self) -> usize {
        self.clients.lock().expect("session pool lock poisoned").len()
    }
}

impl Default for SessionPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_reuses_client_per_vendor() {
        let pool = SessionPool::new();
        pool.get(Vendor::Primegov).unwrap();
        pool.get(Vendor::Primegov).unwrap();
        pool.get(Vendor::Legistar).unwrap();
        assert_eq!(pool.session_count(), 2);
    }

    #[test]
    fn close_all_is_idempotent_and_fails_fast() {
        let pool = SessionPool::new();
        pool.get(Vendor::Primegov).unwrap();
        pool.close_all();
        pool.close_all();
        assert!(pool.get(Vendor::Primegov).is_err());
        assert_eq!(pool.session_count(), 0);
    }
}
