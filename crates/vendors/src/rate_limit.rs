//! Per-vendor outbound request spacing.
//!
//! Municipal platforms ban aggressive crawlers. Every outbound request
//! goes through [`VendorRateLimiter::wait`], which enforces a minimum gap
//! since the previous request to the same vendor plus up to a second of
//! jitter. Concurrent callers serialize on the per-vendor lock; there is
//! no token accrual across idle periods.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::Vendor;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Minimum spacing between requests to the same vendor.
pub fn min_delay(vendor: Vendor) -> Duration {
    match vendor {
        Vendor::Primegov | Vendor::CivicClerk | Vendor::Legistar => Duration::from_secs(3),
        Vendor::Granicus | Vendor::CivicPlus | Vendor::NovusAgenda => Duration::from_secs(4),
        _ => Duration::from_secs(5),
    }
}

#[derive(Default)]
struct VendorState {
    last_request: Option<Instant>,
}

/// Vendor-keyed request spacer.
pub struct VendorRateLimiter {
    states: Mutex<HashMap<Vendor, Arc<Mutex<VendorState>>>>,
}

impl VendorRateLimiter {
    pub fn new() -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
        }
    }

    async fn state_for(&self, vendor: Vendor) -> Arc<Mutex<VendorState>> {
        let mut states = self.states.lock().await;
        states.entry(vendor).or_default().clone()
    }

    /// Suspend until this vendor may be hit again, then claim the slot.
    ///
    /// Holding the per-vendor lock across the sleep serializes concurrent
    /// callers, so two tasks can never leave less than `min_delay` between
    /// their requests.
    pub async fn wait(&self, vendor: Vendor) {
        let state = self.state_for(vendor).await;
        let mut state = state.lock().await;

        if let Some(last) = state.last_request {
            let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..1000));
            let earliest = last + min_delay(vendor) + jitter;
            let now = Instant::now();
            if earliest > now {
                let wait = earliest - now;
                tracing::debug!(
                    vendor = %vendor,
                    wait_ms = wait.as_millis() as u64,
                    "rate limit wait"
                );
                tokio::time::sleep_until(earliest).await;
            }
        }

        state.last_request = Some(Instant::now());
    }
}

impl Default for VendorRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn consecutive_waits_are_spaced_by_min_delay() {
        let limiter = VendorRateLimiter::new();

        limiter.wait(Vendor::Primegov).await;
        let first = Instant::now();
        limiter.wait(Vendor::Primegov).await;
        let elapsed = Instant::now() - first;

        assert!(
            elapsed >= min_delay(Vendor::Primegov),
            "second wait returned after {elapsed:?}, expected at least 3s"
        );
        // Jitter is bounded by one second.
        assert!(elapsed <= min_delay(Vendor::Primegov) + Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn vendors_do_not_block_each_other() {
        let limiter = VendorRateLimiter::new();

        limiter.wait(Vendor::Primegov).await;
        let before = Instant::now();
        limiter.wait(Vendor::Granicus).await;
        assert_eq!(Instant::now(), before, "first hit on another vendor must not wait");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_waiters_serialize() {
        let limiter = Arc::new(VendorRateLimiter::new());
        let start = Instant::now();

        let a = tokio::spawn({
            let limiter = limiter.clone();
            async move {
                limiter.wait(Vendor::Legistar).await;
                Instant::now() - start
            }
        });
        let b = tokio::spawn({
            let limiter = limiter.clone();
            async move {
                limiter.wait(Vendor::Legistar).await;
                Instant::now() - start
            }
        });

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        let gap = if a > b { a - b } else { b - a };
        assert!(
            gap >= min_delay(Vendor::Legistar),
            "two concurrent waits finished only {gap:?} apart"
        );
    }
}
