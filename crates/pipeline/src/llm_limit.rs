//! Token-bucket rate limiting for LLM API calls.
//!
//! The summarization provider enforces per-minute, per-hour, and per-day
//! token ceilings. Each bucket refills continuously; `acquire` sleeps for
//! the longest deficit across the three, then decrements all of them
//! atomically.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

struct TokenBucket {
    capacity: f64,
    tokens: f64,
    last_refill: Instant,
    refill_rate: f64,
}

impl TokenBucket {
    fn new(capacity: u64, refill_per_sec: f64) -> Self {
        Self {
            capacity: capacity as f64,
            tokens: capacity as f64,
            last_refill: Instant::now(),
            refill_rate: refill_per_sec,
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = (now - self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    fn time_until_available(&mut self, tokens: f64) -> Duration {
        self.refill();
        if self.tokens >= tokens {
            return Duration::ZERO;
        }
        Duration::from_secs_f64((tokens - self.tokens) / self.refill_rate)
    }

    fn consume(&mut self, tokens: f64) {
        self.refill();
        self.tokens -= tokens;
    }
}

/// Current utilization of one window, for stats.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BucketStats {
    pub capacity: u64,
    pub available: u64,
}

/// Three-window token limiter for LLM calls.
pub struct LlmRateLimiter {
    buckets: Mutex<[TokenBucket; 3]>,
    total_consumed: std::sync::atomic::AtomicU64,
}

impl LlmRateLimiter {
    pub fn new(tokens_per_minute: u64, tokens_per_hour: u64, tokens_per_day: u64) -> Self {
        Self {
            buckets: Mutex::new([
                TokenBucket::new(tokens_per_minute, tokens_per_minute as f64 / 60.0),
                TokenBucket::new(tokens_per_hour, tokens_per_hour as f64 / 3600.0),
                TokenBucket::new(tokens_per_day, tokens_per_day as f64 / 86400.0),
            ]),
            total_consumed: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Block until `tokens` are available in every window, then take them.
    pub async fn acquire(&self, tokens: u64) {
        let mut buckets = self.buckets.lock().await;
        let needed = tokens as f64;

        let wait = buckets
            .iter_mut()
            .map(|bucket| bucket.time_until_available(needed))
            .max()
            .unwrap_or(Duration::ZERO);

        if wait > Duration::ZERO {
            tracing::info!(wait_seconds = wait.as_secs_f64(), tokens_requested = tokens, "rate limit wait");
            tokio::time::sleep(wait).await;
        }

        for bucket in buckets.iter_mut() {
            bucket.consume(needed);
        }
        self.total_consumed
            .fetch_add(tokens, std::sync::atomic::Ordering::Relaxed);
    }

    pub async fn stats(&self) -> (u64, Vec<BucketStats>) {
        let mut buckets = self.buckets.lock().await;
        let stats = buckets
            .iter_mut()
            .map(|bucket| {
                bucket.refill();
                BucketStats {
                    capacity: bucket.capacity as u64,
                    available: bucket.tokens.max(0.0) as u64,
                }
            })
            .collect();
        (
            self.total_consumed.load(std::sync::atomic::Ordering::Relaxed),
            stats,
        )
    }
}

impl Default for LlmRateLimiter {
    fn default() -> Self {
        Self::new(1_000_000, 30_000_000, 500_000_000)
    }
}

/// Rough token estimate for English text: ~4 chars per token plus a 20%
/// buffer for prompt scaffolding, floor of 100.
pub fn estimate_tokens(text: &str) -> u64 {
    let base = text.len() as f64 / 4.0;
    ((base * 1.2) as u64).max(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn acquire_within_capacity_is_instant() {
        let limiter = LlmRateLimiter::new(1000, 10_000, 100_000);
        let before = Instant::now();
        limiter.acquire(500).await;
        assert_eq!(Instant::now(), before);
        let (consumed, stats) = limiter.stats().await;
        assert_eq!(consumed, 500);
        assert_eq!(stats[0].available, 500);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_the_tightest_window() {
        let limiter = LlmRateLimiter::new(600, 1_000_000, 10_000_000);
        limiter.acquire(600).await;

        // Minute bucket empty; 300 tokens refill in ~30s at 10/s.
        let before = Instant::now();
        limiter.acquire(300).await;
        let waited = Instant::now() - before;
        assert!(waited >= Duration::from_secs(29), "waited {waited:?}");
        assert!(waited <= Duration::from_secs(31), "waited {waited:?}");
    }

    #[test]
    fn token_estimates_have_a_floor() {
        assert_eq!(estimate_tokens(""), 100);
        assert!(estimate_tokens(&"x".repeat(4000)) >= 1000);
    }
}
