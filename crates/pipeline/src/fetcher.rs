//! Fetcher: drives one sync pass across all active cities.
//!
//! Cities are grouped by vendor and processed sequentially so the
//! per-vendor rate limiter amortizes its waits; within a group, cities go
//! in priority order (busy cities first, stale cities boosted). Each city
//! gets a bounded retry, and a failed city never stops the pass.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use chrono::Local;
use common::{Config, Vendor};
use db::models::{City, CityStatus};
use db::repositories::CityRepository;
use db::DbPool;
use rand::Rng;
use tokio::sync::Mutex;
use vendors::{build_adapter, AdapterDeps, VendorRateLimiter};

use crate::orchestrator::MeetingSyncOrchestrator;
use crate::shutdown::ShutdownFlag;

/// Outcome of one city's sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

/// Per-city result record for a sync pass.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SyncResult {
    pub banana: String,
    pub status: SyncStatus,
    pub meetings_found: usize,
    pub meetings_processed: usize,
    pub meetings_skipped: usize,
    pub duration_seconds: f64,
    pub error_message: Option<String>,
}

impl SyncResult {
    fn new(banana: impl Into<String>, status: SyncStatus) -> Self {
        Self {
            banana: banana.into(),
            status,
            meetings_found: 0,
            meetings_processed: 0,
            meetings_skipped: 0,
            duration_seconds: 0.0,
            error_message: None,
        }
    }

    fn failed(banana: impl Into<String>, message: impl Into<String>) -> Self {
        let mut result = Self::new(banana, SyncStatus::Failed);
        result.error_message = Some(message.into());
        result
    }
}

/// Retry schedule for failed city syncs, encoded as data.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after the first failure.
    pub max_retries: usize,
    /// Delay before each retry.
    pub delays: Vec<Duration>,
    /// Uniform jitter added on top of each delay.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            delays: vec![Duration::from_secs(5), Duration::from_secs(20)],
            jitter: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let base = self
            .delays
            .get(attempt)
            .copied()
            .or_else(|| self.delays.last().copied())
            .unwrap_or(Duration::from_secs(5));
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64))
    }
}

/// Decide whether a city is due for a sync, from its recent meeting
/// frequency and hours since the last one.
///
/// Busy cities (8+/month) refresh every 12 hours; moderately active ones
/// daily; occasionally active ones every 3 days; quiet ones weekly.
pub fn should_sync(recent_meetings: i64, hours_since_sync: Option<f64>) -> bool {
    let Some(hours) = hours_since_sync else {
        return true;
    };
    let threshold = if recent_meetings >= 8 {
        12.0
    } else if recent_meetings >= 4 {
        24.0
    } else if recent_meetings >= 1 {
        72.0
    } else {
        168.0
    };
    hours >= threshold
}

/// Priority score: activity dominates, staleness breaks ties,
/// never-synced cities jump the queue.
pub fn priority_score(recent_meetings: i64, hours_since_sync: Option<f64>) -> f64 {
    match hours_since_sync {
        None => 1000.0,
        Some(hours) => recent_meetings as f64 * 10.0 + (hours / 24.0).min(10.0),
    }
}

/// City sync and meeting fetching orchestrator.
pub struct Fetcher {
    cities: CityRepository,
    orchestrator: MeetingSyncOrchestrator,
    rate_limiter: VendorRateLimiter,
    deps: AdapterDeps,
    retry_policy: RetryPolicy,
    enabled_vendors: HashSet<Vendor>,
    days_back: i64,
    days_forward: i64,
    failed_cities: Mutex<HashSet<String>>,
    shutdown: ShutdownFlag,
}

impl Fetcher {
    pub fn new(pool: DbPool, deps: AdapterDeps, config: &Config, shutdown: ShutdownFlag) -> Self {
        Self {
            cities: CityRepository::new(pool.clone()),
            orchestrator: MeetingSyncOrchestrator::new(pool),
            rate_limiter: VendorRateLimiter::new(),
            deps,
            retry_policy: RetryPolicy::default(),
            enabled_vendors: config.enabled_vendors.iter().copied().collect(),
            days_back: config.sync_days_back,
            days_forward: config.sync_days_forward,
            failed_cities: Mutex::new(HashSet::new()),
            shutdown,
        }
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_running()
    }

    pub async fn failed_cities(&self) -> Vec<String> {
        let mut cities: Vec<String> = self.failed_cities.lock().await.iter().cloned().collect();
        cities.sort();
        cities
    }

    /// Sync all active cities with vendor fairness and politeness.
    pub async fn sync_all(&self) -> Vec<SyncResult> {
        let started = std::time::Instant::now();
        tracing::info!("starting polite city sync");

        self.failed_cities.lock().await.clear();

        let cities = match self.cities.get_all_cities(CityStatus::Active).await {
            Ok(cities) => cities,
            Err(e) => {
                tracing::error!(error = %e, "failed to load active cities");
                return Vec::new();
            }
        };
        tracing::info!(city_count = cities.len(), "syncing cities with rate limiting");

        // Partition by vendor; drop cities on disabled or unknown vendors.
        let mut by_vendor: BTreeMap<&'static str, (Vendor, Vec<City>)> = BTreeMap::new();
        let mut skipped_count = 0;
        for city in cities {
            match city.vendor() {
                Some(vendor) if self.enabled_vendors.contains(&vendor) => {
                    by_vendor
                        .entry(vendor.as_str())
                        .or_insert_with(|| (vendor, Vec::new()))
                        .1
                        .push(city);
                }
                _ => {
                    skipped_count += 1;
                    tracing::debug!(
                        city_name = %city.name,
                        vendor = %city.vendor,
                        "skipping city with unsupported vendor"
                    );
                }
            }
        }
        let supported_count: usize = by_vendor.values().map(|(_, v)| v.len()).sum();
        tracing::info!(supported_count, skipped_count, "processing cities with supported adapters");

        let mut results = Vec::new();

        for (_, (vendor, vendor_cities)) in by_vendor {
            if !self.is_running() {
                break;
            }

            let sorted = self.prioritize_cities(vendor_cities).await;
            tracing::info!(vendor = %vendor, city_count = sorted.len(), "syncing vendor cities");

            let mut processed_any = false;
            for city in sorted {
                if !self.is_running() {
                    break;
                }

                if !self.should_sync_city(&city).await {
                    tracing::debug!(city_name = %city.name, "skipping city - not due for sync");
                    let mut result = SyncResult::new(&city.banana, SyncStatus::Skipped);
                    result.error_message = Some("Not due for sync".to_string());
                    results.push(result);
                    continue;
                }

                self.rate_limiter.wait(vendor).await;
                processed_any = true;
                let result = self.sync_city_with_retry(&city).await;
                tracing::info!(city = %city.banana, status = ?result.status, "sync completed");

                if result.status == SyncStatus::Failed {
                    self.failed_cities.lock().await.insert(city.banana.clone());
                }
                results.push(result);
            }

            // Breather after each vendor group that saw real traffic.
            if processed_any {
                let break_secs = 30.0 + rand::thread_rng().gen_range(0.0..10.0);
                tracing::info!(vendor = %vendor, break_seconds = break_secs, "completed vendor cities - taking break");
                if !self.shutdown.sleep(Duration::from_secs_f64(break_secs)).await {
                    break;
                }
            }
        }

        let total_found: usize = results.iter().map(|r| r.meetings_found).sum();
        let total_processed: usize = results.iter().map(|r| r.meetings_processed).sum();
        let failed = self.failed_cities.lock().await.clone();
        tracing::info!(
            duration_seconds = started.elapsed().as_secs_f64(),
            meetings_found = total_found,
            meetings_processed = total_processed,
            cities_failed = failed.len(),
            "polite sync completed"
        );
        if !failed.is_empty() {
            let mut sorted: Vec<_> = failed.into_iter().collect();
            sorted.sort();
            tracing::warn!(failed_cities = ?sorted, "cities failed during sync");
        }

        results
    }

    /// Sync one city by banana, bypassing the should-sync heuristic.
    pub async fn sync_city(&self, banana: &str) -> SyncResult {
        let city = match self.cities.get_city(banana).await {
            Ok(Some(city)) => city,
            Ok(None) => return SyncResult::failed(banana, "City not found"),
            Err(e) => return SyncResult::failed(banana, format!("city lookup failed: {e}")),
        };
        self.sync_city_with_retry(&city).await
    }

    /// Sync specific cities in order, with rate limiting between them.
    pub async fn sync_cities(&self, bananas: &[String]) -> Vec<SyncResult> {
        tracing::info!(city_count = bananas.len(), "syncing specific cities");
        let mut results = Vec::new();
        for banana in bananas {
            let city = match self.cities.get_city(banana).await {
                Ok(Some(city)) => city,
                Ok(None) => {
                    tracing::warn!(banana, "city not found");
                    results.push(SyncResult::failed(banana, "City not found in database"));
                    continue;
                }
                Err(e) => {
                    results.push(SyncResult::failed(banana, format!("city lookup failed: {e}")));
                    continue;
                }
            };

            if let Some(vendor) = city.vendor() {
                self.rate_limiter.wait(vendor).await;
            }
            let result = self.sync_city_with_retry(&city).await;
            if result.status == SyncStatus::Failed {
                self.failed_cities.lock().await.insert(banana.clone());
            }
            results.push(result);
        }
        results
    }

    async fn sync_city_with_retry(&self, city: &City) -> SyncResult {
        let mut last_result = None;

        for attempt in 0..=self.retry_policy.max_retries {
            let result = self.sync_city_once(city).await;
            if matches!(result.status, SyncStatus::Completed | SyncStatus::Skipped) {
                return result;
            }
            let error = result.error_message.clone().unwrap_or_else(|| "Sync failed".to_string());
            last_result = Some(result);

            if attempt >= self.retry_policy.max_retries {
                tracing::error!(
                    city = %city.name,
                    attempts = attempt + 1,
                    error = %error,
                    "final sync failure after retries"
                );
                break;
            }

            let wait = self.retry_policy.delay_for_attempt(attempt);
            tracing::warn!(
                city = %city.name,
                attempt = attempt + 1,
                wait_seconds = wait.as_secs_f64(),
                error = %error,
                "sync failed - retrying"
            );
            if !self.shutdown.sleep(wait).await {
                break;
            }
        }

        last_result.unwrap_or_else(|| SyncResult::failed(&city.banana, "Unknown retry error"))
    }

    async fn sync_city_once(&self, city: &City) -> SyncResult {
        let started = std::time::Instant::now();

        let Some(vendor) = city.vendor() else {
            let mut result = SyncResult::new(&city.banana, SyncStatus::Skipped);
            result.error_message = Some("No vendor configured".to_string());
            return result;
        };

        let adapter = match build_adapter(vendor, &city.slug, &self.deps) {
            Ok(adapter) => adapter,
            Err(e) => {
                tracing::warn!(city = %city.banana, vendor = %vendor, error = %e, "vendor not supported");
                let mut result = SyncResult::new(&city.banana, SyncStatus::Skipped);
                result.error_message = Some(e.to_string());
                return result;
            }
        };

        tracing::info!(city = %city.banana, vendor = %vendor, "starting sync");
        let mut result = SyncResult::new(&city.banana, SyncStatus::InProgress);

        let fetch = adapter.fetch_result(self.days_back, self.days_forward).await;
        if let Some(error) = fetch.error {
            tracing::error!(city = %city.banana, vendor = %vendor, error = %error, "adapter fetch failed");
            result.status = SyncStatus::Failed;
            result.error_message = Some(format!("Adapter failed: {error}"));
            result.duration_seconds = started.elapsed().as_secs_f64();
            return result;
        }
        let meetings = fetch.meetings;
        result.meetings_found = meetings.len();

        let total_items: usize = meetings.iter().map(|m| m.items.len()).sum();
        let matters_with_tracking: usize = meetings
            .iter()
            .flat_map(|m| &m.items)
            .filter(|i| i.has_matter_reference())
            .count();
        tracing::info!(
            city = %city.banana,
            meeting_count = meetings.len(),
            total_items,
            matters_with_tracking,
            "found meetings for city"
        );

        let mut items_stored = 0;
        let mut matters_tracked = 0;
        let mut matters_duplicate = 0;

        for (index, record) in meetings.iter().enumerate() {
            if (index + 1) % 10 == 0 {
                tracing::info!(city = %city.banana, progress = index + 1, total = meetings.len(), "storage progress");
            }
            if !self.is_running() {
                tracing::warn!("processing stopped - shutdown requested");
                break;
            }

            match self.orchestrator.sync_meeting(record, city).await {
                Ok((stored_id, stats)) => {
                    if stored_id.is_none() {
                        result.meetings_skipped += 1;
                        tracing::warn!(
                            meeting_title = %record.title,
                            reason = stats.skip_reason.as_deref().unwrap_or("unknown"),
                            "skipped meeting"
                        );
                        continue;
                    }
                    result.meetings_processed += 1;
                    items_stored += stats.items_stored;
                    matters_tracked += stats.matters_tracked;
                    matters_duplicate += stats.matters_duplicate;
                }
                Err(e) => {
                    // Per-meeting failures roll back that meeting only.
                    tracing::error!(
                        city = %city.banana,
                        meeting_title = %record.title,
                        error = %e,
                        "error storing meeting"
                    );
                }
            }
        }

        result.status = SyncStatus::Completed;
        result.duration_seconds = started.elapsed().as_secs_f64();

        metrics::counter!("matters_tracked_total", matters_tracked as u64, "banana" => city.banana.clone());
        tracing::info!(
            city = %city.banana,
            vendor = %vendor,
            meetings = result.meetings_processed,
            skipped_meetings = result.meetings_skipped,
            items = items_stored,
            new_matters = matters_tracked,
            duplicate_matters = matters_duplicate,
            duration_seconds = result.duration_seconds,
            "sync complete"
        );

        result
    }

    async fn should_sync_city(&self, city: &City) -> bool {
        let frequency = match self.cities.get_city_meeting_frequency(&city.banana, 30).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(city = %city.banana, error = %e, "error checking sync schedule");
                return true;
            }
        };
        let last_sync = match self.cities.get_city_last_sync(&city.banana).await {
            Ok(last) => last,
            Err(e) => {
                tracing::warn!(city = %city.banana, error = %e, "error checking sync schedule");
                return true;
            }
        };

        let hours = last_sync.map(|last| {
            (Local::now().naive_local() - last).num_seconds() as f64 / 3600.0
        });
        should_sync(frequency, hours)
    }

    async fn prioritize_cities(&self, cities: Vec<City>) -> Vec<City> {
        let mut scored = Vec::with_capacity(cities.len());
        for city in cities {
            let score = match (
                self.cities.get_city_meeting_frequency(&city.banana, 30).await,
                self.cities.get_city_last_sync(&city.banana).await,
            ) {
                (Ok(frequency), Ok(last_sync)) => {
                    let hours = last_sync.map(|last| {
                        (Local::now().naive_local() - last).num_seconds() as f64 / 3600.0
                    });
                    priority_score(frequency, hours)
                }
                _ => {
                    tracing::warn!(city = %city.banana, "failed to calculate priority");
                    100.0
                }
            };
            scored.push((score, city));
        }
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().map(|(_, city)| city).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_synced_cities_always_sync() {
        assert!(should_sync(0, None));
        assert!(should_sync(20, None));
    }

    #[test]
    fn sync_tiers_follow_activity() {
        // 8+/month: every 12 hours.
        assert!(should_sync(9, Some(13.0)));
        assert!(!should_sync(9, Some(11.0)));
        // 4+/month: daily.
        assert!(should_sync(5, Some(25.0)));
        assert!(!should_sync(5, Some(23.0)));
        // 1+/month: every 3 days.
        assert!(should_sync(2, Some(73.0)));
        assert!(!should_sync(2, Some(71.0)));
        // Quiet: weekly.
        assert!(should_sync(0, Some(169.0)));
        assert!(!should_sync(0, Some(167.0)));
    }

    #[test]
    fn priority_ranks_activity_then_staleness() {
        assert_eq!(priority_score(0, None), 1000.0);
        let busy_fresh = priority_score(10, Some(1.0));
        let quiet_stale = priority_score(1, Some(200.0));
        assert!(busy_fresh > quiet_stale);
        // Staleness saturates at ten days.
        assert_eq!(priority_score(0, Some(24.0 * 100.0)), 10.0);
    }

    #[test]
    fn retry_policy_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 1);
        let first = policy.delay_for_attempt(0);
        assert!(first >= Duration::from_secs(5) && first <= Duration::from_secs(7));
        let second = policy.delay_for_attempt(1);
        assert!(second >= Duration::from_secs(20) && second <= Duration::from_secs(22));
        // Past the table, the last delay repeats.
        let later = policy.delay_for_attempt(5);
        assert!(later >= Duration::from_secs(20) && later <= Duration::from_secs(22));
    }
}
