//! Tracing and metrics setup for the conductor.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging.
///
/// JSON output in production, human-readable output when
/// `CIVICSYNC_LOG_PRETTY=1`. Filtering follows `RUST_LOG` with an
/// info-level default.
pub fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,sqlx=warn"));

    let pretty = std::env::var("CIVICSYNC_LOG_PRETTY")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    if pretty {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    }
}

/// Pre-register the pipeline's metrics.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "vendor_requests_total",
        "Outbound vendor requests by vendor and outcome"
    );
    metrics::describe_histogram!(
        "vendor_request_duration_seconds",
        "Vendor request duration in seconds"
    );
    metrics::describe_counter!(
        "vendor_fetch_failures_total",
        "Adapter fetches that returned an error"
    );
    metrics::describe_counter!("meetings_synced_total", "Meetings stored per city");
    metrics::describe_counter!("items_extracted_total", "Agenda items stored per city");
    metrics::describe_counter!("matters_tracked_total", "New matters created per city");
}
