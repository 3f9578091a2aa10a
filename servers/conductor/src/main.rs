//! Civicsync conductor: admin CLI and background daemon for the
//! ingestion pipeline.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use common::Config;
use pipeline::{Conductor, Fetcher, ShutdownFlag, SyncStatus};
use vendors::sites::SiteConfigs;
use vendors::{AdapterDeps, SessionPool};

mod observability;

/// Background processor for civic meeting data.
#[derive(Parser, Debug)]
#[command(name = "civicsync-conductor", version, about)]
struct Args {
    /// Sync a specific city by banana (one-shot force).
    #[arg(long, value_name = "BANANA")]
    sync_city: Option<String>,

    /// Sync a city and immediately process all its queued jobs.
    #[arg(long, value_name = "BANANA")]
    sync_and_process_city: Option<String>,

    /// Run one full sync pass and exit.
    #[arg(long)]
    full_sync: bool,

    /// Print pipeline status as JSON.
    #[arg(long)]
    status: bool,

    /// Run as a long-lived daemon.
    #[arg(long)]
    daemon: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    observability::init_tracing();

    let args = Args::parse();
    let config = Config::from_env().context("loading configuration")?;

    let pool = db::create_pool(&config.database_url)
        .await
        .context("connecting to database")?;

    let sessions = Arc::new(SessionPool::new());
    let sites = Arc::new(
        SiteConfigs::load(&config.data_dir).context("loading vendor site configuration")?,
    );
    let deps = AdapterDeps::new(sessions.clone(), sites)
        .with_nyc_legistar_token(config.nyc_legistar_token.clone());

    let shutdown = ShutdownFlag::new();
    let fetcher = Arc::new(Fetcher::new(pool.clone(), deps, &config, shutdown.clone()));
    // The LLM processor is wired in by the deployment; without one the
    // processing loop is a no-op.
    let conductor = Arc::new(Conductor::new(pool, fetcher, None, &config, shutdown.clone()));

    if let Some(banana) = args.sync_city {
        let result = conductor.force_sync_city(&banana).await;
        println!("{}", serde_json::to_string_pretty(&result)?);
        anyhow::ensure!(result.status != SyncStatus::Failed, "sync failed");
    } else if let Some(banana) = args.sync_and_process_city {
        let (sync_result, processed, failed) = conductor.sync_and_process_city(&banana).await;
        println!(
            "{}",
            serde_json::json!({
                "sync": sync_result,
                "processed_count": processed,
                "failed_count": failed,
            })
        );
        anyhow::ensure!(sync_result.status != SyncStatus::Failed, "sync failed");
    } else if args.full_sync {
        let results = conductor.full_sync_once().await;
        let failed = results.iter().filter(|r| r.status == SyncStatus::Failed).count();
        println!("Full sync complete: {} cities processed, {} failed", results.len(), failed);
        anyhow::ensure!(failed == 0, "{failed} cities failed");
    } else if args.status {
        let status = conductor.get_sync_status().await.context("reading status")?;
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else if args.daemon {
        observability::describe_metrics();

        let runner = conductor.clone();
        let daemon = tokio::spawn(async move { runner.run().await });

        tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
        conductor.stop();
        let _ = daemon.await;
        sessions.close_all();
    } else {
        use clap::CommandFactory;
        Args::command().print_help()?;
    }

    Ok(())
}
