use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use adperf_core::{DateWindow, Platform};
use adperf_storage::{AdStore, PgAdStore};
use adperf_sync::{
    build_http_adapters, PlatformRegistry, RoasCalculator, SyncConfig, SyncRequest, SyncRunner,
    UnifiedStats,
};

#[derive(Debug, Parser)]
#[command(name = "adperf")]
#[command(about = "Ad performance sync & attribution command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one sync across all platforms, or a subset via --platform.
    Sync {
        #[arg(long = "platform")]
        platforms: Vec<String>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Attribute order revenue and recompute ROAS.
    Roas {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Cross-platform rollup of campaign totals.
    Stats,
    /// Sync audit trail, newest first.
    History {
        #[arg(long)]
        platform: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Serve the JSON API (and the cron scheduler when enabled).
    Serve,
    /// Apply database migrations.
    Migrate,
}

fn parse_platforms(raw: &[String]) -> Result<Option<Vec<Platform>>> {
    if raw.is_empty() {
        return Ok(None);
    }
    let mut platforms = Vec::with_capacity(raw.len());
    for name in raw {
        platforms.push(name.parse::<Platform>()?);
    }
    Ok(Some(platforms))
}

async fn open_store(config: &SyncConfig) -> Result<Arc<PgAdStore>> {
    let store = PgAdStore::connect(&config.database_url)
        .await
        .with_context(|| format!("connecting to {}", config.database_url))?;
    Ok(Arc::new(store))
}

fn build_runner(config: &SyncConfig, store: Arc<PgAdStore>) -> Result<(SyncRunner, PlatformRegistry)> {
    let registry = PlatformRegistry::load(&config.registry_path)?;
    let adapters = build_http_adapters(&registry, config)?;
    let runner = SyncRunner::new(store, adapters)
        .with_platform_timeout(Duration::from_secs(config.platform_timeout_secs));
    Ok((runner, registry))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = SyncConfig::from_env();

    match cli.command.unwrap_or(Commands::Sync {
        platforms: Vec::new(),
        from: None,
        to: None,
    }) {
        Commands::Sync { platforms, from, to } => {
            let store = open_store(&config).await?;
            let (runner, _registry) = build_runner(&config, store)?;
            let report = runner
                .run(SyncRequest {
                    platforms: parse_platforms(&platforms)?,
                    window: DateWindow::new(from, to),
                })
                .await;
            println!(
                "sync complete: run_id={} ok={} failed={} campaigns={} stats={}",
                report.run_id,
                report.results.len(),
                report.errors.len(),
                report.total_campaigns,
                report.total_stats
            );
            for error in &report.errors {
                eprintln!("  {}: {}", error.platform, error.message);
            }
        }
        Commands::Roas { from, to } => {
            let store = open_store(&config).await?;
            let calculator = RoasCalculator::new(store);
            let rows = calculator.calculate(&DateWindow::new(from, to)).await?;
            println!("roas computed for {} campaigns", rows.len());
            for row in &rows {
                println!(
                    "  {:>10} {:<24} spend={:>10.2} revenue={:>10.2} orders={:>4} roas={:>6.2}",
                    row.platform, row.name, row.spend, row.revenue, row.orders, row.roas
                );
            }
        }
        Commands::Stats => {
            let store = open_store(&config).await?;
            let registry = PlatformRegistry::load(&config.registry_path)
                .unwrap_or_else(|_| PlatformRegistry::empty());
            let stats = UnifiedStats::new(store, registry);
            for row in stats.platform_stats().await? {
                println!(
                    "{:>10}  connected={:<5} campaigns={:>4} impressions={:>10} clicks={:>8} spend={:>12.2} revenue={:>12.2}",
                    row.platform,
                    row.connected,
                    row.campaigns,
                    row.impressions,
                    row.clicks,
                    row.spend,
                    row.revenue
                );
            }
        }
        Commands::History { platform, limit } => {
            let store = open_store(&config).await?;
            let platform = platform.map(|p| p.parse::<Platform>()).transpose()?;
            for entry in store.sync_history(platform, limit).await? {
                println!(
                    "{} {:>10} {:<9} campaigns={:>4} stats={:>5} {}",
                    entry.started_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.platform,
                    entry.status.as_str(),
                    entry.campaigns_synced,
                    entry.stats_synced,
                    entry.error_message.as_deref().unwrap_or("")
                );
            }
        }
        Commands::Serve => {
            adperf_web::serve_from_env().await?;
        }
        Commands::Migrate => {
            let store = open_store(&config).await?;
            store.migrate().await?;
            println!("migrations applied to {}", config.database_url);
        }
    }

    Ok(())
}
