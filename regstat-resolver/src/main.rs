//! regstat - regional performance statistics CLI
//!
//! Resolves, compares, ranks and summarises monthly region records and runs
//! the cache and database maintenance jobs. Results are printed to stdout as
//! pretty JSON; logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use regstat_common::config::{self, TomlConfig};
use regstat_common::db::{init_database, Region};
use regstat_common::{Clock, Month, SystemClock};
use regstat_resolver::{jobs, regions};
use regstat_resolver::AppState;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for regstat
#[derive(Parser, Debug)]
#[command(name = "regstat")]
#[command(about = "Regional performance statistics with tiered caching")]
#[command(version)]
struct Args {
    /// Root folder holding the database
    #[arg(short, long, global = true)]
    root_folder: Option<PathBuf>,

    /// Config file (default: <config_dir>/regstat/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve one region for one month
    Resolve {
        region: String,
        /// YYYY-MM or YYYY-MM-DD (default: current month)
        #[arg(short, long)]
        month: Option<String>,
    },
    /// Compare two regions for one month
    Compare {
        region_a: String,
        region_b: String,
        #[arg(short, long)]
        month: Option<String>,
    },
    /// Rank leaf regions by a metric, highest first
    Top {
        #[arg(long, default_value = "activeWorkers")]
        metric: String,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        #[arg(short, long)]
        month: Option<String>,
    },
    /// Sum the child regions of a parent
    Summary {
        parent: String,
        #[arg(short, long)]
        month: Option<String>,
    },
    /// Consecutive months ending at the current month, oldest first
    History {
        region: String,
        #[arg(long, default_value_t = 12)]
        months: u32,
    },
    /// Result cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Clear expired cache entries and re-resolve every leaf region for the current month
    Refresh,
    /// Seed the store with synthetic history where no record exists
    Backfill {
        #[arg(long, default_value_t = 12)]
        months: u32,
    },
    /// Database and cache statistics
    Stats,
    /// List known regions, one region, or the children of a parent
    Regions {
        #[arg(long, conflicts_with = "parent")]
        key: Option<String>,
        #[arg(long)]
        parent: Option<String>,
    },
    /// Upsert the `[[regions]]` list from the config file
    ImportRegions,
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    Stats,
    ClearExpired,
    ClearAll,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let toml_config = config::load_toml_config(args.config.as_deref())
        .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml_config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!(
        "Starting regstat v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = config::resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    let db_path = config::database_path(&root_folder);
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = AppState::new(pool, &toml_config, clock);

    run(args.command, &state, &toml_config).await
}

async fn run(command: Command, state: &AppState, toml_config: &TomlConfig) -> Result<()> {
    match command {
        Command::Resolve { region, month } => {
            let month = month_or_current(month.as_deref(), state)?;
            let resolution = state.resolver.resolve_traced(region.trim(), month).await;
            print_json(&resolution)
        }
        Command::Compare {
            region_a,
            region_b,
            month,
        } => {
            let month = month_or_current(month.as_deref(), state)?;
            let comparison = state.aggregator.compare(&region_a, &region_b, month).await?;
            print_json(&comparison)
        }
        Command::Top {
            metric,
            limit,
            month,
        } => {
            let month = month_or_current(month.as_deref(), state)?;
            let ranked = state.aggregator.rank_top(&metric, limit, month).await?;
            print_json(&ranked)
        }
        Command::Summary { parent, month } => {
            let month = month_or_current(month.as_deref(), state)?;
            let summary = state.aggregator.regional_summary(&parent, month).await?;
            print_json(&summary)
        }
        Command::History { region, months } => {
            let series = state.aggregator.historical_series(&region, months).await?;
            print_json(&series)
        }
        Command::Cache { action } => match action {
            CacheAction::Stats => print_json(&state.cache().stats().await?),
            CacheAction::ClearExpired => {
                let deleted = state.cache().clear_expired().await?;
                print_json(&serde_json::json!({ "deleted": deleted }))
            }
            CacheAction::ClearAll => {
                let deleted = state.cache().clear_all().await?;
                print_json(&serde_json::json!({ "deleted": deleted }))
            }
        },
        Command::Refresh => {
            let month = Month::current(state.clock.as_ref());
            let summary =
                jobs::refresh_month(&state.resolver, &state.regions, month, state.fan_out).await?;
            print_json(&summary)
        }
        Command::Backfill { months } => {
            let end = Month::current(state.clock.as_ref());
            let summary = jobs::backfill_history(&state.store, &state.regions, end, months).await?;
            print_json(&summary)
        }
        Command::Stats => {
            let stats = jobs::database_stats(&state.regions, &state.store, state.cache()).await?;
            print_json(&stats)
        }
        Command::Regions { key, parent } => {
            let listed =
                regions::lookup_regions(&state.regions, key.as_deref(), parent.as_deref()).await?;
            print_json(&listed)
        }
        Command::ImportRegions => {
            if toml_config.regions.is_empty() {
                anyhow::bail!("No [[regions]] entries in the config file");
            }
            let regions: Vec<Region> = toml_config.regions.iter().map(Region::from).collect();
            let imported = state.regions.upsert_regions(&regions).await?;
            print_json(&serde_json::json!({ "imported": imported }))
        }
    }
}

fn month_or_current(month: Option<&str>, state: &AppState) -> Result<Month> {
    match month {
        Some(raw) => Ok(Month::parse(raw)?),
        None => Ok(Month::current(state.clock.as_ref())),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
