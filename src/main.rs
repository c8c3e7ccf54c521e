mod api;
mod cache;
mod config;
mod logging;
mod lookup;
mod render;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use api::api_types::ApiFilterRequest;
use api::{ApiClient, RecordView};
use cache::{CacheStore, MemoryStore, SqliteStore, KEY_PREFIX};
use config::Config;
use lookup::{LoadState, LookupController, LookupView};

#[derive(Parser, Debug)]
#[command(name = "lookup-dash")]
#[command(about = "Browse assessment records from the command line")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/lookup-dash/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Log debug output to stderr
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Unassigned responses by email date, paginated and cached locally
  Lookup(LookupArgs),
  /// All assessments
  Assessments(FilterArgs),
  /// All assessment responses
  Responses(FilterArgs),
  /// Responses still missing a status or feedback
  Pending(FilterArgs),
  /// Check that the API is reachable
  Health,
  /// Manage the local lookup cache
  #[command(subcommand)]
  Cache(CacheCommand),
}

#[derive(clap::Args, Debug)]
struct LookupArgs {
  /// First day to include (YYYY-MM-DD)
  #[arg(long)]
  start: Option<NaiveDate>,

  /// Last day to include (YYYY-MM-DD, default: today)
  #[arg(long, conflicts_with = "open_end")]
  end: Option<NaiveDate>,

  /// Don't limit the end date
  #[arg(long)]
  open_end: bool,

  /// Only the last N days, e.g. 3, 7, 30 or 90
  #[arg(long, conflicts_with_all = ["start", "end", "open_end"], value_parser = clap::value_parser!(u32).range(1..))]
  last_days: Option<u32>,

  /// Page to show (1-based)
  #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
  page: u32,

  /// Records per page (default from config, 50)
  #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
  page_size: Option<u32>,

  /// Skip warming the cache with the next page
  #[arg(long)]
  no_prefetch: bool,

  /// Print JSON instead of a table
  #[arg(long)]
  json: bool,
}

#[derive(clap::Args, Debug)]
struct FilterArgs {
  /// Column filter, COLUMN=VALUE[,VALUE...]; date columns take one date or a start,end pair
  #[arg(short, long = "filter")]
  filters: Vec<String>,

  /// Print JSON instead of a table
  #[arg(long)]
  json: bool,
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
  /// Remove every cached lookup page
  Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(args.verbose, config.log_dir.as_deref())?;

  match args.command {
    Command::Lookup(lookup_args) => run_lookup(&config, lookup_args).await,
    Command::Assessments(filter_args) => run_records(&config, RecordView::Assessments, filter_args).await,
    Command::Responses(filter_args) => run_records(&config, RecordView::Responses, filter_args).await,
    Command::Pending(filter_args) => run_records(&config, RecordView::Pending, filter_args).await,
    Command::Health => run_health(&config).await,
    Command::Cache(CacheCommand::Clear) => run_cache_clear(&config),
  }
}

async fn run_lookup(config: &Config, args: LookupArgs) -> Result<()> {
  let client = ApiClient::new(config)?;
  let controller = LookupController::new(open_store(config), Arc::new(client))
    .with_prefetch_delay(config.lookup.prefetch_delay());

  let today = Utc::now().date_naive();
  let page_size = args.page_size.unwrap_or(config.lookup.page_size);
  let mut view = LookupView::new(controller, page_size, today);

  if let Some(days) = args.last_days {
    view.apply_preset(days, today);
  } else {
    view.set_start_date(args.start);
    if args.open_end {
      view.set_end_date(None);
    } else if let Some(end) = args.end {
      view.set_end_date(Some(end));
    }
  }
  view.jump_to(args.page);

  if view.refresh().await == LoadState::Failed {
    return Err(eyre!("Error: {}", view.error().unwrap_or("request failed")));
  }

  if args.json {
    let body = json!({
      "data": view.rows(),
      "total": view.total(),
      "page": view.page(),
      "total_pages": view.total_pages(),
    });
    println!("{}", serde_json::to_string_pretty(&body)?);
  } else {
    let range = view.range();
    print!("{}", render::table(view.rows()));
    println!(
      "\nPage {} of {}  |  Total: {}  |  Range: {} to {}",
      view.page(),
      view.total_pages().max(1),
      view.total(),
      range
        .start
        .map(|d| d.to_string())
        .unwrap_or_else(|| "Beginning".to_string()),
      range
        .end
        .map(|d| d.to_string())
        .unwrap_or_else(|| "Now".to_string()),
    );
  }

  if args.no_prefetch {
    view.controller().cancel_prefetch();
  } else if let Some(outcome) = view.controller().wait_for_prefetch().await {
    debug!(?outcome, "prefetch finished");
  }

  Ok(())
}

async fn run_records(config: &Config, view: RecordView, args: FilterArgs) -> Result<()> {
  let filters = ApiFilterRequest::from_args(args.filters.iter().map(String::as_str))
    .map_err(|e| eyre!(e))?;
  let client = ApiClient::new(config)?;

  let rows = client
    .records(view, &filters)
    .await
    .map_err(|e| eyre!("Error: {}", e))?;

  if args.json {
    println!("{}", serde_json::to_string_pretty(&rows)?);
  } else {
    print!("{}", render::table(&rows));
    println!("\n{} records", rows.len());
  }
  Ok(())
}

async fn run_health(config: &Config) -> Result<()> {
  let client = ApiClient::new(config)?;
  let ok = client
    .health()
    .await
    .map_err(|e| eyre!("{} is unreachable: {}", client.base(), e))?;

  if !ok {
    return Err(eyre!("{} reports unhealthy", client.base()));
  }
  println!("{} is healthy", client.base());
  Ok(())
}

fn run_cache_clear(config: &Config) -> Result<()> {
  let store = open_sqlite_store(config)?;
  let removed = store
    .clear_prefix(KEY_PREFIX)
    .map_err(|e| eyre!("Failed to clear cache: {}", e))?;
  println!("Removed {} cached pages", removed);
  Ok(())
}

fn open_sqlite_store(config: &Config) -> Result<SqliteStore> {
  let quota = config.cache.quota_bytes;
  match &config.cache.path {
    Some(path) => SqliteStore::open_at(path, quota),
    None => SqliteStore::open(quota),
  }
}

/// Open the on-disk cache, falling back to memory so lookups still work.
fn open_store(config: &Config) -> Arc<dyn CacheStore> {
  match open_sqlite_store(config) {
    Ok(store) => Arc::new(store),
    Err(e) => {
      warn!(error = %e, "cache database unavailable, caching in memory only");
      match config.cache.quota_bytes {
        Some(quota) => Arc::new(MemoryStore::with_quota(quota)),
        None => Arc::new(MemoryStore::new()),
      }
    }
  }
}
