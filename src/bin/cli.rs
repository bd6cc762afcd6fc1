//! DHI adoption tracker CLI
//!
//! Operator entry point over the tracker library.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracker::{
    error::{AppError, Result},
    models::{Config, NewNotificationConfig, RecordFilter, SortField, SortOrder},
    pipeline::{StartOutcome, TriggerSource},
    tracker::Tracker,
};

/// Tracks adoption of hardened container base images on GitHub
#[derive(Parser, Debug)]
#[command(name = "tracker", version, about = "DHI adoption tracker")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "storage/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a refresh now and wait for it to finish
    Refresh,

    /// Show whether a refresh is running and the latest job
    Status,

    /// List tracked repositories
    List {
        #[arg(long)]
        min_stars: Option<u64>,
        #[arg(long)]
        max_stars: Option<u64>,
        /// Substring over repository name and description
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        source_type: Option<String>,
        /// stars, name, first_seen or adopted
        #[arg(long, default_value = "stars")]
        sort: SortField,
        /// asc or desc
        #[arg(long, default_value = "desc")]
        order: SortOrder,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// List repositories adopted within a window
    New {
        /// thisweek, or a number followed by h, d or w
        #[arg(long, default_value = "thisweek")]
        since: String,
    },

    /// Show aggregate counts
    Stats,

    /// Show adoptions per day
    History {
        #[arg(long)]
        days: Option<u32>,
    },

    /// Show recorded snapshots, newest first
    Snapshots {
        #[arg(long, default_value_t = 30)]
        limit: usize,
    },

    /// List distinct discovery source tags
    SourceTypes,

    /// Manage notification subscribers
    Notify {
        #[command(subcommand)]
        command: NotifyCommand,
    },

    /// Refresh at startup when stale, then on the configured interval
    Watch,
}

#[derive(Subcommand, Debug)]
enum NotifyCommand {
    /// List subscriber configs
    List,

    /// Add a subscriber config
    Add {
        #[arg(long)]
        name: String,
        /// chat or email
        #[arg(long)]
        channel: String,
        /// Channel payload as JSON, e.g. '{"webhook_url": "..."}'
        #[arg(long)]
        settings: String,
        #[arg(long)]
        disabled: bool,
    },

    /// Replace a subscriber config
    Update {
        id: i64,
        #[arg(long)]
        name: String,
        #[arg(long)]
        channel: String,
        #[arg(long)]
        settings: String,
        #[arg(long)]
        disabled: bool,
    },

    /// Remove a subscriber config and its logs
    Remove { id: i64 },

    /// Send a test message through a subscriber config
    Test { id: i64 },

    /// Show delivery logs of a subscriber config
    Logs {
        id: i64,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

/// Initialize logging with the given default filter.
fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn new_config(
    name: String,
    channel: String,
    settings: &str,
    disabled: bool,
) -> Result<NewNotificationConfig> {
    let settings = serde_json::from_str(settings)
        .map_err(|e| AppError::validation(format!("settings must be JSON: {e}")))?;
    Ok(NewNotificationConfig {
        name,
        channel,
        enabled: !disabled,
        settings,
    })
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = Config::load(&cli.config);
    let level = match (&loaded, cli.verbose) {
        (_, true) => "debug",
        (Ok(config), false) => config.logging.level.as_str(),
        (Err(_), false) => "info",
    };
    init_logging(level);

    let config = match loaded {
        Ok(config) => {
            log::info!("Loaded configuration from {}", cli.config.display());
            config
        }
        Err(e) => {
            log::warn!("Config load failed from {}: {e}. Using defaults.", cli.config.display());
            Config::default()
        }
    }
    .apply_env();

    let tracker = Tracker::open(config).await?;

    match cli.command {
        Command::Refresh => match tracker.start_refresh().await? {
            StartOutcome::Started { job_id } => {
                log::info!("Started refresh job {job_id}");
                tracker.wait_for_refresh().await;
                print_json(&tracker.refresh_status().await?)?;
            }
            StartOutcome::AlreadyRunning => log::warn!("A refresh is already running"),
        },

        Command::Status => print_json(&tracker.refresh_status().await?)?,

        Command::List {
            min_stars,
            max_stars,
            search,
            source_type,
            sort,
            order,
            limit,
            offset,
        } => {
            let filter = RecordFilter {
                min_stars,
                max_stars,
                search,
                source_type,
                sort,
                order,
                limit,
                offset,
            };
            print_json(&tracker.list_records(&filter).await?)?;
        }

        Command::New { since } => print_json(&tracker.new_records_since(&since).await?)?,

        Command::Stats => print_json(&tracker.stats().await?)?,

        Command::History { days } => print_json(&tracker.history(days).await?)?,

        Command::Snapshots { limit } => print_json(&tracker.snapshots(limit).await?)?,

        Command::SourceTypes => print_json(&tracker.source_types().await?)?,

        Command::Notify { command } => match command {
            NotifyCommand::List => print_json(&tracker.notification_configs().await?)?,
            NotifyCommand::Add {
                name,
                channel,
                settings,
                disabled,
            } => {
                let config = new_config(name, channel, &settings, disabled)?;
                print_json(&tracker.create_notification_config(config).await?)?;
            }
            NotifyCommand::Update {
                id,
                name,
                channel,
                settings,
                disabled,
            } => {
                let config = new_config(name, channel, &settings, disabled)?;
                print_json(&tracker.update_notification_config(id, config).await?)?;
            }
            NotifyCommand::Remove { id } => {
                tracker.delete_notification_config(id).await?;
                log::info!("Removed notification config {id}");
            }
            NotifyCommand::Test { id } => {
                tracker.send_test(id).await?;
                log::info!("Test notification sent");
            }
            NotifyCommand::Logs { id, limit } => {
                print_json(&tracker.notification_logs(id, limit).await?)?
            }
        },

        Command::Watch => watch(&tracker).await?,
    }

    Ok(())
}

/// Long-running mode: staleness check at startup, then a fixed interval.
async fn watch(tracker: &Tracker) -> Result<()> {
    let refresh = &tracker.config().refresh;
    let stale_after = refresh
        .stale_after()
        .ok_or_else(|| AppError::config("refresh.stale_after_hours is out of range"))?;
    let interval = refresh
        .interval()
        .ok_or_else(|| AppError::config("refresh.interval_hours is out of range"))?;

    let next_run: Arc<Mutex<Option<DateTime<Utc>>>> = Arc::new(Mutex::new(None));
    let accessor = Arc::clone(&next_run);
    tracker.set_next_refresh_fn(Arc::new(move || accessor.lock().ok().and_then(|n| *n)));

    if tracker.refresh_if_stale(stale_after).await?.is_some() {
        tracker.wait_for_refresh().await;
    }

    let Ok(period) = interval.to_std() else {
        return Err(AppError::config("refresh.interval_hours is out of range"));
    };
    if period.is_zero() {
        log::info!("Scheduler disabled (refresh.interval_hours = 0)");
        return Ok(());
    }

    loop {
        let next = Utc::now().checked_add_signed(interval);
        if let Ok(mut slot) = next_run.lock() {
            *slot = next;
        }
        if let Some(next) = next {
            log::info!("Next refresh scheduled at {next}");
        }

        tokio::time::sleep(period).await;

        match tracker.trigger_refresh(TriggerSource::Scheduled).await {
            Ok(StartOutcome::Started { .. }) => {
                tracker.wait_for_refresh().await;
            }
            Ok(StartOutcome::AlreadyRunning) => {}
            Err(e) => log::error!("Scheduled refresh could not start: {e}"),
        }
    }
}
