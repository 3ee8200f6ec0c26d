//! flatwatch CLI
//!
//! Polls listing sites on a schedule, alerts matching flats via Telegram and
//! answers chat commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use flatwatch::{
    commands::{CommandBot, CommandHandle},
    error::{AppError, Result},
    logging,
    models::{Config, LoggingConfig, Trigger},
    pipeline::{Pipeline, Scheduler},
    services::{LogNotifier, Notifier, TelegramClient, TelegramNotifier, build_sources},
    storage::{self, SqliteStore, Store},
    utils::http,
};
use tokio_util::sync::CancellationToken;

/// flatwatch - rental listing watcher
#[derive(Parser, Debug)]
#[command(
    name = "flatwatch",
    version,
    about = "Polls rental listing sites and alerts new matching flats"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "flatwatch.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler and the command bot until interrupted
    Run {
        /// Log alerts instead of sending them and keep state in memory;
        /// disables the command bot
        #[arg(long)]
        dry_run: bool,
    },

    /// Run exactly one cycle and exit
    Once {
        /// Log alerts instead of sending them and keep state in memory
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the most recently discovered listings
    Recent {
        /// Number of listings to show
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },

    /// Load and validate the configuration
    Validate,
}

/// Load the config file (defaults if it does not exist), apply the
/// environment overrides and check the logging section.
fn load_config(path: &Path) -> Result<(Config, bool)> {
    let found = path.exists();
    let mut config = if found {
        Config::load(path)?
    } else {
        Config::default()
    };
    config.apply_env()?;
    config.logging.validate()?;
    Ok((config, found))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, found) = match load_config(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            // stderr logger so the config error is still reported
            let _ = logging::init(&LoggingConfig::default(), cli.verbose);
            log::error!("{}", e);
            return Err(e);
        }
    };
    logging::init(&config.logging, cli.verbose)?;

    if found {
        log::info!("Loaded configuration from {}", cli.config.display());
    } else {
        log::warn!(
            "{} not found, using defaults and environment",
            cli.config.display()
        );
    }

    let result = match cli.command {
        Command::Run { dry_run } => run(config, dry_run).await,
        Command::Once { dry_run } => once(config, dry_run).await,
        Command::Recent { count } => recent(&config, count).await,
        Command::Validate => validate(&config),
    };

    if let Err(e) = &result {
        log::error!("{}", e);
    }
    result
}

struct App {
    pipeline: Arc<Pipeline>,
    store: Arc<dyn Store>,
    telegram: Option<TelegramClient>,
}

/// Validate, open the store and wire sources and notifier together.
async fn build_app(config: &Config, dry_run: bool) -> Result<App> {
    config.validate(!dry_run)?;

    let store = storage::open(&config.storage, dry_run).await?;
    let sources = build_sources(config)?;
    log::info!(
        "Sources: {}",
        sources
            .iter()
            .map(|s| s.kind().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let (notifier, telegram): (Arc<dyn Notifier>, Option<TelegramClient>) = if dry_run {
        log::info!("Dry run: alerts are logged, not sent");
        (Arc::new(LogNotifier), None)
    } else {
        let client =
            TelegramClient::new(http::create_async_client(&config.http)?, &config.telegram);
        (
            Arc::new(TelegramNotifier::new(client.clone(), &config.telegram.chat_id)),
            Some(client),
        )
    };

    let pipeline = Pipeline::new(
        Arc::clone(&store),
        sources,
        notifier,
        config.criteria.clone(),
    )
    .with_stale_after(config.notify.stale_after());

    Ok(App {
        pipeline: Arc::new(pipeline),
        store,
        telegram,
    })
}

async fn run(config: Config, dry_run: bool) -> Result<()> {
    let app = build_app(&config, dry_run).await?;

    let notice = format!(
        "🚀 *flatwatch started*\n\n📋 *Criteria:*\n{}\n\n⏱️ Checking every {} minutes.",
        config.criteria.summary(),
        config.scheduler.interval_minutes
    );
    log::info!("{}", notice);
    if !dry_run {
        if let Err(e) = app.pipeline.notifier().send_text(&notice).await {
            log::warn!("Startup notice not delivered: {}", e);
        }
    }

    let cancel = CancellationToken::new();
    let scheduler = Scheduler::new(Arc::clone(&app.pipeline), config.scheduler.interval())
        .run_on_startup(config.scheduler.run_on_startup);
    let handle = CommandHandle::new(Arc::clone(&app.pipeline), scheduler.handle());
    let scheduler_task = scheduler.spawn(cancel.clone());

    let bot_task = match app.telegram {
        Some(client) if config.telegram.commands_enabled => {
            let bot = CommandBot::new(client, &config.telegram.chat_id, handle);
            Some(tokio::spawn(bot.run(cancel.clone())))
        }
        _ => {
            log::info!("Command bot disabled");
            None
        }
    };

    shutdown_signal().await;
    log::info!("Shutdown requested, finishing the current step...");
    cancel.cancel();

    if let Some(task) = bot_task {
        if let Err(e) = task.await {
            log::error!("Command bot task failed: {}", e);
        }
    }
    if let Err(e) = scheduler_task.await {
        log::error!("Scheduler task failed: {}", e);
    }

    app.store.close().await;
    log::info!("Bye");
    Ok(())
}

async fn once(config: Config, dry_run: bool) -> Result<()> {
    let app = build_app(&config, dry_run).await?;
    let run = app
        .pipeline
        .run_cycle(1, Trigger::Manual, &CancellationToken::new())
        .await;

    for stats in &run.sources {
        log::info!(
            "{:<9} fetched {:>3}  new {:>3}  matched {:>3}  notified {:>3}  errors {:>2}",
            stats.source.as_str(),
            stats.fetched,
            stats.new,
            stats.filtered_in,
            stats.notified,
            stats.errors
        );
        if let Some(err) = &stats.last_error {
            log::info!("          last error: {}", err);
        }
    }
    log::info!("{}", run.summary_line());

    app.store.close().await;
    match run.storage_error {
        Some(message) => Err(AppError::Cycle(format!("storage failure: {message}"))),
        None => Ok(()),
    }
}

async fn recent(config: &Config, count: usize) -> Result<()> {
    let store = SqliteStore::open(&config.storage.database_path).await?;
    let listings = store.recent(count).await?;
    if listings.is_empty() {
        log::info!("No listings stored yet.");
    }
    for listing in listings {
        let status = match listing.delivery {
            Some(delivery) => delivery.as_str(),
            None => "pending",
        };
        println!(
            "{}  {:<9} {:>8}  {:>4} rooms  floor {:>4}  {:<10} {}\n    {}",
            listing.first_seen_at.format("%Y-%m-%d %H:%M"),
            listing.source.as_str(),
            flatwatch::models::format_price(listing.price),
            listing.rooms.map_or_else(|| "?".to_string(), |r| r.to_string()),
            listing.floor.map_or_else(|| "?".to_string(), |f| f.to_string()),
            status,
            listing.title,
            listing.url
        );
    }
    store.close().await;
    Ok(())
}

fn validate(config: &Config) -> Result<()> {
    log::info!("Validating configuration...");
    config.validate(true)?;
    let sources = build_sources(config)?;
    log::info!("✓ {} enabled sources with valid selectors", sources.len());
    log::info!("✓ Criteria:\n{}", config.criteria.summary());
    log::info!("All validations passed!");
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
