// src/commands/mod.rs

//! Operator command interface.
//!
//! `CommandHandle` is the thin client the chat bot (or anything else) uses
//! to read state and steer the scheduler. Reads go straight to the store;
//! control goes through the scheduler handle, so no command ever waits for
//! a running cycle.

pub mod bot;

use std::sync::Arc;

use crate::error::StorageError;
use crate::models::{Criteria, CycleRun, Listing, format_price};
use crate::pipeline::{Pipeline, SchedulerHandle, SchedulerState, TriggerOutcome};
use crate::services::telegram::escape_markdown;

pub use bot::CommandBot;

/// Default and maximum number of listings shown by `/list`.
pub const DEFAULT_LIST_LEN: usize = 5;
pub const MAX_LIST_LEN: usize = 20;

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Filter,
    List(usize),
    Refresh,
    Pause,
    Resume,
    Status,
    Unknown(String),
}

impl Command {
    /// Parse a message. Returns `None` for text that is not a command.
    ///
    /// Accepts the `/cmd@BotName` form Telegram uses in group chats.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split_whitespace();
        let head = parts.next()?.strip_prefix('/')?;
        let name = head.split('@').next().unwrap_or(head).to_lowercase();

        let command = match name.as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "filter" => Self::Filter,
            "list" => {
                let n = parts
                    .next()
                    .and_then(|arg| arg.parse::<usize>().ok())
                    .unwrap_or(DEFAULT_LIST_LEN);
                Self::List(n.clamp(1, MAX_LIST_LEN))
            }
            "refresh" => Self::Refresh,
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "status" => Self::Status,
            _ => Self::Unknown(name),
        };
        Some(command)
    }
}

/// Snapshot returned by `CommandHandle::status`.
#[derive(Debug, Clone)]
pub struct Status {
    pub state: SchedulerState,
    pub last_run: Option<CycleRun>,
    pub stored: Option<usize>,
}

/// Operations available to the operator.
#[derive(Clone)]
pub struct CommandHandle {
    pipeline: Arc<Pipeline>,
    scheduler: SchedulerHandle,
}

impl CommandHandle {
    pub fn new(pipeline: Arc<Pipeline>, scheduler: SchedulerHandle) -> Self {
        Self {
            pipeline,
            scheduler,
        }
    }

    pub fn get_criteria(&self) -> &Criteria {
        self.pipeline.criteria()
    }

    pub async fn list_recent(&self, n: usize) -> Result<Vec<Listing>, StorageError> {
        self.pipeline.store().recent(n).await
    }

    pub fn trigger_manual_cycle(&self) -> TriggerOutcome {
        self.scheduler.trigger()
    }

    pub fn pause(&self) -> bool {
        self.scheduler.pause()
    }

    pub fn resume(&self) -> bool {
        self.scheduler.resume()
    }

    pub async fn status(&self) -> Status {
        let stored = match self.pipeline.store().count().await {
            Ok(count) => Some(count),
            Err(e) => {
                log::warn!("Could not count listings: {}", e);
                None
            }
        };
        Status {
            state: self.scheduler.state(),
            last_run: self.scheduler.last_run(),
            stored,
        }
    }

    /// Execute a command and produce the Markdown reply.
    pub async fn execute(&self, command: &Command) -> String {
        match command {
            Command::Start => format!(
                "👋 Welcome to *flatwatch*!\n\n\
                 I'll notify you when new flats matching your criteria are found.\n\n\
                 📋 *Current criteria:*\n{}\n\n\
                 Use /help to see all available commands.",
                self.get_criteria().summary()
            ),
            Command::Help => HELP_TEXT.to_string(),
            Command::Filter => format!(
                "📋 *Active search criteria:*\n\n{}",
                self.get_criteria().summary()
            ),
            Command::List(n) => match self.list_recent(*n).await {
                Ok(listings) => format_listing_list(&listings),
                Err(e) => {
                    log::error!("/list failed: {}", e);
                    "⚠️ Could not read listings. Please try again.".to_string()
                }
            },
            Command::Refresh => match self.trigger_manual_cycle() {
                TriggerOutcome::Queued if self.scheduler.state() == SchedulerState::Running => {
                    "🔄 A cycle is running; another one will start right after it.".to_string()
                }
                TriggerOutcome::Queued => "🔄 Manual scrape triggered!".to_string(),
                TriggerOutcome::Coalesced => {
                    "⏳ A manual scrape is already pending.".to_string()
                }
                TriggerOutcome::Stopped => "⚠️ Scheduler is not available.".to_string(),
            },
            Command::Pause => {
                if self.pause() {
                    "⏸️ Automatic scraping paused. /refresh still works.".to_string()
                } else {
                    "⏸️ Already paused.".to_string()
                }
            }
            Command::Resume => {
                if self.resume() {
                    "▶️ Automatic scraping resumed.".to_string()
                } else {
                    "▶️ Not paused.".to_string()
                }
            }
            Command::Status => format_status(&self.status().await),
            Command::Unknown(name) => format!(
                "Unknown command /{}. Use /help to see all available commands.",
                escape_markdown(name)
            ),
        }
    }
}

const HELP_TEXT: &str = "🤖 *flatwatch commands*\n\n\
    /start - Welcome message & current criteria\n\
    /filter - Show active search criteria\n\
    /list \\[n] - Show the n most recent listings (default 5)\n\
    /refresh - Trigger a scrape now\n\
    /pause - Pause automatic scraping\n\
    /resume - Resume automatic scraping\n\
    /status - Scheduler state and last cycle\n\
    /help - Show this help message";

fn format_listing_list(listings: &[Listing]) -> String {
    if listings.is_empty() {
        return "📭 No listings found in the database yet.".to_string();
    }
    let mut lines = vec!["🏠 *Recent listings:*\n".to_string()];
    for (i, listing) in listings.iter().enumerate() {
        let label = listing.address.as_deref().unwrap_or(&listing.title);
        lines.push(format!(
            "{}. [{} - {}]({})",
            i + 1,
            escape_markdown(label),
            format_price(listing.price),
            listing.url
        ));
    }
    lines.join("\n")
}

fn format_status(status: &Status) -> String {
    let mut lines = vec![format!("📊 *Scheduler:* {}", status.state)];
    if let Some(count) = status.stored {
        lines.push(format!("🗄️ *Stored listings:* {count}"));
    }

    let Some(run) = &status.last_run else {
        lines.push("No cycle has completed yet.".to_string());
        return lines.join("\n");
    };

    lines.push(format!(
        "🕑 *Last cycle:* #{} ({:?}) at {}{}",
        run.id,
        run.trigger,
        run.started_at.format("%Y-%m-%d %H:%M UTC"),
        run.duration_ms()
            .map(|ms| format!(", {:.1}s", ms as f64 / 1000.0))
            .unwrap_or_default()
    ));
    lines.push(format!(
        "Fetched {}, new {}, matched {}, notified {}, suppressed {}, errors {}",
        run.total_fetched(),
        run.total_new(),
        run.total_filtered_in(),
        run.total_notified(),
        run.suppressed,
        run.total_errors()
    ));
    for stats in &run.sources {
        let mut line = format!(
            "• {}: {} fetched, {} new, {} errors",
            stats.source, stats.fetched, stats.new, stats.errors
        );
        if let Some(err) = &stats.last_error {
            line.push_str(&format!(" ({})", escape_markdown(err)));
        }
        lines.push(line);
    }
    if let Some(err) = &run.storage_error {
        lines.push(format!("⚠️ Storage: {}", escape_markdown(err)));
    }
    if run.interrupted {
        lines.push("⚠️ Cycle was interrupted by shutdown.".to_string());
    }
    lines.join("\n")
}
