//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{Criteria, SiteSelectors, SourceKind};

/// Longest accepted cycle interval (one week).
pub const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Most extra attempts allowed for one page request.
pub const MAX_RETRIES: u32 = 10;

/// Levels accepted for `logging.level` / `LOG_LEVEL`.
pub const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Cycle cadence
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Acceptance criteria
    #[serde(default = "defaults::criteria")]
    pub criteria: Criteria,

    /// HTTP behavior for source adapters
    #[serde(default)]
    pub http: HttpConfig,

    /// Listing database
    #[serde(default)]
    pub storage: StorageConfig,

    /// Telegram credentials and command bot
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Notification policy
    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Listing sites to poll
    #[serde(default = "defaults::sources")]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply overrides from process environment variables.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Recognized keys: `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`,
    /// `DATABASE_PATH`, `LOG_LEVEL`, `LOG_FILE`, `SCRAPE_INTERVAL_MINUTES`.
    /// A value that does not parse is a config error.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(chat_id) = get("TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = chat_id;
        }
        if let Some(path) = get("DATABASE_PATH") {
            self.storage.database_path = PathBuf::from(path);
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.logging.level = level.trim().to_lowercase();
        }
        if let Some(file) = get("LOG_FILE") {
            self.logging.file = Some(PathBuf::from(file));
        }
        if let Some(interval) = get("SCRAPE_INTERVAL_MINUTES") {
            self.scheduler.interval_minutes = interval.trim().parse().map_err(|_| {
                AppError::config(format!(
                    "SCRAPE_INTERVAL_MINUTES={interval:?} is not a whole number of minutes"
                ))
            })?;
        }
        Ok(())
    }

    /// Validate configuration values; fails fast with a descriptive error.
    ///
    /// Telegram credentials are only required when alerts are really sent.
    pub fn validate(&self, require_telegram: bool) -> Result<()> {
        if self.scheduler.interval_minutes == 0 {
            return Err(AppError::config("scheduler.interval_minutes must be > 0"));
        }
        if self.scheduler.interval_minutes > MAX_INTERVAL_MINUTES {
            return Err(AppError::config(format!(
                "scheduler.interval_minutes must be <= {MAX_INTERVAL_MINUTES}"
            )));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::config("http.timeout_secs must be > 0"));
        }
        if self.http.retries > MAX_RETRIES {
            return Err(AppError::config(format!(
                "http.retries must be <= {MAX_RETRIES}"
            )));
        }
        if self.notify.stale_after_hours > 0 && self.notify.stale_after().is_none() {
            return Err(AppError::config(format!(
                "notify.stale_after_hours = {} is out of range",
                self.notify.stale_after_hours
            )));
        }
        self.logging.validate()?;
        if self.http.user_agents.iter().all(|ua| ua.trim().is_empty()) {
            return Err(AppError::config("http.user_agents has no usable entry"));
        }
        if self.storage.database_path.as_os_str().is_empty() {
            return Err(AppError::config("storage.database_path is empty"));
        }
        if require_telegram {
            if self.telegram.bot_token.trim().is_empty() {
                return Err(AppError::config(
                    "telegram.bot_token is not set (config file or TELEGRAM_BOT_TOKEN)",
                ));
            }
            if self.telegram.chat_id.trim().is_empty() {
                return Err(AppError::config(
                    "telegram.chat_id is not set (config file or TELEGRAM_CHAT_ID)",
                ));
            }
        }

        let enabled: Vec<&SourceConfig> = self.enabled_sources().collect();
        if enabled.is_empty() {
            return Err(AppError::config("no enabled source in [[sources]]"));
        }
        for (i, source) in enabled.iter().enumerate() {
            if enabled[..i].iter().any(|other| other.kind == source.kind) {
                return Err(AppError::config(format!(
                    "source {} is configured more than once",
                    source.kind
                )));
            }
            let url = url::Url::parse(&source.base_url).map_err(|e| {
                AppError::config(format!(
                    "sources.{}.base_url {:?} is invalid: {e}",
                    source.kind, source.base_url
                ))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(AppError::config(format!(
                    "sources.{}.base_url must be http(s)",
                    source.kind
                )));
            }
            if source.max_pages == 0 {
                return Err(AppError::config(format!(
                    "sources.{}.max_pages must be > 0",
                    source.kind
                )));
            }
        }

        self.criteria.validate()
    }

    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            criteria: defaults::criteria(),
            http: HttpConfig::default(),
            storage: StorageConfig::default(),
            telegram: TelegramConfig::default(),
            notify: NotifyConfig::default(),
            logging: LoggingConfig::default(),
            sources: defaults::sources(),
        }
    }
}

/// Cycle cadence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Minutes between timer-triggered cycles
    #[serde(default = "defaults::interval_minutes")]
    pub interval_minutes: u64,

    /// Run one cycle right after startup
    #[serde(default = "defaults::enabled")]
    pub run_on_startup: bool,
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_minutes: defaults::interval_minutes(),
            run_on_startup: true,
        }
    }
}

/// HTTP client settings shared by all sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent headers, one picked at random per request
    #[serde(default = "defaults::user_agents")]
    pub user_agents: Vec<String>,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between page requests in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Extra attempts for a failed page request
    #[serde(default = "defaults::retries")]
    pub retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agents: defaults::user_agents(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            retries: defaults::retries(),
        }
    }
}

/// Listing database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "defaults::database_path")]
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: defaults::database_path(),
        }
    }
}

/// Telegram bot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,

    /// Chat that receives alerts and may issue commands
    #[serde(default)]
    pub chat_id: String,

    /// Serve chat commands (/list, /refresh, ...)
    #[serde(default = "defaults::enabled")]
    pub commands_enabled: bool,

    #[serde(default = "defaults::telegram_api")]
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            commands_enabled: true,
            api_base: defaults::telegram_api(),
        }
    }
}

/// Notification policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Un-notified listings older than this are suppressed instead of alerted.
    /// 0 disables the check.
    #[serde(default = "defaults::stale_after_hours")]
    pub stale_after_hours: u64,
}

impl NotifyConfig {
    /// The staleness window; `None` when disabled or not representable.
    pub fn stale_after(&self) -> Option<chrono::Duration> {
        if self.stale_after_hours == 0 {
            return None;
        }
        i64::try_from(self.stale_after_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            stale_after_hours: defaults::stale_after_hours(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,

    /// Also write logs to this file, rotated daily
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Rotated log files to keep
    #[serde(default = "defaults::keep_log_files")]
    pub keep_files: usize,
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<()> {
        let level = self.level.trim().to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(AppError::config(format!(
                "logging.level {:?} must be one of {}",
                self.level,
                LOG_LEVELS.join(", ")
            )));
        }
        if let Some(file) = &self.file {
            if file.file_name().is_none() {
                return Err(AppError::config(format!(
                    "logging.file {} has no file name",
                    file.display()
                )));
            }
            if self.keep_files == 0 {
                return Err(AppError::config("logging.keep_files must be > 0"));
            }
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
            file: None,
            keep_files: defaults::keep_log_files(),
        }
    }
}

/// A listing site to poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKind,

    /// Search result URL (page 1)
    pub base_url: String,

    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    #[serde(default = "defaults::max_pages")]
    pub max_pages: u32,

    /// Replaces the built-in selector profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selectors: Option<SiteSelectors>,
}

impl SourceConfig {
    pub fn new(kind: SourceKind, base_url: impl Into<String>) -> Self {
        Self {
            kind,
            base_url: base_url.into(),
            enabled: true,
            max_pages: defaults::max_pages(),
            selectors: None,
        }
    }

    /// Configured selectors, or the built-in profile for this site.
    pub fn selectors(&self) -> SiteSelectors {
        self.selectors
            .clone()
            .unwrap_or_else(|| SiteSelectors::for_source(self.kind))
    }
}

mod defaults {
    use std::path::PathBuf;

    use super::SourceConfig;
    use crate::models::{Criteria, SourceKind};

    pub fn enabled() -> bool {
        true
    }

    // Scheduler defaults
    pub fn interval_minutes() -> u64 {
        30
    }

    // HTTP defaults
    pub fn user_agents() -> Vec<String> {
        vec![
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".into(),
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15".into(),
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36".into(),
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0".into(),
        ]
    }
    pub fn timeout() -> u64 {
        10
    }
    pub fn request_delay() -> u64 {
        2000
    }
    pub fn retries() -> u32 {
        2
    }

    pub fn database_path() -> PathBuf {
        PathBuf::from("data/flats.db")
    }

    pub fn telegram_api() -> String {
        "https://api.telegram.org".into()
    }

    pub fn stale_after_hours() -> u64 {
        24
    }

    pub fn log_level() -> String {
        "info".into()
    }
    pub fn keep_log_files() -> usize {
        7
    }

    pub fn max_pages() -> u32 {
        3
    }

    pub fn criteria() -> Criteria {
        Criteria {
            min_rooms: Some(2.0),
            max_rooms: Some(4.0),
            min_floor: Some(2),
            max_price: Some(1500.0),
            districts: Vec::new(),
            exclude_keywords: Vec::new(),
        }
    }

    pub fn sources() -> Vec<SourceConfig> {
        vec![
            SourceConfig::new(
                SourceKind::Scout24,
                "https://www.immobilienscout24.de/Suche/de/berlin/berlin/wohnung-mieten",
            ),
            SourceConfig::new(
                SourceKind::Immowelt,
                "https://www.immowelt.de/liste/berlin/wohnungen/mieten",
            ),
            SourceConfig::new(
                SourceKind::Immonet,
                "https://www.immonet.de/immobiliensuche/sel.do?city=Berlin&marketingtype=1&objecttype=1",
            ),
        ]
    }
}
