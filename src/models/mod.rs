// src/models/mod.rs

//! Domain models for the listing watcher.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod criteria;
mod cycle;
mod listing;
mod selectors;

// Re-export all public types
pub use config::{
    Config, HttpConfig, LoggingConfig, NotifyConfig, SchedulerConfig, SourceConfig,
    StorageConfig, TelegramConfig,
};
pub use criteria::{Criteria, format_price};
pub use cycle::{CycleRun, SourceStats, Trigger};
pub use listing::{Delivery, Listing, RawListing, SourceKind};
pub use selectors::{Pagination, SiteSelectors};
