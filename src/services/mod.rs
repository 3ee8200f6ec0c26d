//! Service layer of the listing watcher.
//!
//! This module contains the stages a cycle is built from:
//! - Source adapters (`Source`, `HtmlSource`)
//! - Record normalization (`normalize`)
//! - The filter engine (`matches`)
//! - Alert delivery (`Notifier`, `TelegramNotifier`, `LogNotifier`)

pub mod filter;
pub mod normalizer;
pub mod notifier;
pub mod sources;
pub mod telegram;

pub use filter::{Rejection, evaluate, matches};
pub use normalizer::normalize;
pub use notifier::{LogNotifier, Notifier, TelegramNotifier, format_message};
pub use sources::{ExtractedPage, HtmlSource, Source, build_sources};
pub use telegram::TelegramClient;
