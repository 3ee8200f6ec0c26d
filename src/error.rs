// src/error.rs

//! Unified error handling for the listing watcher.
//!
//! `AppError` is the crate-wide error. The per-stage errors below it are
//! recoverable inside a cycle and end up as counters on a `CycleRun`;
//! only `AppError::Config` is fatal, and only at startup.

use std::fmt;

use thiserror::Error;

use crate::models::SourceKind;

/// Result type alias for application operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A one-shot cycle could not complete
    #[error("Cycle failed: {0}")]
    Cycle(String),

    /// Storage backend failed
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// A source could not be fetched; the source is skipped for this cycle.
#[derive(Error, Debug)]
#[error("fetch from {site} failed: {cause}")]
pub struct FetchError {
    pub site: SourceKind,
    pub cause: String,
}

impl FetchError {
    pub fn new(site: SourceKind, cause: impl fmt::Display) -> Self {
        Self {
            site,
            cause: cause.to_string(),
        }
    }
}

/// A raw record could not be turned into a `Listing`; the record is dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

impl NormalizeError {
    pub fn invalid(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            value: value.into(),
        }
    }
}

/// Storage I/O failed; the current persistence step is aborted.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt row for {url}: {message}")]
    Corrupt { url: String, message: String },
}

impl StorageError {
    pub fn corrupt(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Corrupt {
            url: url.into(),
            message: message.to_string(),
        }
    }
}

/// Alert delivery failed; the listing stays eligible for the next cycle.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed API response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("rejected by API ({status}): {description}")]
    Rejected { status: u16, description: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_names_source() {
        let err = FetchError::new(SourceKind::Immowelt, "HTTP 503");
        assert_eq!(err.to_string(), "fetch from immowelt failed: HTTP 503");
    }

    #[test]
    fn normalize_error_display() {
        assert_eq!(
            NormalizeError::MissingField("price").to_string(),
            "missing required field 'price'"
        );
        assert_eq!(
            NormalizeError::invalid("url", "not a url").to_string(),
            "invalid url: not a url"
        );
    }

    #[test]
    fn config_error_is_descriptive() {
        let err = AppError::config("telegram.bot_token is empty");
        assert_eq!(
            err.to_string(),
            "Configuration error: telegram.bot_token is empty"
        );
    }
}
