// src/models/listing.rs

//! Listing data structures.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Site a listing originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Scout24,
    Immowelt,
    Immonet,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [Self::Scout24, Self::Immowelt, Self::Immonet];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scout24 => "scout24",
            Self::Immowelt => "immowelt",
            Self::Immonet => "immonet",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown source '{s}'"))
    }
}

/// Unprocessed record as extracted from a source page.
///
/// Every field is optional text; interpretation happens in the normalizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    pub url: Option<String>,
    pub title: Option<String>,
    pub address: Option<String>,
    pub price: Option<String>,
    pub rooms: Option<String>,
    pub floor: Option<String>,
    pub area: Option<String>,
    pub district: Option<String>,
    pub description: Option<String>,
}

/// How a listing left the un-notified set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    /// An alert was delivered.
    Alerted,
    /// Rejected by the filter (or stale); never alerted.
    Suppressed,
}

impl Delivery {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alerted => "alerted",
            Self::Suppressed => "suppressed",
        }
    }
}

impl FromStr for Delivery {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alerted" => Ok(Self::Alerted),
            "suppressed" => Ok(Self::Suppressed),
            other => Err(format!("unknown delivery '{other}'")),
        }
    }
}

/// Canonical rental listing. `url` is the identity key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Absolute listing URL, unique across all sources
    pub url: String,

    /// Originating site
    pub source: SourceKind,

    pub title: String,

    /// Monthly rent in euros
    pub price: f64,

    /// Room count, may be fractional ("2,5 Zimmer")
    pub rooms: Option<f64>,

    /// Floor number; 0 is ground floor, unknown stays `None`
    pub floor: Option<i32>,

    /// Living area in square metres
    pub area_sqm: Option<f64>,

    pub district: Option<String>,

    pub address: Option<String>,

    pub description: String,

    pub first_seen_at: DateTime<Utc>,

    /// Flips false -> true exactly once
    #[serde(default)]
    pub notified: bool,

    /// Set together with `notified`
    #[serde(default)]
    pub delivery: Option<Delivery>,

    #[serde(default)]
    pub notified_at: Option<DateTime<Utc>>,
}

impl Listing {
    /// Title and description joined for keyword matching.
    pub fn searchable_text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }
}
