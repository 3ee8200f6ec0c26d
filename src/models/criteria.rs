//! Acceptance criteria for listings.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// User-defined acceptance criteria, fixed for the lifetime of the process.
///
/// Unset bounds are inactive. An empty `districts` list accepts any district.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    #[serde(default)]
    pub min_rooms: Option<f64>,

    #[serde(default)]
    pub max_rooms: Option<f64>,

    #[serde(default)]
    pub min_floor: Option<i32>,

    #[serde(default)]
    pub max_price: Option<f64>,

    /// Accepted districts, compared case-insensitively
    #[serde(default)]
    pub districts: Vec<String>,

    /// Case-insensitive substrings that reject a listing
    #[serde(default)]
    pub exclude_keywords: Vec<String>,
}

impl Criteria {
    /// True when at least one bound or set would reject something.
    pub fn has_active_bound(&self) -> bool {
        self.min_rooms.is_some()
            || self.max_rooms.is_some()
            || self.min_floor.is_some_and(|f| f != 0)
            || self.max_price.is_some()
            || !self.districts.is_empty()
            || !self.exclude_keywords.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.has_active_bound() {
            return Err(AppError::config(
                "criteria: at least one bound (rooms, floor, price, districts, exclude_keywords) must be set",
            ));
        }
        if let (Some(min), Some(max)) = (self.min_rooms, self.max_rooms) {
            if min > max {
                return Err(AppError::config(format!(
                    "criteria.min_rooms ({min}) is greater than criteria.max_rooms ({max})"
                )));
            }
        }
        for (name, value) in [
            ("min_rooms", self.min_rooms),
            ("max_rooms", self.max_rooms),
            ("max_price", self.max_price),
        ] {
            if value.is_some_and(|v| v.is_nan() || v < 0.0) {
                return Err(AppError::config(format!(
                    "criteria.{name} must be a non-negative number"
                )));
            }
        }
        if self.exclude_keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(AppError::config(
                "criteria.exclude_keywords contains an empty keyword",
            ));
        }
        Ok(())
    }

    /// Human-readable summary for chat replies and the startup notice.
    pub fn summary(&self) -> String {
        let rooms = match (self.min_rooms, self.max_rooms) {
            (Some(min), Some(max)) => format!("{min}–{max}"),
            (Some(min), None) => format!("≥ {min}"),
            (None, Some(max)) => format!("≤ {max}"),
            (None, None) => "Any".to_string(),
        };
        let floor = self
            .min_floor
            .map_or_else(|| "Any".to_string(), |f| f.to_string());
        let price = self
            .max_price
            .map_or_else(|| "Any".to_string(), |p| format!("{}/month", format_price(p)));
        let districts = if self.districts.is_empty() {
            "Any".to_string()
        } else {
            self.districts.join(", ")
        };
        let excluded = if self.exclude_keywords.is_empty() {
            "None".to_string()
        } else {
            self.exclude_keywords.join(", ")
        };

        format!(
            "🛏️ Rooms: {rooms}\n🏢 Min Floor: {floor}\n💰 Max Price: {price}\n📍 Districts: {districts}\n🚫 Excluded: {excluded}"
        )
    }
}

/// Format a euro amount with thousands separators and no decimals, e.g. `€1,200`.
pub fn format_price(price: f64) -> String {
    let rounded = price.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if rounded < 0 { "-" } else { "" };
    format!("{sign}€{grouped}")
}
