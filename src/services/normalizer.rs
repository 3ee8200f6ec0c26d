// src/services/normalizer.rs

//! Record normalizer: raw page extractions into canonical listings.

use chrono::{DateTime, Utc};

use crate::error::NormalizeError;
use crate::models::{Listing, RawListing, SourceKind};
use crate::utils::canonical_url;
use crate::utils::parse::{
    collapse_whitespace, district_from_address, parse_area, parse_floor, parse_price,
    parse_rooms,
};

/// Convert a raw record into a `Listing` first seen at `now`.
///
/// `url` and `price` are required. The title falls back to the address, and
/// the district to the last segment of the address.
pub fn normalize(
    source: SourceKind,
    raw: &RawListing,
    now: DateTime<Utc>,
) -> Result<Listing, NormalizeError> {
    let raw_url = non_empty(raw.url.as_deref()).ok_or(NormalizeError::MissingField("url"))?;
    let url = canonical_url(&raw_url).ok_or_else(|| NormalizeError::invalid("url", &raw_url))?;

    let raw_price =
        non_empty(raw.price.as_deref()).ok_or(NormalizeError::MissingField("price"))?;
    let price = parse_price(&raw_price).ok_or_else(|| NormalizeError::invalid("price", &raw_price))?;

    let address = non_empty(raw.address.as_deref());
    let title = non_empty(raw.title.as_deref())
        .or_else(|| address.clone())
        .ok_or(NormalizeError::MissingField("title"))?;

    let district = non_empty(raw.district.as_deref())
        .or_else(|| address.as_deref().and_then(district_from_address));

    Ok(Listing {
        url,
        source,
        title,
        price,
        rooms: raw.rooms.as_deref().and_then(parse_rooms),
        floor: raw.floor.as_deref().and_then(parse_floor),
        area_sqm: raw.area.as_deref().and_then(parse_area),
        district,
        address,
        description: non_empty(raw.description.as_deref()).unwrap_or_default(),
        first_seen_at: now,
        notified: false,
        delivery: None,
        notified_at: None,
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(collapse_whitespace)
        .filter(|v| !v.is_empty())
}
