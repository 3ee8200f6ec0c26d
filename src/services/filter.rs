// src/services/filter.rs

//! Filter engine: evaluates a listing against the acceptance criteria.
//!
//! Rules run in a fixed order and stop at the first rejection:
//! rooms, floor, price, district, excluded keywords. A field that an active
//! rule needs but the listing lacks rejects the listing.

use std::fmt;

use crate::models::{Criteria, Listing};

/// Why a listing was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    RoomsUnknown,
    RoomsOutOfRange(f64),
    FloorUnknown,
    FloorTooLow(i32),
    PriceTooHigh(f64),
    DistrictUnknown,
    DistrictNotAccepted(String),
    ExcludedKeyword(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoomsUnknown => write!(f, "rooms unknown"),
            Self::RoomsOutOfRange(r) => write!(f, "{r} rooms out of range"),
            Self::FloorUnknown => write!(f, "floor unknown"),
            Self::FloorTooLow(fl) => write!(f, "floor {fl} too low"),
            Self::PriceTooHigh(p) => write!(f, "price {p} too high"),
            Self::DistrictUnknown => write!(f, "district unknown"),
            Self::DistrictNotAccepted(d) => write!(f, "district {d:?} not accepted"),
            Self::ExcludedKeyword(k) => write!(f, "contains excluded keyword {k:?}"),
        }
    }
}

/// Evaluate all rules, returning the first rejection.
pub fn evaluate(listing: &Listing, criteria: &Criteria) -> Result<(), Rejection> {
    check_rooms(listing, criteria)?;
    check_floor(listing, criteria)?;
    check_price(listing, criteria)?;
    check_district(listing, criteria)?;
    check_keywords(listing, criteria)
}

/// Whether `listing` passes every active rule of `criteria`.
pub fn matches(listing: &Listing, criteria: &Criteria) -> bool {
    evaluate(listing, criteria).is_ok()
}

fn check_rooms(listing: &Listing, criteria: &Criteria) -> Result<(), Rejection> {
    if criteria.min_rooms.is_none() && criteria.max_rooms.is_none() {
        return Ok(());
    }
    let rooms = listing.rooms.ok_or(Rejection::RoomsUnknown)?;
    let above_min = criteria.min_rooms.is_none_or(|min| rooms >= min);
    let below_max = criteria.max_rooms.is_none_or(|max| rooms <= max);
    if above_min && below_max {
        Ok(())
    } else {
        Err(Rejection::RoomsOutOfRange(rooms))
    }
}

fn check_floor(listing: &Listing, criteria: &Criteria) -> Result<(), Rejection> {
    let Some(min_floor) = criteria.min_floor else {
        return Ok(());
    };
    match listing.floor {
        Some(floor) if floor >= min_floor => Ok(()),
        Some(floor) => Err(Rejection::FloorTooLow(floor)),
        None if min_floor == 0 => Ok(()),
        None => Err(Rejection::FloorUnknown),
    }
}

fn check_price(listing: &Listing, criteria: &Criteria) -> Result<(), Rejection> {
    match criteria.max_price {
        Some(max) if listing.price > max => Err(Rejection::PriceTooHigh(listing.price)),
        _ => Ok(()),
    }
}

fn check_district(listing: &Listing, criteria: &Criteria) -> Result<(), Rejection> {
    if criteria.districts.is_empty() {
        return Ok(());
    }
    let district = listing
        .district
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or(Rejection::DistrictUnknown)?;
    let district_lower = district.to_lowercase();
    if criteria
        .districts
        .iter()
        .any(|accepted| accepted.trim().to_lowercase() == district_lower)
    {
        Ok(())
    } else {
        Err(Rejection::DistrictNotAccepted(district.to_string()))
    }
}

fn check_keywords(listing: &Listing, criteria: &Criteria) -> Result<(), Rejection> {
    if criteria.exclude_keywords.is_empty() {
        return Ok(());
    }
    let text = listing.searchable_text().to_lowercase();
    match criteria
        .exclude_keywords
        .iter()
        .find(|kw| text.contains(&kw.to_lowercase()))
    {
        Some(kw) => Err(Rejection::ExcludedKeyword(kw.clone())),
        None => Ok(()),
    }
}
