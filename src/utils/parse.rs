// src/utils/parse.rs

//! Parsers for German-formatted listing text.
//!
//! Sites render numbers with `.` as thousands separator and `,` as decimal
//! separator ("1.200,50 €", "3,5 Zimmer", "65,5 m²").

use std::sync::OnceLock;

use regex::Regex;

fn german_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\d{1,3}(?:\.\d{3})+(?:,\d+)?|\d+(?:,\d+)?").expect("valid regex")
    })
}

fn first_int_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d+").expect("valid regex"))
}

fn top_floor_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bdg\b|dachgeschoss").expect("valid regex"))
}

fn ground_floor_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\beg\b|erdgeschoss|parterre").expect("valid regex"))
}

fn basement_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bug\b|souterrain|untergeschoss").expect("valid regex"))
}

/// Floor number used for attic flats ("DG") whose real level is unknown.
pub const TOP_FLOOR: i32 = 99;

/// Collapse runs of whitespace (including non-breaking spaces) and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// First German-formatted number in `text`.
pub fn parse_german_number(text: &str) -> Option<f64> {
    let cleaned = text.replace('\u{a0}', " ");
    let raw = german_number_re().find(&cleaned)?.as_str();
    raw.replace('.', "").replace(',', ".").parse().ok()
}

/// Monthly rent from strings like "1.200,50 €" or "950 €/Monat".
pub fn parse_price(text: &str) -> Option<f64> {
    parse_german_number(text).filter(|p| *p > 0.0)
}

/// Room count from "3 Zimmer" or "2,5 Zi.". Fractional counts are kept.
pub fn parse_rooms(text: &str) -> Option<f64> {
    parse_german_number(text).filter(|r| *r > 0.0)
}

/// Living area from "65,5 m²".
pub fn parse_area(text: &str) -> Option<f64> {
    parse_german_number(text).filter(|a| *a > 0.0)
}

/// Floor from German descriptions.
///
/// "EG"/"Erdgeschoss" is 0, "UG"/"Souterrain" is -1, "DG"/"Dachgeschoss" is
/// `TOP_FLOOR`; otherwise the first integer ("2. OG", "Etage 3 von 5").
pub fn parse_floor(text: &str) -> Option<i32> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if ground_floor_re().is_match(text) {
        return Some(0);
    }
    if basement_re().is_match(text) {
        return Some(-1);
    }
    if top_floor_re().is_match(text) {
        return Some(TOP_FLOOR);
    }
    first_int_re().find(text)?.as_str().parse().ok()
}

/// District from an address such as "Weserstraße 5, 12047 Berlin, Neukölln":
/// the last comma-separated segment, with a leading postcode removed.
pub fn district_from_address(address: &str) -> Option<String> {
    let (_, last) = address.rsplit_once(',')?;
    let last = last.trim();
    let without_postcode = last
        .split_once(' ')
        .filter(|(head, _)| head.len() == 5 && head.chars().all(|c| c.is_ascii_digit()))
        .map_or(last, |(_, rest)| rest.trim());
    (!without_postcode.is_empty()).then(|| without_postcode.to_string())
}

/// Kind of value a "key fact" snippet describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fact {
    Price,
    Rooms,
    Area,
    Floor,
}

/// Classify a key-fact snippet by its unit or keyword.
pub fn classify_fact(text: &str) -> Option<Fact> {
    if text.contains('€') || text.contains("EUR") {
        Some(Fact::Price)
    } else if text.contains("m²") || text.contains("qm") {
        Some(Fact::Area)
    } else if text.contains("Zi") {
        Some(Fact::Rooms)
    } else if ["OG", "EG", "DG", "UG", "Etage", "Geschoss"]
        .iter()
        .any(|kw| text.contains(kw))
    {
        Some(Fact::Floor)
    } else {
        None
    }
}
