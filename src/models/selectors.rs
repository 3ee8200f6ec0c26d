// src/models/selectors.rs

//! CSS selector profiles for listing sites.
//!
//! Each field holds fallbacks tried in order; the first selector that
//! matches wins. Site markup changes often, so profiles can be overridden
//! per source in the configuration file.

use serde::{Deserialize, Serialize};

use crate::models::SourceKind;

/// How to reach the next result page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Pagination {
    /// Follow the `href` of the first matching "next" link.
    NextLink { selectors: Vec<String> },
    /// Append `param=N` to the base URL for pages 2..N.
    QueryParam { param: String },
}

/// CSS selectors for extracting listing cards from a result page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSelectors {
    /// One element per listing card
    pub card: Vec<String>,

    /// Link to the listing detail page, searched within the card
    pub link: Vec<String>,

    /// HTML attribute holding the link (usually "href")
    #[serde(default = "default_link_attr")]
    pub link_attr: String,

    #[serde(default)]
    pub title: Vec<String>,

    #[serde(default)]
    pub address: Vec<String>,

    #[serde(default)]
    pub price: Vec<String>,

    #[serde(default)]
    pub rooms: Vec<String>,

    #[serde(default)]
    pub floor: Vec<String>,

    #[serde(default)]
    pub area: Vec<String>,

    #[serde(default)]
    pub description: Vec<String>,

    /// Generic "key fact" elements classified by their text
    /// (price, rooms, floor, area) when the specific selectors miss.
    #[serde(default)]
    pub facts: Vec<String>,

    /// Card attribute that must be present for the card to count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_attr: Option<String>,

    pub pagination: Pagination,
}

fn default_link_attr() -> String {
    "href".to_string()
}

fn list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl SiteSelectors {
    /// Built-in profile for a site.
    pub fn for_source(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Scout24 => Self {
                card: list(&["li[data-obid]", "article[data-obid]"]),
                link: list(&[
                    "a.result-list-entry__brand-title-container",
                    "a[data-nav-ref='result_list_entry']",
                    "a[href*='/expose/']",
                ]),
                link_attr: default_link_attr(),
                title: list(&[
                    ".result-list-entry__brand-title",
                    "h2",
                    "h5",
                ]),
                address: list(&[
                    ".result-list-entry__address",
                    "[data-testid='result-list-entry-address']",
                    "button.result-list-entry__map-link",
                ]),
                price: Vec::new(),
                rooms: Vec::new(),
                floor: Vec::new(),
                area: Vec::new(),
                description: Vec::new(),
                facts: list(&[
                    "dd.result-list-entry__primary-criterion",
                    ".result-list-entry__primary-criterion",
                    "li.result-list-entry__criteria-item",
                    "dl dd",
                ]),
                required_attr: Some("data-obid".to_string()),
                pagination: Pagination::NextLink {
                    selectors: list(&[
                        "a[data-nav-ref='resultlist_pagination_next']",
                        "li.pagination-next a",
                    ]),
                },
            },
            SourceKind::Immowelt => Self {
                card: list(&[
                    "div[data-testid='serp-card']",
                    "article.estate-item",
                    "div.listItem",
                ]),
                link: list(&["a[href*='/expose/']", "a[href]"]),
                link_attr: default_link_attr(),
                title: list(&[
                    "[data-testid='card-title']",
                    ".card-content__title",
                    "h2",
                ]),
                address: list(&[
                    ".card-content__address",
                    "[data-testid='card-address']",
                    ".location",
                ]),
                price: list(&[
                    ".card-content__price-information",
                    "[data-testid='card-price']",
                    ".price",
                ]),
                rooms: Vec::new(),
                floor: Vec::new(),
                area: Vec::new(),
                description: Vec::new(),
                facts: list(&[".card-content__keyfacts li", ".keyfact", ".hard-fact"]),
                required_attr: None,
                pagination: Pagination::QueryParam {
                    param: "cp".to_string(),
                },
            },
            SourceKind::Immonet => Self {
                card: list(&["div[id^='selObject_']", "div.item-container"]),
                link: list(&[
                    "a[id^='lnkImgToObject']",
                    "a.result-list-entry",
                    "a[href*='expose']",
                    "a[href]",
                ]),
                link_attr: default_link_attr(),
                title: list(&["a[id^='lnkToDetails']", ".item-title", "h2"]),
                address: list(&[".item-info-outer", ".box-25.left", ".location"]),
                price: list(&[".price", ".item-price"]),
                rooms: list(&[".item-zimmer", ".rooms", "[class*='zimmer']"]),
                floor: Vec::new(),
                area: list(&[".item-flaeche", "[class*='flaeche']"]),
                description: Vec::new(),
                facts: Vec::new(),
                required_attr: None,
                pagination: Pagination::QueryParam {
                    param: "pageno".to_string(),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_source_has_card_and_link_selectors() {
        for kind in SourceKind::ALL {
            let selectors = SiteSelectors::for_source(kind);
            assert!(!selectors.card.is_empty(), "{kind} has no card selector");
            assert!(!selectors.link.is_empty(), "{kind} has no link selector");
        }
    }

    #[test]
    fn pagination_deserializes_from_toml() {
        let p: Pagination = toml::from_str("type = \"query_param\"\nparam = \"page\"").unwrap();
        assert_eq!(
            p,
            Pagination::QueryParam {
                param: "page".into()
            }
        );
    }
}
