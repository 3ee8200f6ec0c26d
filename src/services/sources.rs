// src/services/sources.rs

//! Source adapters.
//!
//! A `Source` returns the raw records of one listing site. `HtmlSource`
//! implements it for result pages driven by a `SiteSelectors` profile.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, FetchError, Result};
use crate::models::{Config, Pagination, RawListing, SiteSelectors, SourceConfig, SourceKind};
use crate::utils::http::{PageFetcher, create_async_client};
use crate::utils::parse::{Fact, classify_fact, collapse_whitespace};
use crate::utils::{page_url, resolve_url};

/// A listing site the pipeline can poll.
#[async_trait]
pub trait Source: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Fetch the current raw records. No cycle-level retry happens here.
    async fn fetch(&self) -> std::result::Result<Vec<RawListing>, FetchError>;
}

/// Build one `HtmlSource` per enabled source in the configuration.
///
/// Invalid base URLs and selectors are configuration errors.
pub fn build_sources(config: &Config) -> Result<Vec<Arc<dyn Source>>> {
    let client = create_async_client(&config.http)?;
    let fetcher = PageFetcher::new(client, &config.http);
    let delay = Duration::from_millis(config.http.request_delay_ms);

    config
        .enabled_sources()
        .map(|source| {
            HtmlSource::new(source, fetcher.clone(), delay)
                .map(|s| Arc::new(s) as Arc<dyn Source>)
        })
        .collect()
}

struct CompiledSelectors {
    card: Vec<Selector>,
    link: Vec<Selector>,
    link_attr: String,
    title: Vec<Selector>,
    address: Vec<Selector>,
    price: Vec<Selector>,
    rooms: Vec<Selector>,
    floor: Vec<Selector>,
    area: Vec<Selector>,
    description: Vec<Selector>,
    facts: Vec<Selector>,
    required_attr: Option<String>,
    next: Vec<Selector>,
}

impl CompiledSelectors {
    fn compile(selectors: &SiteSelectors) -> Result<Self> {
        let next = match &selectors.pagination {
            Pagination::NextLink { selectors } => parse_all(selectors)?,
            Pagination::QueryParam { .. } => Vec::new(),
        };
        Ok(Self {
            card: parse_all(&selectors.card)?,
            link: parse_all(&selectors.link)?,
            link_attr: selectors.link_attr.clone(),
            title: parse_all(&selectors.title)?,
            address: parse_all(&selectors.address)?,
            price: parse_all(&selectors.price)?,
            rooms: parse_all(&selectors.rooms)?,
            floor: parse_all(&selectors.floor)?,
            area: parse_all(&selectors.area)?,
            description: parse_all(&selectors.description)?,
            facts: parse_all(&selectors.facts)?,
            required_attr: selectors.required_attr.clone(),
            next,
        })
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

fn parse_all(selectors: &[String]) -> Result<Vec<Selector>> {
    selectors.iter().map(|s| parse_selector(s)).collect()
}

/// Records and next-page link extracted from one result page.
#[derive(Debug, Default)]
pub struct ExtractedPage {
    pub records: Vec<RawListing>,
    pub next: Option<Url>,
}

/// Selector-driven adapter for a paginated HTML result list.
pub struct HtmlSource {
    kind: SourceKind,
    base_url: Url,
    max_pages: u32,
    page_delay: Duration,
    pagination: Pagination,
    selectors: CompiledSelectors,
    fetcher: PageFetcher,
}

impl HtmlSource {
    pub fn new(
        config: &SourceConfig,
        fetcher: PageFetcher,
        page_delay: Duration,
    ) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)?;
        let profile = config.selectors();
        let selectors = CompiledSelectors::compile(&profile)?;
        if selectors.card.is_empty() || selectors.link.is_empty() {
            return Err(AppError::config(format!(
                "{}: card and link selectors must not be empty",
                config.kind
            )));
        }
        Ok(Self {
            kind: config.kind,
            base_url,
            max_pages: config.max_pages.max(1),
            page_delay,
            pagination: profile.pagination,
            selectors,
            fetcher,
        })
    }

    /// Extract records from result page number `page` located at `current`.
    pub fn extract_page(&self, html: &str, current: &Url, page: u32) -> ExtractedPage {
        let document = Html::parse_document(html);
        let records = self.extract_cards(&document, current);

        let next = if page >= self.max_pages {
            None
        } else {
            match &self.pagination {
                Pagination::NextLink { .. } => first_match(&document, &self.selectors.next)
                    .and_then(|a| a.value().attr("href"))
                    .and_then(|href| current.join(href).ok()),
                Pagination::QueryParam { param } => {
                    Some(page_url(&self.base_url, param, page + 1))
                }
            }
        };

        ExtractedPage { records, next }
    }

    fn extract_cards(&self, document: &Html, current: &Url) -> Vec<RawListing> {
        let Some(card_selector) = self
            .selectors
            .card
            .iter()
            .find(|sel| document.select(sel).next().is_some())
        else {
            return Vec::new();
        };

        document
            .select(card_selector)
            .filter(|card| match self.selectors.required_attr.as_deref() {
                Some(attr) => card.value().attr(attr).is_some_and(|v| !v.trim().is_empty()),
                None => true,
            })
            .filter_map(|card| self.extract_card(card, current))
            .collect()
    }

    fn extract_card(&self, card: ElementRef<'_>, current: &Url) -> Option<RawListing> {
        let sel = &self.selectors;
        let href = first_within(card, &sel.link)
            .and_then(|a| a.value().attr(&sel.link_attr))
            .or_else(|| card.value().attr(&sel.link_attr))
            .map(str::trim)
            .filter(|h| !h.is_empty())?;

        let mut record = RawListing {
            url: Some(resolve_url(current, href)),
            title: text_within(card, &sel.title),
            address: text_within(card, &sel.address),
            price: text_within(card, &sel.price),
            rooms: text_within(card, &sel.rooms),
            floor: text_within(card, &sel.floor),
            area: text_within(card, &sel.area),
            district: None,
            description: text_within(card, &sel.description),
        };

        if let Some(fact_selector) = sel.facts.iter().find(|s| card.select(s).next().is_some()) {
            for fact in card.select(fact_selector) {
                let text = element_text(fact);
                let slot = match classify_fact(&text) {
                    Some(Fact::Price) => &mut record.price,
                    Some(Fact::Rooms) => &mut record.rooms,
                    Some(Fact::Area) => &mut record.area,
                    Some(Fact::Floor) => &mut record.floor,
                    None => continue,
                };
                if slot.is_none() {
                    *slot = Some(text);
                }
            }
        }

        Some(record)
    }
}

#[async_trait]
impl Source for HtmlSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self) -> std::result::Result<Vec<RawListing>, FetchError> {
        let mut records = Vec::new();
        let mut seen = HashSet::new();
        let mut url = self.base_url.clone();

        for page in 1..=self.max_pages {
            if page > 1 && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            let html = match self.fetcher.fetch_text(url.as_str()).await {
                Ok(html) => html,
                Err(e) if page == 1 => return Err(FetchError::new(self.kind, e)),
                Err(e) => {
                    log::warn!("{}: page {} failed, keeping earlier pages: {}", self.kind, page, e);
                    break;
                }
            };

            let extracted = self.extract_page(&html, &url, page);
            log::debug!(
                "{}: page {} ({}) yielded {} cards",
                self.kind,
                page,
                url,
                extracted.records.len()
            );
            if extracted.records.is_empty() {
                break;
            }
            for record in extracted.records {
                let fresh = record.url.as_ref().is_some_and(|u| seen.insert(u.clone()));
                if fresh {
                    records.push(record);
                }
            }

            match extracted.next {
                Some(next) => url = next,
                None => break,
            }
        }

        Ok(records)
    }
}

fn first_match<'a>(document: &'a Html, selectors: &[Selector]) -> Option<ElementRef<'a>> {
    selectors.iter().find_map(|sel| document.select(sel).next())
}

fn first_within<'a>(element: ElementRef<'a>, selectors: &[Selector]) -> Option<ElementRef<'a>> {
    selectors.iter().find_map(|sel| element.select(sel).next())
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn text_within(element: ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    selectors
        .iter()
        .filter_map(|sel| element.select(sel).next())
        .map(element_text)
        .find(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HttpConfig;

    const SCOUT24_PAGE: &str = r#"
        <html><body><ul id="resultListItems">
          <li class="result-list__listing" data-obid="123">
            <article>
              <a class="result-list-entry__brand-title-container" href="/expose/123#gallery">
                <h2 class="result-list-entry__brand-title">Helle Altbauwohnung</h2>
              </a>
              <div class="result-list-entry__address">Weserstraße 5, 12047 Berlin, Neukölln</div>
              <dl>
                <dd class="result-list-entry__primary-criterion">1.200 €</dd>
                <dd class="result-list-entry__primary-criterion">65,5 m²</dd>
                <dd class="result-list-entry__primary-criterion">3 Zi.</dd>
              </dl>
            </article>
          </li>
          <li class="result-list__listing" data-obid="">
            <a class="result-list-entry__brand-title-container" href="/expose/ad">Anzeige</a>
          </li>
          <li class="result-list__listing" data-obid="456">
            <a href="/expose/456"><h2>Dachgeschoss</h2></a>
          </li>
        </ul>
        <a data-nav-ref="resultlist_pagination_next" href="/Suche/de/berlin/wohnung-mieten?pagenumber=2">weiter</a>
        </body></html>
    "#;

    const IMMOWELT_PAGE: &str = r#"
        <html><body>
          <div data-testid="serp-card">
            <a href="https://www.immowelt.de/expose/2abc3">
              <div data-testid="card-title">2-Zimmer in Kreuzberg</div>
            </a>
            <div class="card-content__address">Oranienstraße 1, Berlin, Kreuzberg</div>
            <div class="card-content__price-information">950 €</div>
            <ul class="card-content__keyfacts">
              <li>2 Zimmer</li><li>55 m²</li><li>1. OG</li><li>Balkon</li>
            </ul>
          </div>
        </body></html>
    "#;

    fn source(kind: SourceKind, base: &str, max_pages: u32) -> HtmlSource {
        let http = HttpConfig {
            retries: 1,
            ..HttpConfig::default()
        };
        let fetcher = PageFetcher::new(create_async_client(&http).unwrap(), &http)
            .with_backoff(Duration::from_millis(10));
        let config = SourceConfig {
            max_pages,
            ..SourceConfig::new(kind, base)
        };
        HtmlSource::new(&config, fetcher, Duration::ZERO).unwrap()
    }

    #[test]
    fn test_parse_selector() {
        assert!(parse_selector("li[data-obid]").is_ok());
        assert!(parse_selector("[[invalid").is_err());
    }

    #[test]
    fn extracts_scout24_cards_from_key_facts() {
        let base = "https://www.immobilienscout24.de/Suche/de/berlin/wohnung-mieten";
        let src = source(SourceKind::Scout24, base, 3);
        let page = src.extract_page(SCOUT24_PAGE, &Url::parse(base).unwrap(), 1);

        assert_eq!(page.records.len(), 2, "card with empty data-obid is skipped");
        let first = &page.records[0];
        assert_eq!(
            first.url.as_deref(),
            Some("https://www.immobilienscout24.de/expose/123#gallery")
        );
        assert_eq!(first.title.as_deref(), Some("Helle Altbauwohnung"));
        assert_eq!(
            first.address.as_deref(),
            Some("Weserstraße 5, 12047 Berlin, Neukölln")
        );
        assert_eq!(first.price.as_deref(), Some("1.200 €"));
        assert_eq!(first.area.as_deref(), Some("65,5 m²"));
        assert_eq!(first.rooms.as_deref(), Some("3 Zi."));
        assert_eq!(first.floor, None);

        let second = &page.records[1];
        assert_eq!(second.title.as_deref(), Some("Dachgeschoss"));
        assert_eq!(second.price, None);

        assert_eq!(
            page.next.map(|u| u.to_string()).as_deref(),
            Some("https://www.immobilienscout24.de/Suche/de/berlin/wohnung-mieten?pagenumber=2")
        );
    }

    #[test]
    fn extracts_immowelt_cards_with_query_pagination() {
        let base = "https://www.immowelt.de/liste/berlin/wohnungen/mieten";
        let src = source(SourceKind::Immowelt, base, 2);
        let current = Url::parse(base).unwrap();

        let page = src.extract_page(IMMOWELT_PAGE, &current, 1);
        assert_eq!(page.records.len(), 1);
        let record = &page.records[0];
        assert_eq!(record.title.as_deref(), Some("2-Zimmer in Kreuzberg"));
        assert_eq!(record.price.as_deref(), Some("950 €"));
        assert_eq!(record.rooms.as_deref(), Some("2 Zimmer"));
        assert_eq!(record.area.as_deref(), Some("55 m²"));
        assert_eq!(record.floor.as_deref(), Some("1. OG"));
        assert_eq!(
            page.next.map(|u| u.to_string()).as_deref(),
            Some("https://www.immowelt.de/liste/berlin/wohnungen/mieten?cp=2")
        );

        let last = src.extract_page(IMMOWELT_PAGE, &current, 2);
        assert!(last.next.is_none(), "max_pages reached");
    }

    #[test]
    fn page_without_cards_yields_nothing() {
        let base = "https://www.immonet.de/immobiliensuche/sel.do";
        let src = source(SourceKind::Immonet, base, 3);
        let empty = "<html><body><p>Keine Treffer</p></body></html>";
        let page = src.extract_page(empty, &Url::parse(base).unwrap(), 1);
        assert!(page.records.is_empty());
    }

    #[test]
    fn invalid_selector_override_is_rejected() {
        let http = HttpConfig::default();
        let fetcher = PageFetcher::new(create_async_client(&http).unwrap(), &http);
        let mut selectors = SiteSelectors::for_source(SourceKind::Immowelt);
        selectors.card = vec!["[[broken".into()];
        let config = SourceConfig {
            selectors: Some(selectors),
            ..SourceConfig::new(SourceKind::Immowelt, "https://www.immowelt.de/liste")
        };
        assert!(matches!(
            HtmlSource::new(&config, fetcher, Duration::ZERO),
            Err(AppError::Selector { .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_first_page_is_a_fetch_error() {
        let src = source(SourceKind::Immonet, "http://127.0.0.1:9/liste", 3);
        let err = src.fetch().await.unwrap_err();
        assert_eq!(err.site, SourceKind::Immonet);
    }
}
