//! Utility functions and helpers.

pub mod http;
pub mod parse;

use url::Url;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Canonical form of a listing URL: absolute, without fragment.
///
/// Returns `None` for anything that is not an http(s) URL.
pub fn canonical_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

/// URL of result page `page` (1-based) using a page query parameter.
///
/// Page 1 is the base URL unchanged; an existing value of `param` is replaced.
pub fn page_url(base: &Url, param: &str, page: u32) -> Url {
    if page <= 1 {
        return base.clone();
    }
    let mut url = base.clone();
    let retained: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(k, _)| k != param)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair(param, &page.to_string());
    url
}
