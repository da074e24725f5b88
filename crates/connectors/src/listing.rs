//! Anchor collection for HTML listing pages.

use lazy_static::lazy_static;
use scraper::{Html, Selector};
use url::Url;

use crate::is_http_url;

lazy_static! {
    static ref ANCHOR: Selector = Selector::parse("a[href]").expect("selector parses");
}

/// All `<a href>` values in document order.
pub fn collect_hrefs(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&ANCHOR)
        .filter_map(|element| element.value().attr("href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
        .collect()
}

/// Resolve one href against the seed URL (when the seed was a URL) and keep
/// only HTTP(S) results.
pub fn resolve_link(base_url: Option<&str>, href: &str) -> Option<String> {
    let candidate = match base_url {
        Some(base) => Url::parse(base).ok()?.join(href).ok()?.to_string(),
        None => href.to_string(),
    };
    if is_http_url(&candidate) {
        Some(candidate)
    } else {
        None
    }
}
