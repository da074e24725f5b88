//! Head metadata: `<title>`, meta tags, and the canonical link.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use scraper::{Html, Selector};

lazy_static! {
    static ref TITLE: Selector = Selector::parse("title").expect("selector parses");
    static ref META: Selector = Selector::parse("meta").expect("selector parses");
    static ref LINK: Selector = Selector::parse("link[rel]").expect("selector parses");
}

#[derive(Debug, Default)]
pub struct HeadMetadata {
    pub html_title: Option<String>,
    /// Lowercased `property`/`name` attribute to first-seen content.
    pub meta_tags: BTreeMap<String, String>,
    pub canonical_href: Option<String>,
}

pub fn extract_head(document: &Html) -> HeadMetadata {
    let mut head = HeadMetadata::default();

    if let Some(title) = document.select(&TITLE).next() {
        let text: String = title.text().collect();
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !normalized.is_empty() {
            head.html_title = Some(normalized);
        }
    }

    for element in document.select(&META) {
        let key = element
            .value()
            .attr("property")
            .filter(|value| !value.trim().is_empty())
            .or_else(|| element.value().attr("name"))
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let content = element.value().attr("content").unwrap_or_default().trim();
        if !key.is_empty() && !content.is_empty() && !head.meta_tags.contains_key(&key) {
            head.meta_tags.insert(key, content.to_string());
        }
    }

    for element in document.select(&LINK) {
        if head.canonical_href.is_some() {
            break;
        }
        let rel = element.value().attr("rel").unwrap_or_default();
        let is_canonical = rel
            .split_whitespace()
            .any(|token| token.eq_ignore_ascii_case("canonical"));
        if !is_canonical {
            continue;
        }
        let href = element.value().attr("href").unwrap_or_default().trim();
        if !href.is_empty() {
            head.canonical_href = Some(href.to_string());
        }
    }

    head
}
