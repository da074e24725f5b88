//! HTML + JSON-LD parsing: turn one fetched document into a normalized
//! `Parsed` payload with head metadata, flattened JSON-LD blocks, high-signal
//! title/date/author fields, and a bounded readable-text excerpt.
//!
//! Parsing is pure and deterministic: byte-identical input yields
//! byte-identical output.

mod decode;
mod head;
pub mod jsonld;
mod text;

use models::{FetchedDoc, Parsed};
use scraper::Html;
use url::Url;

pub use text::{
    normalize_whitespace, split_author_list, truncate_with_ellipsis, FallbackTextExtractor,
    TextExtractor,
};

const DATE_META_KEYS: &[&str] = &[
    "article:published_time",
    "pubdate",
    "publish-date",
    "dc.date",
    "date",
];
const AUTHOR_META_KEYS: &[&str] = &["author", "article:author", "og:article:author"];
const TITLE_META_KEYS: &[&str] = &["og:title", "twitter:title"];

pub struct Parser {
    readable_text_max_chars: usize,
    /// Optional external readability capability; the built-in fallback is
    /// always available behind it.
    readability: Option<Box<dyn TextExtractor>>,
}

impl Parser {
    pub fn new(readable_text_max_chars: usize) -> Self {
        Parser {
            readable_text_max_chars,
            readability: None,
        }
    }

    /// Install an external "HTML bytes -> readable text" booster. Its output
    /// is used only when non-empty; otherwise the fallback extractor runs.
    pub fn with_readability(mut self, readability: Box<dyn TextExtractor>) -> Self {
        self.readability = Some(readability);
        self
    }

    /// Parse one fetched document into deterministic `Parsed` fields.
    pub fn parse(&self, fetched: &FetchedDoc) -> Parsed {
        let html_text = decode::decode_body(fetched);
        let document = Html::parse_document(&html_text);

        let head = head::extract_head(&document);
        let json_ld_blocks = jsonld::extract_blocks(&document);
        let best_block = jsonld::pick_best(&json_ld_blocks);

        let canonical_url = head
            .canonical_href
            .as_deref()
            .and_then(|href| resolve_href(&fetched.final_url, href))
            .unwrap_or_else(|| fetched.final_url.clone());

        let title = self.choose_title(best_block, &head);
        let date_published = self.choose_published_at(best_block, &head);
        let author_names = self.collect_author_names(best_block, &head);

        let readable = self.extract_readable_text(&html_text);
        let text = match readable {
            text if text.is_empty() => None,
            text => Some(truncate_with_ellipsis(&text, self.readable_text_max_chars)),
        };

        tracing::debug!(
            url = %fetched.final_url,
            json_ld_blocks = json_ld_blocks.len(),
            meta_tags = head.meta_tags.len(),
            "parsed document"
        );

        Parsed {
            url: fetched.final_url.clone(),
            canonical_url: Some(canonical_url),
            html_title: head.html_title,
            meta_tags: head.meta_tags,
            json_ld_blocks,
            title,
            date_published,
            author_names,
            text,
        }
    }

    fn extract_readable_text(&self, html_text: &str) -> String {
        if let Some(readability) = &self.readability {
            if let Some(extracted) = readability.extract(html_text) {
                let normalized = normalize_whitespace(&extracted);
                if !normalized.is_empty() {
                    return normalized;
                }
            }
        }
        FallbackTextExtractor
            .extract(html_text)
            .unwrap_or_default()
    }

    /// Title priority: JSON-LD headline/name, then og/twitter meta, then the
    /// HTML `<title>`.
    fn choose_title(
        &self,
        best_block: Option<&serde_json::Map<String, serde_json::Value>>,
        head: &head::HeadMetadata,
    ) -> Option<String> {
        if let Some(title) = jsonld::block_title(best_block) {
            return Some(title);
        }
        for key in TITLE_META_KEYS {
            if let Some(value) = head.meta_tags.get(*key) {
                if !value.trim().is_empty() {
                    return Some(collapse_whitespace(value));
                }
            }
        }
        head.html_title
            .as_deref()
            .filter(|title| !title.trim().is_empty())
            .map(collapse_whitespace)
    }

    /// Date priority: JSON-LD datePublished/dateCreated, then meta keys in
    /// fixed order.
    fn choose_published_at(
        &self,
        best_block: Option<&serde_json::Map<String, serde_json::Value>>,
        head: &head::HeadMetadata,
    ) -> Option<chrono::DateTime<chrono::FixedOffset>> {
        if let Some(raw) = jsonld::block_date(best_block) {
            if let Some(parsed) = models::datetime::parse_datetime(&raw) {
                return Some(parsed);
            }
        }
        for key in DATE_META_KEYS {
            if let Some(value) = head.meta_tags.get(*key) {
                if let Some(parsed) = models::datetime::parse_datetime(value) {
                    return Some(parsed);
                }
            }
        }
        None
    }

    /// Merge author hints from JSON-LD and meta keys, splitting lists and
    /// preserving first-seen order.
    fn collect_author_names(
        &self,
        best_block: Option<&serde_json::Map<String, serde_json::Value>>,
        head: &head::HeadMetadata,
    ) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut add = |candidate: &str| {
            for part in split_author_list(candidate) {
                if !names.contains(&part) {
                    names.push(part);
                }
            }
        };

        for name in jsonld::block_author_names(best_block) {
            add(&name);
        }
        for key in AUTHOR_META_KEYS {
            if let Some(value) = head.meta_tags.get(*key) {
                add(value);
            }
        }
        names
    }
}

fn resolve_href(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    match Url::parse(base) {
        Ok(base) => base.join(href).ok().map(|joined| joined.to_string()),
        Err(_) => Url::parse(href).ok().map(|parsed| parsed.to_string()),
    }
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
