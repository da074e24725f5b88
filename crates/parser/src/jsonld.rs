//! JSON-LD block extraction and claim helpers.
//!
//! Blocks are flattened (`@graph` expanded, lists splatted) and malformed
//! script payloads are skipped silently. Claim helpers prefer article-like
//! node types so that e.g. a site-wide `Organization` block never outranks
//! the page's `NewsArticle`.

use lazy_static::lazy_static;
use scraper::{Html, Selector};
use serde_json::{Map, Value};

lazy_static! {
    static ref JSON_LD_SCRIPT: Selector =
        Selector::parse(r#"script[type="application/ld+json"]"#).expect("selector parses");
}

const ARTICLE_TYPES: &[&str] = &[
    "article",
    "newsarticle",
    "blogposting",
    "scholarlyarticle",
    "report",
];

/// Extract and parse all valid JSON-LD script blocks in document order.
pub fn extract_blocks(document: &Html) -> Vec<Map<String, Value>> {
    let mut blocks = Vec::new();
    for element in document.select(&JSON_LD_SCRIPT) {
        let raw: String = element.text().collect();
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(payload) => flatten(payload, &mut blocks),
            Err(_) => continue,
        }
    }
    blocks
}

fn flatten(payload: Value, out: &mut Vec<Map<String, Value>>) {
    match payload {
        Value::Object(mut object) => {
            if let Some(Value::Array(graph)) = object.remove("@graph") {
                for entry in graph {
                    flatten(entry, out);
                }
            }
            if !object.is_empty() {
                out.push(object);
            }
        }
        Value::Array(items) => {
            for item in items {
                flatten(item, out);
            }
        }
        _ => {}
    }
}

fn type_score(block: &Map<String, Value>) -> i32 {
    let types: Vec<String> = match block.get("@type") {
        Some(Value::String(ty)) => vec![ty.to_ascii_lowercase()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(str::to_ascii_lowercase)
            .collect(),
        _ => Vec::new(),
    };
    if types.iter().any(|ty| ARTICLE_TYPES.contains(&ty.as_str())) {
        1
    } else {
        0
    }
}

/// Pick the most article-relevant block, keeping document order among ties.
pub fn pick_best(blocks: &[Map<String, Value>]) -> Option<&Map<String, Value>> {
    let mut best: Option<(&Map<String, Value>, i32)> = None;
    for block in blocks {
        let score = type_score(block);
        match best {
            Some((_, best_score)) if best_score >= score => {}
            _ => best = Some((block, score)),
        }
    }
    best.map(|(block, _)| block)
}

/// Headline (or name) of the block, whitespace-normalized.
pub fn block_title(block: Option<&Map<String, Value>>) -> Option<String> {
    let block = block?;
    let raw = block
        .get("headline")
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .or_else(|| {
            block
                .get("name")
                .and_then(Value::as_str)
                .filter(|value| !value.trim().is_empty())
        })?;
    Some(raw.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Raw datePublished (or dateCreated) string of the block.
pub fn block_date(block: Option<&Map<String, Value>>) -> Option<String> {
    let block = block?;
    block
        .get("datePublished")
        .and_then(Value::as_str)
        .or_else(|| block.get("dateCreated").and_then(Value::as_str))
        .map(str::to_string)
}

/// Normalized author names from the block's `author` field, which may be a
/// string, an object with `name`, or a list of either.
pub fn block_author_names(block: Option<&Map<String, Value>>) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut add = |raw: Option<&str>| {
        let Some(raw) = raw else { return };
        let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if !normalized.is_empty() && !names.contains(&normalized) {
            names.push(normalized);
        }
    };

    match block.and_then(|block| block.get("author")) {
        Some(Value::String(name)) => add(Some(name)),
        Some(Value::Object(author)) => add(author.get("name").and_then(Value::as_str)),
        Some(Value::Array(items)) => {
            for item in items {
                match item {
                    Value::String(name) => add(Some(name)),
                    Value::Object(author) => add(author.get("name").and_then(Value::as_str)),
                    _ => {}
                }
            }
        }
        _ => {}
    }
    names
}
