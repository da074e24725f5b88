//! Readable-text extraction and text normalization helpers.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::node::Node;
use scraper::Html;

lazy_static! {
    static ref AUTHOR_SPLIT: Regex = Regex::new(r",|\||\band\b").expect("regex parses");
}

/// Swappable "HTML -> best-effort readable text" capability. External
/// readability libraries plug in here; `FallbackTextExtractor` is the
/// built-in implementation that is always available.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, html: &str) -> Option<String>;
}

const SKIP_TAGS: &[&str] = &["script", "style", "noscript", "template"];
const OPEN_BREAK_TAGS: &[&str] = &["p", "br", "li", "div", "section", "article", "h1", "h2", "h3"];
const CLOSE_BREAK_TAGS: &[&str] = &["p", "li", "div", "section", "article"];

/// Visible-text extraction that strips script/style/noscript/template and
/// head content, inserting paragraph breaks for block tags.
pub struct FallbackTextExtractor;

impl TextExtractor for FallbackTextExtractor {
    fn extract(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let mut chunks: Vec<String> = Vec::new();
        let mut skip_depth = 0usize;
        let mut head_depth = 0usize;

        for edge in document.tree.root().traverse() {
            match edge {
                ego_tree::iter::Edge::Open(node) => match node.value() {
                    Node::Element(element) => {
                        let name = element.name();
                        if name == "head" {
                            head_depth += 1;
                        } else if SKIP_TAGS.contains(&name) {
                            skip_depth += 1;
                        } else if OPEN_BREAK_TAGS.contains(&name) {
                            chunks.push("\n".to_string());
                        }
                    }
                    Node::Text(text) => {
                        if head_depth == 0 && skip_depth == 0 && !text.trim().is_empty() {
                            chunks.push(text.to_string());
                            chunks.push(" ".to_string());
                        }
                    }
                    _ => {}
                },
                ego_tree::iter::Edge::Close(node) => {
                    if let Node::Element(element) = node.value() {
                        let name = element.name();
                        if name == "head" {
                            head_depth = head_depth.saturating_sub(1);
                        } else if SKIP_TAGS.contains(&name) {
                            skip_depth = skip_depth.saturating_sub(1);
                        } else if CLOSE_BREAK_TAGS.contains(&name) {
                            chunks.push("\n".to_string());
                        }
                    }
                }
            }
        }

        let text = normalize_whitespace(&chunks.concat());
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Collapse whitespace per line, keeping paragraph breaks between non-empty
/// lines.
pub fn normalize_whitespace(value: &str) -> String {
    value
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Truncate on a word boundary and append an ellipsis. Lengths are counted
/// in characters.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_string();
    }
    let mut trimmed: String = chars[..max_chars].iter().collect();
    if !trimmed.ends_with(' ') && trimmed.contains(' ') {
        if let Some(cut) = trimmed.rfind(' ') {
            trimmed.truncate(cut);
        }
    }
    format!("{}…", trimmed.trim_end())
}

/// Split an author list on commas, pipes, and the word "and", normalizing
/// whitespace and dropping empties.
pub fn split_author_list(value: &str) -> Vec<String> {
    AUTHOR_SPLIT
        .split(value)
        .map(|part| part.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|part| !part.is_empty())
        .collect()
}
