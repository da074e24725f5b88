use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde_json::Value;

/// Normalized output of the HTML parse stage.
///
/// `meta_tags` maps lowercased `name`/`property` attributes to the first-seen
/// content value. `json_ld_blocks` is the flattened list of JSON-LD objects
/// with `@graph` expanded; malformed blocks are silently skipped upstream.
#[derive(Debug, Clone, Default)]
pub struct Parsed {
    pub url: String,
    pub canonical_url: Option<String>,
    pub html_title: Option<String>,
    pub meta_tags: BTreeMap<String, String>,
    pub json_ld_blocks: Vec<serde_json::Map<String, Value>>,
    pub title: Option<String>,
    pub date_published: Option<DateTime<FixedOffset>>,
    pub author_names: Vec<String>,
    /// Readable text, already truncated to the configured cap.
    pub text: Option<String>,
}
