use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::canon;
use crate::evidence::Evidence;

/// Extracted article fields before persistence. The canonical_url here is the
/// raw source URL; storage canonicalizes it when computing the dedup key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleDraft {
    pub canonical_url: String,
    pub source_id: String,
    pub title: Option<String>,
    pub author_hint: Option<String>,
    pub published_at: Option<DateTime<FixedOffset>>,
    pub snippet: Option<String>,
}

impl ArticleDraft {
    /// Content hash over the versioned fields. This is the sole trigger for
    /// version bumps: identical drafts always hash identically.
    pub fn content_hash(&self) -> String {
        canon::content_hash(&json!({
            "title": self.title,
            "author_hint": self.author_hint,
            "snippet": self.snippet,
            "published_at": self.published_at.map(|value| value.to_rfc3339()),
        }))
    }
}

/// The final indexed unit, unique by `(canonical_url, source_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub canonical_url: String,
    pub source_id: String,
    pub title: Option<String>,
    pub author_hint: Option<String>,
    pub published_at: Option<DateTime<FixedOffset>>,
    pub snippet: Option<String>,
    pub evidence: Vec<Evidence>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::ArticleDraft;
    use crate::datetime::parse_datetime;

    fn draft() -> ArticleDraft {
        ArticleDraft {
            canonical_url: "https://example.com/post".to_string(),
            source_id: "rss:test".to_string(),
            title: Some("A Title".to_string()),
            author_hint: Some("Jane Doe".to_string()),
            published_at: parse_datetime("2024-03-01T12:00:00Z"),
            snippet: Some("snippet".to_string()),
        }
    }

    #[test]
    fn content_hash_ignores_identity_fields() {
        let left = draft();
        let mut right = draft();
        right.canonical_url = "https://example.com/other".to_string();
        right.source_id = "html:test".to_string();
        assert_eq!(left.content_hash(), right.content_hash());
    }

    #[test]
    fn content_hash_tracks_versioned_fields() {
        let left = draft();
        let mut right = draft();
        right.title = Some("Another Title".to_string());
        assert_ne!(left.content_hash(), right.content_hash());

        let mut nulled = draft();
        nulled.published_at = None;
        assert_ne!(left.content_hash(), nulled.content_hash());
    }
}
