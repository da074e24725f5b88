use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Article id placeholder used on evidence emitted for a draft that has not
/// been persisted yet. Storage rewrites it during upsert.
pub const DRAFT_ARTICLE_ID: &str = "__draft_article__";

/// The JSON Pointers evidence may cite, in claim order.
pub const CLAIM_PATHS: &[&str] = &["/title", "/author_hint", "/published_at"];

/// Where a piece of evidence was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    MetaTag,
    JsonLd,
    Extracted,
    FetchedContent,
}

impl EvidenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceType::MetaTag => "meta_tag",
            EvidenceType::JsonLd => "json_ld",
            EvidenceType::Extracted => "extracted",
            EvidenceType::FetchedContent => "fetched_content",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "meta_tag" => Some(EvidenceType::MetaTag),
            "json_ld" => Some(EvidenceType::JsonLd),
            "extracted" => Some(EvidenceType::Extracted),
            "fetched_content" => Some(EvidenceType::FetchedContent),
            _ => None,
        }
    }
}

/// A citation backing exactly one claim on one article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub id: String,
    pub article_id: String,
    /// RFC 6901 JSON Pointer into the article (`/title`, `/author_hint`,
    /// `/published_at`).
    pub claim_path: String,
    pub evidence_type: EvidenceType,
    pub source_url: String,
    /// Free-form provenance, e.g. `json_ld.headline` or `meta.og:title`.
    pub extraction_method: Option<String>,
    pub extracted_text: String,
    pub confidence: f64,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub retrieved_at: DateTime<Utc>,
    pub extractor_version: Option<String>,
    /// Reference to the input the claim was read from, for replay.
    pub input_ref: Option<String>,
    pub snippet_max_chars_applied: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub run_id: String,
}

impl Evidence {
    /// Build evidence with a fresh id and current timestamps.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        article_id: &str,
        claim_path: &str,
        evidence_type: EvidenceType,
        source_url: &str,
        extracted_text: String,
        run_id: &str,
        extraction_method: Option<String>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Evidence {
            id: Uuid::new_v4().to_string(),
            article_id: article_id.to_string(),
            claim_path: claim_path.to_string(),
            evidence_type,
            source_url: source_url.to_string(),
            extraction_method,
            extracted_text,
            confidence: 1.0,
            metadata,
            retrieved_at: now,
            extractor_version: None,
            input_ref: None,
            snippet_max_chars_applied: None,
            created_at: now,
            run_id: run_id.to_string(),
        }
    }
}
