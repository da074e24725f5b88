//! Evidence-backed extraction: map one `Parsed` document onto an
//! `ArticleDraft` plus the evidence chain backing every claim.
//!
//! Each claim walks a fixed priority chain (JSON-LD, then meta tags, then
//! parser fallbacks) and stops at the first available source, emitting one
//! evidence record per resolved claim. Coverage is enforced afterwards: a
//! field that somehow lacks evidence is nulled rather than published.

use models::{ArticleDraft, Evidence, EvidenceType, Parsed, DRAFT_ARTICLE_ID};
use parser::jsonld;
use serde_json::{json, Map, Value};

const TITLE_META_KEYS: &[&str] = &["og:title", "twitter:title"];
const AUTHOR_META_KEYS: &[&str] = &["author", "article:author", "og:article:author"];
const DATE_META_KEYS: &[&str] = &[
    "article:published_time",
    "pubdate",
    "publish-date",
    "dc.date",
    "date",
];

const CLAIM_FIELDS: &[(&str, &str)] = &[
    ("title", "/title"),
    ("author_hint", "/author_hint"),
    ("published_at", "/published_at"),
];

type WarningHook = Box<dyn Fn(&str) + Send + Sync>;

pub struct Extractor {
    source_id: String,
    snippet_max_chars: usize,
    evidence_snippet_max_chars: usize,
    warning_hook: Option<WarningHook>,
}

impl Extractor {
    pub fn new(source_id: &str, config: &models::Compliance) -> Self {
        Self::with_limits(
            source_id,
            config.snippet_max_chars,
            config.evidence_snippet_max_chars,
        )
    }

    pub fn with_limits(
        source_id: &str,
        snippet_max_chars: usize,
        evidence_snippet_max_chars: usize,
    ) -> Self {
        Extractor {
            source_id: source_id.to_string(),
            snippet_max_chars,
            evidence_snippet_max_chars,
            warning_hook: None,
        }
    }

    /// Sink for coverage warnings; defaults to a tracing warning.
    pub fn set_warning_hook(&mut self, hook: impl Fn(&str) + Send + Sync + 'static) {
        self.warning_hook = Some(Box::new(hook));
    }

    /// Extract the article draft and its evidence chain.
    pub fn extract(&self, parsed: &Parsed, run_id: &str) -> (ArticleDraft, Vec<Evidence>) {
        let source_url = parsed
            .canonical_url
            .clone()
            .unwrap_or_else(|| parsed.url.clone());
        let best_block = jsonld::pick_best(&parsed.json_ld_blocks);
        let mut evidence: Vec<Evidence> = Vec::new();

        let title = self.extract_title(parsed, best_block, &source_url, run_id, &mut evidence);
        let author_hint =
            self.extract_author(parsed, best_block, &source_url, run_id, &mut evidence);
        let published_at =
            self.extract_published_at(parsed, best_block, &source_url, run_id, &mut evidence);

        let snippet = parsed
            .text
            .as_deref()
            .map(|text| clip(text, self.snippet_max_chars));

        let mut draft = ArticleDraft {
            canonical_url: source_url,
            source_id: self.source_id.clone(),
            title,
            author_hint,
            published_at,
            snippet,
        };

        for warning in enforce_evidence_coverage(&mut draft, &evidence) {
            match &self.warning_hook {
                Some(hook) => hook(&warning),
                None => tracing::warn!(warning, "evidence coverage violation"),
            }
        }

        (draft, evidence)
    }

    fn extract_title(
        &self,
        parsed: &Parsed,
        best_block: Option<&Map<String, Value>>,
        source_url: &str,
        run_id: &str,
        evidence: &mut Vec<Evidence>,
    ) -> Option<String> {
        if let Some(title) = jsonld::block_title(best_block) {
            evidence.push(self.build_evidence(
                "/title",
                EvidenceType::JsonLd,
                source_url,
                &title,
                run_id,
                "json_ld.headline",
                json!({"field": "headline"}),
            ));
            return Some(title);
        }

        if let Some((key, value)) = pick_meta(parsed, TITLE_META_KEYS) {
            let title = collapse_whitespace(value);
            evidence.push(self.build_evidence(
                "/title",
                EvidenceType::MetaTag,
                source_url,
                &title,
                run_id,
                &format!("meta.{key}"),
                json!({"field": key}),
            ));
            return Some(title);
        }

        let fallback = parsed.title.as_deref().or(parsed.html_title.as_deref())?;
        let title = collapse_whitespace(fallback);
        evidence.push(self.build_evidence(
            "/title",
            EvidenceType::Extracted,
            source_url,
            &title,
            run_id,
            "parsed.title",
            json!({"field": "title"}),
        ));
        Some(title)
    }

    fn extract_author(
        &self,
        parsed: &Parsed,
        best_block: Option<&Map<String, Value>>,
        source_url: &str,
        run_id: &str,
        evidence: &mut Vec<Evidence>,
    ) -> Option<String> {
        let json_ld_authors = jsonld::block_author_names(best_block);
        if let Some(first) = json_ld_authors.first() {
            evidence.push(self.build_evidence(
                "/author_hint",
                EvidenceType::JsonLd,
                source_url,
                &json_ld_authors.join(", "),
                run_id,
                "json_ld.author",
                json!({"field": "author"}),
            ));
            return Some(first.clone());
        }

        if let Some((key, value)) = pick_meta(parsed, AUTHOR_META_KEYS) {
            let first = parser::split_author_list(value).into_iter().next();
            if let Some(first) = first {
                evidence.push(self.build_evidence(
                    "/author_hint",
                    EvidenceType::MetaTag,
                    source_url,
                    value,
                    run_id,
                    &format!("meta.{key}"),
                    json!({"field": key}),
                ));
                return Some(first);
            }
        }

        let first = parsed.author_names.first()?.clone();
        evidence.push(self.build_evidence(
            "/author_hint",
            EvidenceType::Extracted,
            source_url,
            &first,
            run_id,
            "parsed.author_names",
            json!({"field": "author_names"}),
        ));
        Some(first)
    }

    fn extract_published_at(
        &self,
        parsed: &Parsed,
        best_block: Option<&Map<String, Value>>,
        source_url: &str,
        run_id: &str,
        evidence: &mut Vec<Evidence>,
    ) -> Option<chrono::DateTime<chrono::FixedOffset>> {
        if let Some(raw) = jsonld::block_date(best_block) {
            if let Some(parsed_date) = models::datetime::parse_datetime(&raw) {
                evidence.push(self.build_evidence(
                    "/published_at",
                    EvidenceType::JsonLd,
                    source_url,
                    &parsed_date.to_rfc3339(),
                    run_id,
                    "json_ld.datePublished",
                    json!({"field": "datePublished"}),
                ));
                return Some(parsed_date);
            }
        }

        // First present meta key wins; an unparseable value falls through to
        // the parser's date rather than trying later keys.
        if let Some((key, value)) = pick_meta(parsed, DATE_META_KEYS) {
            if let Some(parsed_date) = models::datetime::parse_datetime(value) {
                evidence.push(self.build_evidence(
                    "/published_at",
                    EvidenceType::MetaTag,
                    source_url,
                    value,
                    run_id,
                    &format!("meta.{key}"),
                    json!({"field": key}),
                ));
                return Some(parsed_date);
            }
        }

        let parsed_date = parsed.date_published?;
        evidence.push(self.build_evidence(
            "/published_at",
            EvidenceType::Extracted,
            source_url,
            &parsed_date.to_rfc3339(),
            run_id,
            "parsed.date_published",
            json!({"field": "date_published"}),
        ));
        Some(parsed_date)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_evidence(
        &self,
        claim_path: &str,
        evidence_type: EvidenceType,
        source_url: &str,
        extracted_text: &str,
        run_id: &str,
        extraction_method: &str,
        metadata: Value,
    ) -> Evidence {
        let metadata = match metadata {
            Value::Object(fields) => fields,
            _ => Map::new(),
        };
        let mut evidence = Evidence::new(
            DRAFT_ARTICLE_ID,
            claim_path,
            evidence_type,
            source_url,
            clip(extracted_text, self.evidence_snippet_max_chars),
            run_id,
            Some(extraction_method.to_string()),
            metadata,
        );
        evidence.extractor_version = Some(format!("extractors/{}", env!("CARGO_PKG_VERSION")));
        evidence.input_ref = Some(source_url.to_string());
        evidence.snippet_max_chars_applied = Some(self.evidence_snippet_max_chars as u32);
        evidence
    }
}

/// Null out any non-null claim field lacking matching evidence, returning a
/// warning per dropped field. Keeps the invariant that every published claim
/// is citable.
pub fn enforce_evidence_coverage(draft: &mut ArticleDraft, evidence: &[Evidence]) -> Vec<String> {
    let mut warnings = Vec::new();

    for (field, claim_path) in CLAIM_FIELDS {
        let has_value = match *field {
            "title" => draft.title.is_some(),
            "author_hint" => draft.author_hint.is_some(),
            _ => draft.published_at.is_some(),
        };
        if !has_value {
            continue;
        }
        let covered = evidence.iter().any(|item| item.claim_path == *claim_path);
        if covered {
            continue;
        }
        match *field {
            "title" => draft.title = None,
            "author_hint" => draft.author_hint = None,
            _ => draft.published_at = None,
        }
        warnings.push(format!(
            "Field '{field}' had no evidence for claim_path '{claim_path}', value dropped"
        ));
    }

    warnings
}

/// First present meta value among `keys`, with the winning key.
fn pick_meta<'p>(parsed: &'p Parsed, keys: &[&'static str]) -> Option<(&'static str, &'p str)> {
    for key in keys {
        if let Some(value) = parsed.meta_tags.get(*key) {
            if !value.trim().is_empty() {
                return Some((*key, value.as_str()));
            }
        }
    }
    None
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapse whitespace, then truncate on a word boundary with an ellipsis.
fn clip(text: &str, max_chars: usize) -> String {
    parser::truncate_with_ellipsis(&collapse_whitespace(text), max_chars)
}

#[cfg(test)]
mod test {
    use super::{enforce_evidence_coverage, Extractor};
    use models::{EvidenceType, Parsed};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn parsed_with(
        meta: &[(&str, &str)],
        json_ld: Option<serde_json::Value>,
        text: Option<&str>,
    ) -> Parsed {
        let mut parsed = Parsed {
            url: "https://example.com/post?utm_source=x".to_string(),
            canonical_url: Some("https://example.com/post".to_string()),
            ..Parsed::default()
        };
        for (key, value) in meta {
            parsed
                .meta_tags
                .insert(key.to_string(), value.to_string());
        }
        if let Some(serde_json::Value::Object(block)) = json_ld {
            parsed.json_ld_blocks.push(block);
        }
        parsed.text = text.map(str::to_string);
        parsed
    }

    fn extractor() -> Extractor {
        Extractor::with_limits("rss:test", 1500, 800)
    }

    #[test]
    fn jsonld_claims_win_and_emit_jsonld_evidence() {
        let parsed = parsed_with(
            &[("og:title", "OG Title"), ("author", "Meta Author")],
            Some(json!({
                "@type": "Article",
                "headline": "LD Headline",
                "author": {"name": "Jane Doe"},
                "datePublished": "2024-01-01T00:00:00Z",
            })),
            Some("body text"),
        );
        let (draft, evidence) = extractor().extract(&parsed, "run-1");

        assert_eq!(draft.title.as_deref(), Some("LD Headline"));
        assert_eq!(draft.author_hint.as_deref(), Some("Jane Doe"));
        assert!(draft.published_at.is_some());
        assert_eq!(evidence.len(), 3);
        assert!(evidence
            .iter()
            .all(|item| item.evidence_type == EvidenceType::JsonLd));
        assert_eq!(
            evidence[0].extraction_method.as_deref(),
            Some("json_ld.headline")
        );
        assert_eq!(evidence[0].claim_path, "/title");
        assert_eq!(evidence[1].claim_path, "/author_hint");
        assert_eq!(evidence[2].claim_path, "/published_at");
    }

    #[test]
    fn meta_chain_fills_in_without_jsonld() {
        let parsed = parsed_with(
            &[
                ("og:title", "OG Title"),
                ("author", "Jane Doe, John Smith"),
                ("article:published_time", "2024-02-02T08:00:00Z"),
            ],
            None,
            None,
        );
        let (draft, evidence) = extractor().extract(&parsed, "run-1");

        assert_eq!(draft.title.as_deref(), Some("OG Title"));
        assert_eq!(draft.author_hint.as_deref(), Some("Jane Doe"));
        assert!(evidence
            .iter()
            .all(|item| item.evidence_type == EvidenceType::MetaTag));
        assert_eq!(evidence[0].extraction_method.as_deref(), Some("meta.og:title"));
        assert_eq!(evidence[1].extraction_method.as_deref(), Some("meta.author"));
        // Author evidence preserves the full meta value.
        assert_eq!(evidence[1].extracted_text, "Jane Doe, John Smith");
    }

    #[test]
    fn parser_fields_are_the_last_resort() {
        let mut parsed = parsed_with(&[], None, None);
        parsed.title = Some("Parsed Title".to_string());
        parsed.author_names = vec!["Fallback Author".to_string()];
        parsed.date_published = models::datetime::parse_datetime("2024-03-03T00:00:00Z");

        let (draft, evidence) = extractor().extract(&parsed, "run-1");
        assert_eq!(draft.title.as_deref(), Some("Parsed Title"));
        assert_eq!(draft.author_hint.as_deref(), Some("Fallback Author"));
        assert!(draft.published_at.is_some());
        assert!(evidence
            .iter()
            .all(|item| item.evidence_type == EvidenceType::Extracted));
    }

    #[test]
    fn unparseable_first_meta_date_falls_to_parser_date() {
        let mut parsed = parsed_with(&[("article:published_time", "not a date")], None, None);
        parsed.date_published = models::datetime::parse_datetime("2024-04-04T00:00:00Z");

        let (draft, evidence) = extractor().extract(&parsed, "run-1");
        assert!(draft.published_at.is_some());
        let date_evidence = evidence
            .iter()
            .find(|item| item.claim_path == "/published_at")
            .unwrap();
        assert_eq!(
            date_evidence.extraction_method.as_deref(),
            Some("parsed.date_published")
        );
    }

    #[test]
    fn evidence_text_is_capped() {
        let long_title = "word ".repeat(500);
        let parsed = parsed_with(&[("og:title", long_title.as_str())], None, None);
        let (_, evidence) = Extractor::with_limits("rss:test", 1500, 100).extract(&parsed, "run-1");
        assert!(evidence[0].extracted_text.chars().count() <= 101);
        assert!(evidence[0].extracted_text.ends_with('…'));
        assert_eq!(evidence[0].snippet_max_chars_applied, Some(100));
    }

    #[test]
    fn snippet_is_capped_and_never_full_body() {
        let body = "text ".repeat(2000);
        let parsed = parsed_with(&[("og:title", "T")], None, Some(body.as_str()));
        let (draft, _) = extractor().extract(&parsed, "run-1");
        let snippet = draft.snippet.unwrap();
        assert!(snippet.chars().count() <= 1501);
    }

    #[test]
    fn replay_fields_are_stamped() {
        let parsed = parsed_with(&[("og:title", "T")], None, None);
        let (_, evidence) = extractor().extract(&parsed, "run-7");
        assert_eq!(evidence[0].run_id, "run-7");
        assert_eq!(evidence[0].input_ref.as_deref(), Some("https://example.com/post"));
        assert!(evidence[0]
            .extractor_version
            .as_deref()
            .unwrap()
            .starts_with("extractors/"));
    }

    #[test]
    fn coverage_enforcement_nulls_uncovered_fields() {
        let parsed = parsed_with(&[("og:title", "T")], None, None);
        let mut extractor = extractor();
        let warnings: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = warnings.clone();
        extractor.set_warning_hook(move |warning| sink.lock().unwrap().push(warning.to_string()));

        let (mut draft, mut evidence) = extractor.extract(&parsed, "run-1");
        // Simulate a lost evidence row.
        evidence.clear();
        let dropped = enforce_evidence_coverage(&mut draft, &evidence);
        assert!(draft.title.is_none());
        assert_eq!(dropped.len(), 1);
        assert!(dropped[0].contains("'title'"));
        assert!(dropped[0].contains("/title"));
    }

    #[test]
    fn extraction_is_deterministic_modulo_ids() {
        let parsed = parsed_with(
            &[("og:title", "T"), ("author", "A")],
            None,
            Some("body"),
        );
        let (draft_a, evidence_a) = extractor().extract(&parsed, "run-1");
        let (draft_b, evidence_b) = extractor().extract(&parsed, "run-1");
        assert_eq!(draft_a, draft_b);
        let tuple = |evidence: &Vec<models::Evidence>| -> Vec<(String, String, String, String)> {
            evidence
                .iter()
                .map(|item| {
                    (
                        item.claim_path.clone(),
                        item.evidence_type.as_str().to_string(),
                        item.extraction_method.clone().unwrap_or_default(),
                        item.extracted_text.clone(),
                    )
                })
                .collect()
        };
        assert_eq!(tuple(&evidence_a), tuple(&evidence_b));
    }
}
