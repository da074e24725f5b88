//! Review-author profiles for the offline resolver.
//!
//! Articles group by `(source_id, normalized author_hint, host)`. Each group
//! gets a deterministic author row (namespaced UUID of the triple) so merge
//! decisions have a stable FK target, then known account identifiers are
//! merged in from the accounts table.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use models::canon::to_canonical_string;
use models::AuthorProfile;
use rusqlite::params;
use serde_json::json;
use url::Url;
use uuid::Uuid;

use crate::error::Result;
use crate::{now_iso, Store};

const PROFILE_URL_PATH_HINTS: &[&str] = &["/author/", "/people/", "/profile/", "/bio"];

fn normalize_author_hint(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_host(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

fn review_author_id(source_id: &str, normalized_name: &str, host: &str) -> String {
    let key = format!("review-author|{source_id}|{normalized_name}|{host}");
    Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes()).to_string()
}

#[derive(Default)]
struct Bucket {
    canonical_name: String,
    domains: BTreeSet<String>,
    accounts: BTreeSet<String>,
    profile_urls: BTreeSet<String>,
    article_count: usize,
}

impl Store {
    /// Build deterministic per-source author profiles from stored articles,
    /// materializing a stable author row per group.
    pub fn list_resolution_author_profiles(&self) -> Result<Vec<AuthorProfile>> {
        let mut grouped: BTreeMap<(String, String, String), Bucket> = BTreeMap::new();

        let conn = self.lock();
        {
            let mut stmt = conn.prepare(
                "SELECT source_id, author_hint, canonical_url
                 FROM articles
                 WHERE author_hint IS NOT NULL AND TRIM(author_hint) <> ''
                 ORDER BY source_id, canonical_url",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;

            for row in rows {
                let (source_id, raw_hint, canonical_url) = row?;
                let normalized = normalize_author_hint(&raw_hint);
                if normalized.is_empty() {
                    continue;
                }
                let host = extract_host(&canonical_url);
                let bucket = grouped
                    .entry((source_id, normalized.clone(), host.clone()))
                    .or_default();
                if bucket.canonical_name.is_empty() {
                    bucket.canonical_name = raw_hint.trim().to_string();
                }
                bucket.article_count += 1;
                if !host.is_empty() {
                    bucket.domains.insert(host);
                }

                // An author_hint that already encodes an account or profile
                // URL seeds the strongest resolver rules.
                if normalized.contains('@') {
                    bucket.accounts.insert(normalized.clone());
                }
                if normalized.starts_with("http://") || normalized.starts_with("https://") {
                    bucket.accounts.insert(normalized.clone());
                    let path = Url::parse(&normalized)
                        .ok()
                        .map(|parsed| parsed.path().to_lowercase())
                        .unwrap_or_default();
                    if PROFILE_URL_PATH_HINTS.iter().any(|hint| path.contains(hint)) {
                        bucket.profile_urls.insert(normalized.clone());
                    }
                }
            }
        }

        let now = now_iso();
        let mut profiles = Vec::new();
        for ((source_id, normalized, host), bucket) in &grouped {
            let author_id = review_author_id(source_id, normalized, host);
            let metadata = to_canonical_string(&json!({
                "source_id": source_id,
                "normalized_name": normalized,
                "domain": host,
                "article_count": bucket.article_count,
            }));
            conn.execute(
                "INSERT INTO authors (id, canonical_name, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    canonical_name = excluded.canonical_name,
                    metadata = excluded.metadata,
                    updated_at = excluded.updated_at",
                params![author_id, bucket.canonical_name, metadata, now, now],
            )?;
            profiles.push(AuthorProfile {
                id: author_id,
                canonical_name: bucket.canonical_name.clone(),
                source_id: source_id.clone(),
                domains: bucket.domains.iter().cloned().collect(),
                accounts: bucket.accounts.iter().cloned().collect(),
                profile_urls: bucket.profile_urls.iter().cloned().collect(),
            });
        }

        // Merge in account identifiers already mapped for these authors.
        let mut stmt = conn.prepare(
            "SELECT source_identifier FROM accounts WHERE author_id = ?1",
        )?;
        for profile in &mut profiles {
            let known = stmt
                .query_map(params![profile.id], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            if known.is_empty() {
                continue;
            }
            let mut merged: BTreeSet<String> = profile.accounts.iter().cloned().collect();
            for identifier in known {
                let identifier = identifier.trim().to_lowercase();
                if !identifier.is_empty() {
                    merged.insert(identifier);
                }
            }
            profile.accounts = merged.into_iter().collect();
        }

        Ok(profiles)
    }
}
