//! Article upsert, content-hash versioning, and export iteration.

use chrono::{DateTime, Utc};
use models::canon::to_canonical_string;
use models::{canonicalize_url, Article, ArticleDraft, Evidence, EvidenceType};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{Result, StorageError};
use crate::{now_iso, Store};

impl Store {
    /// Upsert an article by its dedup key `(canonical_url, source_id)`.
    ///
    /// A new dedup key inserts version 1. An existing key writes a new
    /// version only when the content hash of the versioned fields changed;
    /// evidence is then rewritten and a fresh snapshot stored. Everything
    /// happens in one transaction, including the hash comparison, so
    /// concurrent upserts of the same key serialize and can never produce
    /// duplicate versions.
    pub fn upsert_article(
        &self,
        draft: &ArticleDraft,
        evidence: &[Evidence],
        run_id: &str,
    ) -> Result<(Article, bool, bool)> {
        let canonical_url = canonicalize_url(&draft.canonical_url);
        let content_hash = draft.content_hash();
        let now = now_iso();

        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let existing: Option<(String, i64)> = tx
            .query_row(
                "SELECT id, version FROM articles WHERE canonical_url = ?1 AND source_id = ?2",
                params![canonical_url, draft.source_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let mut created = false;
        let mut updated = false;
        let article_id;

        match existing {
            None => {
                article_id = Uuid::new_v4().to_string();
                let persisted = rebind_evidence(evidence, &article_id, run_id);
                tx.execute(
                    "INSERT INTO articles (
                        id, canonical_url, source_id, title, author_hint, published_at,
                        snippet, version, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        article_id,
                        canonical_url,
                        draft.source_id,
                        draft.title,
                        draft.author_hint,
                        draft.published_at.map(|value| value.to_rfc3339()),
                        draft.snippet,
                        1i64,
                        now,
                        now,
                    ],
                )?;
                insert_version(&tx, &article_id, 1, &content_hash, draft, &persisted, &now, run_id)?;
                tx.execute("DELETE FROM evidence WHERE article_id = ?1", params![article_id])?;
                for item in &persisted {
                    insert_evidence_row(&tx, item)?;
                }
                created = true;
            }
            Some((existing_id, current_version)) => {
                article_id = existing_id;
                let latest_hash: Option<String> = tx
                    .query_row(
                        "SELECT content_hash FROM versions
                         WHERE article_id = ?1 ORDER BY version DESC LIMIT 1",
                        params![article_id],
                        |row| row.get(0),
                    )
                    .optional()?;

                if latest_hash.as_deref() != Some(content_hash.as_str()) {
                    let version = current_version + 1;
                    let persisted = rebind_evidence(evidence, &article_id, run_id);
                    tx.execute(
                        "UPDATE articles SET
                            title = ?1, author_hint = ?2, published_at = ?3,
                            snippet = ?4, version = ?5, updated_at = ?6
                         WHERE id = ?7",
                        params![
                            draft.title,
                            draft.author_hint,
                            draft.published_at.map(|value| value.to_rfc3339()),
                            draft.snippet,
                            version,
                            now,
                            article_id,
                        ],
                    )?;
                    insert_version(
                        &tx,
                        &article_id,
                        version,
                        &content_hash,
                        draft,
                        &persisted,
                        &now,
                        run_id,
                    )?;
                    tx.execute(
                        "DELETE FROM evidence WHERE article_id = ?1",
                        params![article_id],
                    )?;
                    for item in &persisted {
                        insert_evidence_row(&tx, item)?;
                    }
                    updated = true;
                }
            }
        }

        let article = load_article(&tx, &article_id)?;
        tx.commit()?;
        Ok((article, created, updated))
    }

    /// Load one article with its evidence rows.
    pub fn get_article(&self, article_id: &str) -> Result<Article> {
        let conn = self.lock();
        load_article(&conn, article_id)
    }

    /// Look up an article by dedup key; the URL is canonicalized first.
    pub fn find_article(&self, canonical_url: &str, source_id: &str) -> Result<Option<Article>> {
        let canonical_url = canonicalize_url(canonical_url);
        let id: Option<String> = {
            let conn = self.lock();
            conn.query_row(
                "SELECT id FROM articles WHERE canonical_url = ?1 AND source_id = ?2",
                params![canonical_url, source_id],
                |row| row.get(0),
            )
            .optional()?
        };
        match id {
            Some(id) => Ok(Some(self.get_article(&id)?)),
            None => Ok(None),
        }
    }

    /// Article ids in deterministic export order `(canonical_url, source_id)`.
    pub fn list_article_ids_for_export(&self) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT id FROM articles ORDER BY canonical_url, source_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}

fn rebind_evidence(evidence: &[Evidence], article_id: &str, run_id: &str) -> Vec<Evidence> {
    evidence
        .iter()
        .map(|item| {
            let mut item = item.clone();
            item.article_id = article_id.to_string();
            item.run_id = run_id.to_string();
            item
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn insert_version(
    conn: &Connection,
    article_id: &str,
    version: i64,
    content_hash: &str,
    draft: &ArticleDraft,
    evidence: &[Evidence],
    now: &str,
    run_id: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO versions (
            id, article_id, version, content_hash,
            title_snapshot, author_hint_snapshot, published_at_snapshot, snippet_snapshot,
            evidence_snapshot, created_at, run_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            Uuid::new_v4().to_string(),
            article_id,
            version,
            content_hash,
            draft.title,
            draft.author_hint,
            draft.published_at.map(|value| value.to_rfc3339()),
            draft.snippet,
            serialize_evidence_snapshot(evidence),
            now,
            run_id,
        ],
    )?;
    Ok(())
}

pub(crate) fn insert_evidence_row(conn: &Connection, item: &Evidence) -> Result<()> {
    conn.execute(
        "INSERT INTO evidence (
            id, article_id, claim_path, evidence_type, source_url, extraction_method,
            extracted_text, confidence, metadata, retrieved_at, extractor_version,
            input_ref, snippet_max_chars_applied, created_at, run_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            item.id,
            item.article_id,
            item.claim_path,
            item.evidence_type.as_str(),
            item.source_url,
            item.extraction_method,
            item.extracted_text,
            item.confidence,
            to_canonical_string(&Value::Object(item.metadata.clone())),
            item.retrieved_at.to_rfc3339(),
            item.extractor_version,
            item.input_ref,
            item.snippet_max_chars_applied,
            item.created_at.to_rfc3339(),
            item.run_id,
        ],
    )?;
    Ok(())
}

/// Deterministic JSON for a version's evidence set, restored on rollback.
pub(crate) fn serialize_evidence_snapshot(evidence: &[Evidence]) -> String {
    let rows: Vec<Value> = evidence
        .iter()
        .map(|item| {
            json!({
                "id": item.id,
                "claim_path": item.claim_path,
                "evidence_type": item.evidence_type.as_str(),
                "source_url": item.source_url,
                "extraction_method": item.extraction_method,
                "extracted_text": item.extracted_text,
                "confidence": item.confidence,
                "metadata": Value::Object(item.metadata.clone()),
                "retrieved_at": item.retrieved_at.to_rfc3339(),
                "extractor_version": item.extractor_version,
                "input_ref": item.input_ref,
                "snippet_max_chars_applied": item.snippet_max_chars_applied,
                "created_at": item.created_at.to_rfc3339(),
                "run_id": item.run_id,
            })
        })
        .collect();
    to_canonical_string(&Value::Array(rows))
}

/// Restore evidence from a version snapshot. Malformed rows are skipped with
/// a structured storage event rather than failing the caller.
pub(crate) fn deserialize_evidence_snapshot(
    raw_snapshot: Option<&str>,
    article_id: &str,
) -> Vec<Evidence> {
    let Some(raw_snapshot) = raw_snapshot else {
        return Vec::new();
    };
    let rows: Vec<Value> = match serde_json::from_str(raw_snapshot) {
        Ok(Value::Array(rows)) => rows,
        Ok(_) => return Vec::new(),
        Err(err) => {
            ops::emit_event(
                "storage_evidence_snapshot_json_error",
                None,
                json!({
                    "component": "storage",
                    "article_id": article_id,
                    "error": err.to_string(),
                }),
            );
            return Vec::new();
        }
    };

    let mut restored = Vec::new();
    for (index, row) in rows.into_iter().enumerate() {
        match evidence_from_snapshot_row(&row, article_id) {
            Some(item) => restored.push(item),
            None => {
                ops::emit_event(
                    "storage_evidence_snapshot_row_error",
                    None,
                    json!({
                        "component": "storage",
                        "article_id": article_id,
                        "row_index": index,
                    }),
                );
            }
        }
    }
    restored
}

fn evidence_from_snapshot_row(row: &Value, article_id: &str) -> Option<Evidence> {
    let row = row.as_object()?;
    let string = |key: &str| row.get(key).and_then(Value::as_str).map(str::to_string);

    Some(Evidence {
        id: string("id").unwrap_or_else(|| Uuid::new_v4().to_string()),
        article_id: article_id.to_string(),
        claim_path: string("claim_path")?,
        evidence_type: EvidenceType::parse(&string("evidence_type")?)?,
        source_url: string("source_url")?,
        extraction_method: string("extraction_method"),
        extracted_text: string("extracted_text")?,
        confidence: row
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(1.0),
        metadata: match row.get("metadata") {
            Some(Value::Object(fields)) => fields.clone(),
            _ => serde_json::Map::new(),
        },
        retrieved_at: parse_utc(string("retrieved_at").as_deref()),
        extractor_version: string("extractor_version"),
        input_ref: string("input_ref"),
        snippet_max_chars_applied: row
            .get("snippet_max_chars_applied")
            .and_then(Value::as_u64)
            .map(|value| value as u32),
        created_at: parse_utc(string("created_at").as_deref()),
        run_id: string("run_id").unwrap_or_else(|| "snapshot".to_string()),
    })
}

fn parse_utc(value: Option<&str>) -> DateTime<Utc> {
    value
        .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|value| value.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

pub(crate) fn load_article(conn: &Connection, article_id: &str) -> Result<Article> {
    let article = conn
        .query_row(
            "SELECT id, canonical_url, source_id, title, author_hint, published_at, snippet,
                    version, created_at, updated_at
             FROM articles WHERE id = ?1",
            params![article_id],
            |row| {
                Ok(Article {
                    id: row.get(0)?,
                    canonical_url: row.get(1)?,
                    source_id: row.get(2)?,
                    title: row.get(3)?,
                    author_hint: row.get(4)?,
                    published_at: row
                        .get::<_, Option<String>>(5)?
                        .and_then(|value| DateTime::parse_from_rfc3339(&value).ok()),
                    snippet: row.get(6)?,
                    evidence: Vec::new(),
                    version: row.get(7)?,
                    created_at: parse_utc(Some(&row.get::<_, String>(8)?)),
                    updated_at: parse_utc(Some(&row.get::<_, String>(9)?)),
                })
            },
        )
        .optional()?;

    let mut article = article.ok_or_else(|| StorageError::ArticleNotFound(article_id.to_string()))?;

    let mut stmt = conn.prepare(
        "SELECT id, claim_path, evidence_type, source_url, extraction_method, extracted_text,
                confidence, metadata, retrieved_at, extractor_version, input_ref,
                snippet_max_chars_applied, created_at, run_id
         FROM evidence WHERE article_id = ?1 ORDER BY created_at, id",
    )?;
    let evidence = stmt
        .query_map(params![article_id], |row| {
            Ok(Evidence {
                id: row.get(0)?,
                article_id: article_id.to_string(),
                claim_path: row.get(1)?,
                evidence_type: EvidenceType::parse(&row.get::<_, String>(2)?)
                    .unwrap_or(EvidenceType::Extracted),
                source_url: row.get(3)?,
                extraction_method: row.get(4)?,
                extracted_text: row.get(5)?,
                confidence: row.get::<_, Option<f64>>(6)?.unwrap_or(1.0),
                metadata: row
                    .get::<_, Option<String>>(7)?
                    .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
                    .and_then(|value| match value {
                        Value::Object(fields) => Some(fields),
                        _ => None,
                    })
                    .unwrap_or_default(),
                retrieved_at: parse_utc(row.get::<_, Option<String>>(8)?.as_deref()),
                extractor_version: row.get(9)?,
                input_ref: row.get(10)?,
                snippet_max_chars_applied: row.get(11)?,
                created_at: parse_utc(row.get::<_, Option<String>>(12)?.as_deref()),
                run_id: row.get(13)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    article.evidence = evidence;
    Ok(article)
}
