//! Run/fetch bookkeeping, authors, accounts, and merge decisions.

use chrono::{DateTime, Utc};
use models::canon::to_canonical_string;
use models::{FetchErrorCode, FetchLog, MergeDecision, RunLog, RunStatus};
use rusqlite::{params, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::error::{Result, StorageError};
use crate::{now_iso, Store};

impl Store {
    /// Insert a new run_log row.
    pub fn create_run_log(&self, run_log: &RunLog) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO run_log (
                id, source_id, started_at, ended_at, status, error_message,
                fetched_count, new_articles_count, updated_articles_count, error_count
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                run_log.id,
                run_log.source_id,
                run_log.started_at.to_rfc3339(),
                run_log.ended_at.map(|value| value.to_rfc3339()),
                run_log.status.as_str(),
                run_log.error_message,
                run_log.fetched_count,
                run_log.new_articles_count,
                run_log.updated_articles_count,
                run_log.error_count,
            ],
        )?;
        Ok(())
    }

    /// Overwrite end-state counters and status for a run.
    pub fn update_run_log(&self, run_log: &RunLog) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE run_log SET
                ended_at = ?1, status = ?2, error_message = ?3,
                fetched_count = ?4, new_articles_count = ?5,
                updated_articles_count = ?6, error_count = ?7
             WHERE id = ?8",
            params![
                run_log.ended_at.map(|value| value.to_rfc3339()),
                run_log.status.as_str(),
                run_log.error_message,
                run_log.fetched_count,
                run_log.new_articles_count,
                run_log.updated_articles_count,
                run_log.error_count,
                run_log.id,
            ],
        )?;
        Ok(())
    }

    pub fn get_run_log(&self, run_id: &str) -> Result<Option<RunLog>> {
        let conn = self.lock();
        let run = conn
            .query_row(
                "SELECT id, source_id, started_at, ended_at, status, error_message,
                        fetched_count, new_articles_count, updated_articles_count, error_count
                 FROM run_log WHERE id = ?1",
                params![run_id],
                |row| {
                    Ok(RunLog {
                        id: row.get(0)?,
                        source_id: row.get(1)?,
                        started_at: parse_utc_or_now(&row.get::<_, String>(2)?),
                        ended_at: row
                            .get::<_, Option<String>>(3)?
                            .map(|value| parse_utc_or_now(&value)),
                        status: RunStatus::parse(&row.get::<_, String>(4)?)
                            .unwrap_or(RunStatus::Failed),
                        error_message: row.get(5)?,
                        fetched_count: row.get(6)?,
                        new_articles_count: row.get(7)?,
                        updated_articles_count: row.get(8)?,
                        error_count: row.get(9)?,
                    })
                },
            )
            .optional()?;
        Ok(run)
    }

    /// Insert one fetch_log row.
    pub fn save_fetch_log(&self, fetch_log: &FetchLog) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO fetch_log (
                id, url, status_code, latency_ms, bytes_received, error_code, created_at, run_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                fetch_log.id,
                fetch_log.url,
                fetch_log.status_code,
                fetch_log.latency_ms,
                fetch_log.bytes_received,
                fetch_log.error_code.as_ref().map(FetchErrorCode::as_str),
                fetch_log.created_at.to_rfc3339(),
                fetch_log.run_id,
            ],
        )?;
        Ok(())
    }

    /// Ensure a canonical author row exists (idempotent).
    pub fn ensure_author(&self, author_id: &str, canonical_name: &str) -> Result<()> {
        let now = now_iso();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO authors (id, canonical_name, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                canonical_name = excluded.canonical_name,
                updated_at = excluded.updated_at",
            params![author_id, canonical_name, "{}", now, now],
        )?;
        Ok(())
    }

    /// Record a per-source account identifier for an author (idempotent on
    /// the identifier).
    pub fn add_account(&self, author_id: &str, source: &str, source_identifier: &str) -> Result<()> {
        let conn = self.lock();
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM accounts WHERE author_id = ?1 AND source_identifier = ?2",
                params![author_id, source_identifier],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Ok(());
        }
        conn.execute(
            "INSERT INTO accounts (id, author_id, source, source_identifier, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                Uuid::new_v4().to_string(),
                author_id,
                source,
                source_identifier,
                now_iso(),
            ],
        )?;
        Ok(())
    }

    /// Persist one merge decision. Returns true when inserted, false when a
    /// row with this id already exists (idempotent replay).
    pub fn save_merge_decision(&self, decision: &MergeDecision) -> Result<bool> {
        let conn = self.lock();
        for author_id in [&decision.from_author_id, &decision.to_author_id] {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM authors WHERE id = ?1",
                    params![author_id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(StorageError::MissingAuthor);
            }
        }

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO merge_decisions (
                id, from_author_id, to_author_id, evidence_ids, decision_criteria,
                created_at, created_by, run_id, reverted_at, reverted_by, reverted_reason
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                decision.id,
                decision.from_author_id,
                decision.to_author_id,
                to_canonical_string(&json!(decision.evidence_ids)),
                decision.decision_criteria,
                decision.created_at.to_rfc3339(),
                decision.created_by,
                decision.run_id,
                decision.reverted_at.map(|value| value.to_rfc3339()),
                decision.reverted_by,
                decision.reverted_reason,
            ],
        )?;
        Ok(inserted > 0)
    }
}

fn parse_utc_or_now(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|value| value.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
