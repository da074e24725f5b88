//! Per-run rollback.

use rusqlite::params;
use serde::Serialize;

use crate::articles::{deserialize_evidence_snapshot, insert_evidence_row};
use crate::error::Result;
use crate::{now_iso, Store};

/// Row counts for one rollback, keyed the way the CLI reports them.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RollbackSummary {
    pub fetch_log_deleted: usize,
    pub evidence_deleted: usize,
    pub versions_deleted: usize,
    pub merge_decisions_deleted: usize,
    pub articles_deleted: usize,
    pub articles_reverted: usize,
}

impl Store {
    /// Roll back every artifact written by one run.
    ///
    /// Fetch logs, evidence, versions, and merge decisions carrying the
    /// run_id are deleted. Articles whose only versions came from this run
    /// are removed entirely; articles with surviving versions are restored
    /// (fields and evidence) from the newest remaining snapshot. The run_log
    /// row is marked CANCELLED. The whole operation is one transaction.
    pub fn rollback_run(&self, run_id: &str) -> Result<RollbackSummary> {
        let mut summary = RollbackSummary::default();
        let now = now_iso();

        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        summary.fetch_log_deleted =
            tx.execute("DELETE FROM fetch_log WHERE run_id = ?1", params![run_id])?;
        summary.evidence_deleted =
            tx.execute("DELETE FROM evidence WHERE run_id = ?1", params![run_id])?;

        let affected_article_ids: Vec<String> = {
            let mut stmt =
                tx.prepare("SELECT DISTINCT article_id FROM versions WHERE run_id = ?1")?;
            let rows = stmt
                .query_map(params![run_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        summary.versions_deleted =
            tx.execute("DELETE FROM versions WHERE run_id = ?1", params![run_id])?;
        summary.merge_decisions_deleted = tx.execute(
            "DELETE FROM merge_decisions WHERE run_id = ?1",
            params![run_id],
        )?;

        for article_id in &affected_article_ids {
            let latest: Option<(i64, Option<String>, Option<String>, Option<String>, Option<String>, Option<String>)> =
                tx.query_row(
                    "SELECT version, title_snapshot, author_hint_snapshot,
                            published_at_snapshot, snippet_snapshot, evidence_snapshot
                     FROM versions WHERE article_id = ?1 ORDER BY version DESC LIMIT 1",
                    params![article_id],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                        ))
                    },
                )
                .map(Some)
                .or_else(|err| match err {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    err => Err(err),
                })?;

            match latest {
                None => {
                    tx.execute(
                        "DELETE FROM evidence WHERE article_id = ?1",
                        params![article_id],
                    )?;
                    let deleted = tx.execute(
                        "DELETE FROM articles WHERE id = ?1",
                        params![article_id],
                    )?;
                    if deleted > 0 {
                        summary.articles_deleted += 1;
                    }
                }
                Some((version, title, author_hint, published_at, snippet, evidence_snapshot)) => {
                    tx.execute(
                        "UPDATE articles SET
                            title = ?1, author_hint = ?2, published_at = ?3,
                            snippet = ?4, version = ?5, updated_at = ?6
                         WHERE id = ?7",
                        params![title, author_hint, published_at, snippet, version, now, article_id],
                    )?;
                    tx.execute(
                        "DELETE FROM evidence WHERE article_id = ?1",
                        params![article_id],
                    )?;
                    for item in
                        deserialize_evidence_snapshot(evidence_snapshot.as_deref(), article_id)
                    {
                        insert_evidence_row(&tx, &item)?;
                    }
                    summary.articles_reverted += 1;
                }
            }
        }

        tx.execute(
            "UPDATE run_log SET
                status = 'CANCELLED',
                ended_at = COALESCE(ended_at, ?1),
                error_message = ?2
             WHERE id = ?3",
            params![now, format!("Rolled back run {run_id}"), run_id],
        )?;

        tx.commit()?;
        tracing::debug!(run_id, ?summary, "rollback complete");
        Ok(summary)
    }
}
