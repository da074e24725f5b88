//! The manual merge-review workflow: queue generation and decision apply.

use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};
use models::canon::to_canonical_string;
use models::{MergeDecision, RunLog, RunStatus};
use serde_json::{json, Value};
use storage::Store;
use uuid::Uuid;

#[derive(Debug, clap::Args)]
pub struct ReviewQueueArgs {
    /// Output review JSON path
    #[arg(long, default_value = "review.json")]
    pub output: PathBuf,

    /// SQLite database path
    #[arg(long, default_value = super::DEFAULT_DB)]
    pub db: PathBuf,

    /// Optional explicit run ID for logging
    #[arg(long)]
    pub run_id: Option<String>,

    /// Minimum candidate score included in the queue
    #[arg(long, default_value_t = 0.6)]
    pub min_score: f64,
}

#[derive(Debug, clap::Args)]
pub struct ReviewArgs {
    #[command(subcommand)]
    pub command: ReviewCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum ReviewCommand {
    /// Apply decisions from a review queue JSON file
    Apply(ReviewApplyArgs),
}

#[derive(Debug, clap::Args)]
pub struct ReviewApplyArgs {
    /// Path to the review JSON file
    pub review_file: PathBuf,

    /// SQLite database path
    #[arg(long, default_value = super::DEFAULT_DB)]
    pub db: PathBuf,

    /// Optional explicit run ID for this apply run
    #[arg(long)]
    pub run_id: Option<String>,

    /// Operator identifier written to merge_decisions.created_by
    #[arg(long, default_value = "manual-review")]
    pub created_by: String,
}

pub fn review_queue(args: &ReviewQueueArgs) -> anyhow::Result<i32> {
    let run_id = args
        .run_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let store = Store::open(&args.db)?;
    let profiles = store.list_resolution_author_profiles()?;
    let candidates: Vec<Value> = resolve::build_candidates(&profiles, args.min_score)
        .iter()
        .map(resolve::Candidate::to_queue_json)
        .collect();

    let payload = json!({
        "generated_at": Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        "min_score": args.min_score,
        "candidates": candidates,
    });
    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(
        &args.output,
        format!("{}\n", serde_json::to_string_pretty(&payload)?),
    )?;

    ops::emit_event(
        "cli_review_queue_completed",
        Some(&run_id),
        json!({
            "command": "review-queue",
            "db": args.db.display().to_string(),
            "output": args.output.display().to_string(),
            "min_score": args.min_score,
            "candidate_count": payload["candidates"].as_array().map(Vec::len).unwrap_or(0),
        }),
    );
    Ok(0)
}

/// Outcome counters for one apply run.
#[derive(Debug, Default)]
pub struct ApplySummary {
    pub accepted: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub held: usize,
    pub invalid: usize,
}

pub fn review_apply(args: &ReviewApplyArgs) -> anyhow::Result<ApplySummary> {
    if !args.review_file.exists() {
        anyhow::bail!("review file not found: {}", args.review_file.display());
    }
    let raw: Value = serde_json::from_str(&std::fs::read_to_string(&args.review_file)?)?;
    let candidates = match raw.get("candidates") {
        Some(Value::Array(candidates)) => candidates.clone(),
        Some(_) => anyhow::bail!("invalid review file: 'candidates' must be a list"),
        None => Vec::new(),
    };

    let run_id = args
        .run_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let store = Store::open(&args.db)?;
    let mut run_log = RunLog::new(&run_id, "review:apply");
    store.create_run_log(&run_log)?;

    let mut summary = ApplySummary::default();
    for item in &candidates {
        let Some(item) = item.as_object() else {
            summary.invalid += 1;
            continue;
        };

        let decision = item
            .get("decision")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        match decision.as_str() {
            "reject" => {
                summary.rejected += 1;
                continue;
            }
            "" | "hold" => {
                summary.held += 1;
                continue;
            }
            "accept" => {}
            _ => {
                summary.invalid += 1;
                continue;
            }
        }

        let author_field = |key: &str, field: &str| -> String {
            item.get(key)
                .and_then(Value::as_object)
                .and_then(|author| author.get(field))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string()
        };
        let from_id = author_field("from_author", "id");
        let to_id = author_field("to_author", "id");
        if from_id.is_empty() || to_id.is_empty() {
            summary.invalid += 1;
            continue;
        }
        let mut from_name = author_field("from_author", "canonical_name");
        if from_name.is_empty() {
            from_name = author_field("from_author", "name");
        }
        if from_name.is_empty() {
            from_name = from_id.clone();
        }
        let mut to_name = author_field("to_author", "canonical_name");
        if to_name.is_empty() {
            to_name = author_field("to_author", "name");
        }
        if to_name.is_empty() {
            to_name = to_id.clone();
        }

        store.ensure_author(&from_id, &from_name)?;
        store.ensure_author(&to_id, &to_name)?;

        let candidate_id = item
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{from_id}:{to_id}"));
        let criteria = to_canonical_string(&json!({
            "score": item.get("score"),
            "confidence": item.get("confidence"),
            "scoring_breakdown": item.get("scoring_breakdown"),
        }));
        let evidence_ids: Vec<String> = item
            .get("evidence")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|entry| !entry.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let record = MergeDecision::new(
            &candidate_id,
            &from_id,
            &to_id,
            evidence_ids,
            criteria,
            &args.created_by,
            &run_id,
        );
        if store.save_merge_decision(&record)? {
            summary.accepted += 1;
        } else {
            summary.duplicates += 1;
        }
    }

    run_log.ended_at = Some(Utc::now());
    run_log.error_count = summary.invalid as u64;
    if summary.invalid > 0 {
        run_log.error_message = Some(format!(
            "{} invalid candidate rows skipped",
            summary.invalid
        ));
    }
    run_log.status = RunStatus::Completed;
    store.update_run_log(&run_log)?;

    ops::emit_event(
        "cli_review_apply_completed",
        Some(&run_id),
        json!({
            "command": "review apply",
            "db": args.db.display().to_string(),
            "review_file": args.review_file.display().to_string(),
            "accepted": summary.accepted,
            "duplicates": summary.duplicates,
            "rejected": summary.rejected,
            "held": summary.held,
            "invalid": summary.invalid,
        }),
    );
    Ok(summary)
}
