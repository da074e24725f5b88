use std::path::{Path, PathBuf};
use std::sync::Arc;

use fetch::{HttpTransport, Transport};
use models::{Compliance, RunStatus};
use serde_json::json;
use storage::Store;
use uuid::Uuid;

#[derive(Debug, clap::Args)]
pub struct SyncArgs {
    /// Source ID selecting the connector, e.g. rss:example_feed
    #[arg(long)]
    pub source_id: String,

    /// Seed input (URL or local file path)
    #[arg(long)]
    pub seed: String,

    /// SQLite database path
    #[arg(long, default_value = super::DEFAULT_DB)]
    pub db: PathBuf,

    /// Optional explicit run ID
    #[arg(long)]
    pub run_id: Option<String>,

    /// Discover/fetch/parse/extract only; skip store and export
    #[arg(long)]
    pub dry_run: bool,

    /// Export JSONL path; defaults to export-<run_id>.jsonl next to the db
    #[arg(long)]
    pub export: Option<PathBuf>,
}

pub fn sync(args: &SyncArgs) -> anyhow::Result<i32> {
    let config = Compliance::default();
    config.validate()?;

    let run_id = args
        .run_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let export_path = args.export.clone().unwrap_or_else(|| {
        args.db
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(format!("export-{run_id}.jsonl"))
    });

    let store = Arc::new(Store::open(&args.db)?);
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);
    let sync_pipeline = pipeline::build_sync_pipeline(
        &args.source_id,
        store,
        &config,
        transport,
        export_path.clone(),
    )?;

    let run_log = sync_pipeline.run(&args.seed, &args.source_id, &run_id, args.dry_run);

    ops::emit_event(
        "cli_sync_completed",
        Some(&run_log.id),
        json!({
            "command": "sync",
            "source_id": args.source_id,
            "seed": args.seed,
            "db": args.db.display().to_string(),
            "export": export_path.display().to_string(),
            "status": run_log.status.as_str(),
            "fetched": run_log.fetched_count,
            "new": run_log.new_articles_count,
            "updated": run_log.updated_articles_count,
            "errors": run_log.error_count,
            "note": run_log.error_message,
        }),
    );

    Ok(if run_log.status == RunStatus::Completed {
        0
    } else {
        1
    })
}
