use std::path::PathBuf;
use std::sync::Arc;

use pipeline::{ExportStage, JsonlExporter};
use serde_json::json;
use storage::Store;
use uuid::Uuid;

#[derive(Debug, clap::Args)]
pub struct ExportArgs {
    /// Output JSONL path
    #[arg(long)]
    pub output: PathBuf,

    /// SQLite database path
    #[arg(long, default_value = super::DEFAULT_DB)]
    pub db: PathBuf,

    /// Optional explicit run ID for logging
    #[arg(long)]
    pub run_id: Option<String>,
}

pub fn export(args: &ExportArgs) -> anyhow::Result<i32> {
    let run_id = args
        .run_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let store = Arc::new(Store::open(&args.db)?);
    let exported_rows = JsonlExporter::new(store).export(&args.output)?;

    ops::emit_event(
        "cli_export_completed",
        Some(&run_id),
        json!({
            "command": "export",
            "output": args.output.display().to_string(),
            "db": args.db.display().to_string(),
            "exported_rows": exported_rows,
        }),
    );
    Ok(0)
}
