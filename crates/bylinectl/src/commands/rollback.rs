use std::path::PathBuf;

use serde_json::json;
use storage::Store;

#[derive(Debug, clap::Args)]
pub struct RollbackArgs {
    /// Run ID to roll back
    #[arg(long)]
    pub run: String,

    /// SQLite database path
    #[arg(long, default_value = super::DEFAULT_DB)]
    pub db: PathBuf,
}

pub fn rollback(args: &RollbackArgs) -> anyhow::Result<i32> {
    if !args.db.exists() {
        anyhow::bail!("database file not found: {}", args.db.display());
    }

    let store = Store::open_existing(&args.db)?;
    let summary = store.rollback_run(&args.run)?;

    let mut payload = json!({
        "command": "rollback",
        "db": args.db.display().to_string(),
        "target_run_id": args.run,
    });
    if let (Some(fields), serde_json::Value::Object(summary_fields)) = (
        payload.as_object_mut(),
        serde_json::to_value(&summary)?,
    ) {
        for (key, value) in summary_fields {
            fields.insert(key, value);
        }
    }

    ops::emit_event("cli_rollback_completed", Some(&args.run), payload);
    Ok(0)
}
