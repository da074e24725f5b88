//! The byline command surface.
//!
//! Every command finishes with a terminal `cli_*_completed` or `cli_error`
//! event on stdout; diagnostics go to stderr via tracing. Exit codes: 0 on
//! success, 1 on failure (sync reports non-COMPLETED runs as failure, and
//! `review apply` reports any invalid candidate row as failure even when
//! other rows were applied).

pub mod commands;

use clap::Parser;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(
    name = "byline",
    version,
    about = "Compliance-first author indexing pipeline"
)]
pub struct Cli {
    #[clap(flatten)]
    pub log_args: ops::LogArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
#[command(rename_all = "kebab-case")]
pub enum Command {
    /// Run the sync pipeline for a connector source
    Sync(commands::SyncArgs),
    /// Write a schema-validated JSONL export. On a validation failure the
    /// export aborts; rows already written remain in the output file and
    /// must be discarded by the caller.
    Export(commands::ExportArgs),
    /// Roll back all persisted artifacts for a run
    Rollback(commands::RollbackArgs),
    /// Generate the merge-candidate review queue
    ReviewQueue(commands::ReviewQueueArgs),
    /// Manual review operations
    Review(commands::ReviewArgs),
    /// Validate the embedded JSON schemas
    ValidateSchemas,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Sync(_) => "sync",
            Command::Export(_) => "export",
            Command::Rollback(_) => "rollback",
            Command::ReviewQueue(_) => "review-queue",
            Command::Review(_) => "review apply",
            Command::ValidateSchemas => "validate-schemas",
        }
    }

    /// Run id used for error reporting when a command fails early.
    fn error_run_id(&self) -> String {
        let explicit = match self {
            Command::Sync(args) => args.run_id.clone(),
            Command::Export(args) => args.run_id.clone(),
            Command::Rollback(args) => Some(args.run.clone()),
            Command::ReviewQueue(args) => args.run_id.clone(),
            Command::Review(args) => match &args.command {
                commands::ReviewCommand::Apply(apply) => apply.run_id.clone(),
            },
            Command::ValidateSchemas => None,
        };
        explicit.unwrap_or_else(|| Uuid::new_v4().to_string())
    }
}

/// Execute one parsed CLI invocation and return the process exit code.
pub fn run(cli: Cli) -> i32 {
    let command_name = cli.command.name();
    let run_id = cli.command.error_run_id();

    match dispatch(cli.command) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, command = command_name, "command failed");
            ops::emit_event(
                "cli_error",
                Some(&run_id),
                json!({"command": command_name, "error": err.to_string()}),
            );
            1
        }
    }
}

fn dispatch(command: Command) -> anyhow::Result<i32> {
    match command {
        Command::Sync(args) => commands::sync(&args),
        Command::Export(args) => commands::export(&args),
        Command::Rollback(args) => commands::rollback(&args),
        Command::ReviewQueue(args) => commands::review_queue(&args),
        Command::Review(args) => match args.command {
            commands::ReviewCommand::Apply(apply) => commands::review_apply(&apply).map(
                |summary| {
                    if summary.invalid == 0 {
                        0
                    } else {
                        1
                    }
                },
            ),
        },
        Command::ValidateSchemas => commands::validate_schemas(),
    }
}
