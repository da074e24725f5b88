//! The staged per-URL orchestrator.
//!
//! Per-URL failures are contained: they increment `error_count`, emit a
//! `pipeline_stage_error` event tagged with the failing stage, and the loop
//! continues. Discover and export failures are fatal to the run.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use models::{Compliance, RunLog, RunStatus};
use serde_json::{json, Value};
use storage::Store;

use crate::export::JsonlExporter;
use crate::stages::{
    DiscoverStage, ExportStage, ExtractStage, FetchStage, ParseStage, StoreStage,
};

/// Sink for pipeline events: `(event_type, run_id, payload)`.
pub type PipelineEventHook = Box<dyn Fn(&str, &str, Value) + Send + Sync>;

pub struct Pipeline {
    pub discover: Box<dyn DiscoverStage>,
    pub fetch: Box<dyn FetchStage>,
    pub parse: Box<dyn ParseStage>,
    pub extract: Box<dyn ExtractStage>,
    pub store: Box<dyn StoreStage>,
    pub export: Box<dyn ExportStage>,
    /// When present, run start, fetch logs, and the final run state are
    /// persisted here.
    pub run_store: Option<Arc<Store>>,
    pub export_path: PathBuf,
    max_urls: usize,
    cancel: Option<Arc<AtomicBool>>,
    event_hook: Option<PipelineEventHook>,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        discover: Box<dyn DiscoverStage>,
        fetch: Box<dyn FetchStage>,
        parse: Box<dyn ParseStage>,
        extract: Box<dyn ExtractStage>,
        store: Box<dyn StoreStage>,
        export: Box<dyn ExportStage>,
        run_store: Option<Arc<Store>>,
        export_path: PathBuf,
    ) -> Self {
        Pipeline {
            discover,
            fetch,
            parse,
            extract,
            store,
            export,
            run_store,
            export_path,
            max_urls: Compliance::default().max_urls_per_run,
            cancel: None,
            event_hook: None,
        }
    }

    /// Cap on URLs consumed from discovery (safety valve).
    pub fn set_max_urls(&mut self, max_urls: usize) {
        self.max_urls = max_urls;
    }

    /// Run-wide cancellation: when set, the loop stops discovering new URLs
    /// and the run finishes as CANCELLED.
    pub fn set_cancel_flag(&mut self, cancel: Arc<AtomicBool>) {
        self.cancel = Some(cancel);
    }

    pub fn set_event_hook(&mut self, hook: impl Fn(&str, &str, Value) + Send + Sync + 'static) {
        self.event_hook = Some(Box::new(hook));
    }

    fn emit(&self, event_type: &str, run_id: &str, payload: Value) {
        match &self.event_hook {
            Some(hook) => hook(event_type, run_id, payload),
            None => {
                ops::emit_event(event_type, Some(run_id), payload);
            }
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Execute one run. Never panics or returns an error: the outcome is the
    /// final RunLog with counters and status.
    pub fn run(&self, seed: &str, source_id: &str, run_id: &str, dry_run: bool) -> RunLog {
        let mut run_log = RunLog::new(run_id, source_id);

        if let Some(store) = &self.run_store {
            if let Err(err) = store.create_run_log(&run_log) {
                return self.fail_run(run_log, &err.to_string());
            }
        }

        let urls = match self.discover.discover(seed, run_id) {
            Ok(urls) => urls,
            Err(err) => {
                return self.fail_run(run_log, &err.to_string());
            }
        };

        let mut cancelled = false;
        for url in urls.into_iter().take(self.max_urls) {
            if self.cancelled() {
                cancelled = true;
                break;
            }

            let (doc, fetch_log) = self.fetch.fetch(&url, run_id);
            run_log.fetched_count += 1;

            if let Some(store) = &self.run_store {
                if let Err(err) = store.save_fetch_log(&fetch_log) {
                    self.stage_error(&mut run_log, "fetch", &url, &err.to_string());
                    continue;
                }
            }

            // Policy refusals and transport failures are expected; they
            // count as errors but never abort the run.
            if fetch_log.error_code.is_some() {
                run_log.error_count += 1;
                continue;
            }
            let Some(doc) = doc else {
                run_log.error_count += 1;
                continue;
            };

            let parsed = match self.parse.parse(&doc, run_id) {
                Ok(parsed) => parsed,
                Err(err) => {
                    self.stage_error(&mut run_log, "parse", &url, &err.to_string());
                    continue;
                }
            };

            let (draft, evidence) = match self.extract.extract(&parsed, run_id) {
                Ok(extracted) => extracted,
                Err(err) => {
                    self.stage_error(&mut run_log, "extract", &url, &err.to_string());
                    continue;
                }
            };

            if dry_run {
                continue;
            }
            match self.store.store(&draft, &evidence, run_id) {
                Ok((_, created, updated)) => {
                    if created {
                        run_log.new_articles_count += 1;
                    }
                    if updated {
                        run_log.updated_articles_count += 1;
                    }
                }
                Err(err) => {
                    self.stage_error(&mut run_log, "store", &url, &err.to_string());
                }
            }
        }

        run_log.status = if cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };
        run_log.ended_at = Some(Utc::now());

        if !dry_run && run_log.status == RunStatus::Completed {
            if let Err(err) = self.export.export(&self.export_path) {
                self.emit(
                    "pipeline_export_error",
                    run_id,
                    json!({
                        "stage": "export",
                        "output": self.export_path.display().to_string(),
                        "error": err.to_string(),
                    }),
                );
                run_log.status = RunStatus::Failed;
                run_log.error_message = Some(err.to_string());
            }
        }

        self.persist_final(&run_log);
        run_log
    }

    fn stage_error(&self, run_log: &mut RunLog, stage: &str, url: &str, error: &str) {
        self.emit(
            "pipeline_stage_error",
            &run_log.id,
            json!({"stage": stage, "url": url, "error": error}),
        );
        run_log.error_count += 1;
    }

    fn fail_run(&self, mut run_log: RunLog, error: &str) -> RunLog {
        self.emit(
            "pipeline_run_error",
            &run_log.id,
            json!({"stage": "run", "error": error}),
        );
        run_log.status = RunStatus::Failed;
        run_log.error_message = Some(error.to_string());
        run_log.ended_at = Some(Utc::now());
        self.persist_final(&run_log);
        run_log
    }

    fn persist_final(&self, run_log: &RunLog) {
        if let Some(store) = &self.run_store {
            if let Err(err) = store.update_run_log(run_log) {
                tracing::error!(error = %err, run_id = %run_log.id, "failed to persist run state");
            }
        }
    }
}

/// Wire the full sync pipeline the way the CLI runs it: connector by
/// source_id prefix, compliance fetcher, parser, extractor, and
/// storage-backed store/export stages sharing one database handle.
pub fn build_sync_pipeline(
    source_id: &str,
    store: Arc<Store>,
    config: &Compliance,
    transport: Arc<dyn fetch::Transport>,
    export_path: PathBuf,
) -> anyhow::Result<Pipeline> {
    config.validate()?;

    let connector = connectors::Connector::for_source_id(
        source_id,
        transport.clone(),
        &config.user_agent,
        config.fetch_timeout,
    )?;
    let fetcher = fetch::Fetcher::with_transport(config.clone(), transport);
    let html_parser = parser::Parser::new(config.snippet_max_chars);
    let extractor = extractors::Extractor::new(source_id, config);

    let mut pipeline = Pipeline::new(
        Box::new(connector),
        Box::new(fetcher),
        Box::new(html_parser),
        Box::new(extractor),
        Box::new(store.clone()),
        Box::new(JsonlExporter::new(store.clone())),
        Some(store),
        export_path,
    );
    pipeline.set_max_urls(config.max_urls_per_run);
    Ok(pipeline)
}
