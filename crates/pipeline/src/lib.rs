//! Pipeline orchestration: the staged discover → fetch → parse → extract →
//! store → export loop with per-URL error containment, plus the
//! schema-validated JSONL exporter.

mod export;
mod run;
pub mod schemas;
mod stages;

pub use export::JsonlExporter;
pub use run::{build_sync_pipeline, Pipeline, PipelineEventHook};
pub use stages::{DiscoverStage, ExportStage, ExtractStage, FetchStage, ParseStage, StoreStage};
