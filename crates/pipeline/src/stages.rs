//! The six stage contracts and their bindings onto the concrete components.
//!
//! Each stage is one capability with one method; the orchestrator composes
//! them as plain trait objects so tests can substitute any stage.

use std::path::Path;
use std::sync::Arc;

use models::{Article, ArticleDraft, Evidence, FetchLog, FetchedDoc, Parsed};

/// Seed -> candidate URLs, deduplicated in discovery order. Loading the seed
/// is eager; failures here are fatal to the run.
pub trait DiscoverStage: Send + Sync {
    fn discover(&self, seed: &str, run_id: &str) -> anyhow::Result<Vec<String>>;
}

/// URL -> document. Never fails; refusals and errors come back as the typed
/// `error_code` on the fetch log.
pub trait FetchStage: Send + Sync {
    fn fetch(&self, url: &str, run_id: &str) -> (Option<FetchedDoc>, FetchLog);
}

pub trait ParseStage: Send + Sync {
    fn parse(&self, fetched: &FetchedDoc, run_id: &str) -> anyhow::Result<Parsed>;
}

pub trait ExtractStage: Send + Sync {
    fn extract(&self, parsed: &Parsed, run_id: &str)
        -> anyhow::Result<(ArticleDraft, Vec<Evidence>)>;
}

pub trait StoreStage: Send + Sync {
    fn store(
        &self,
        draft: &ArticleDraft,
        evidence: &[Evidence],
        run_id: &str,
    ) -> anyhow::Result<(Article, bool, bool)>;
}

pub trait ExportStage: Send + Sync {
    fn export(&self, output_path: &Path) -> anyhow::Result<usize>;
}

impl DiscoverStage for connectors::Connector {
    fn discover(&self, seed: &str, _run_id: &str) -> anyhow::Result<Vec<String>> {
        Ok(connectors::Connector::discover(self, seed)?)
    }
}

impl FetchStage for fetch::Fetcher {
    fn fetch(&self, url: &str, run_id: &str) -> (Option<FetchedDoc>, FetchLog) {
        fetch::Fetcher::fetch(self, url, run_id)
    }
}

impl ParseStage for parser::Parser {
    fn parse(&self, fetched: &FetchedDoc, _run_id: &str) -> anyhow::Result<Parsed> {
        Ok(parser::Parser::parse(self, fetched))
    }
}

impl ExtractStage for extractors::Extractor {
    fn extract(
        &self,
        parsed: &Parsed,
        run_id: &str,
    ) -> anyhow::Result<(ArticleDraft, Vec<Evidence>)> {
        Ok(extractors::Extractor::extract(self, parsed, run_id))
    }
}

impl StoreStage for Arc<storage::Store> {
    fn store(
        &self,
        draft: &ArticleDraft,
        evidence: &[Evidence],
        run_id: &str,
    ) -> anyhow::Result<(Article, bool, bool)> {
        Ok(self.upsert_article(draft, evidence, run_id)?)
    }
}
