//! End-to-end sync scenarios over a routed in-memory transport: RSS happy
//! path, unchanged re-sync, content change, redirect limits, and robots
//! refusals.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use fetch::{Fetcher, PolitenessGate, Transport, TransportError, TransportResponse};
use models::{Compliance, FetchErrorCode, RunStatus};
use pipeline::{JsonlExporter, Pipeline};
use storage::Store;

type Route = Box<dyn Fn(&str) -> (u16, Vec<(String, String)>, Vec<u8>) + Send + Sync>;

/// Transport that routes by URL and records every request.
struct Routed {
    route: Route,
    requests: Mutex<Vec<String>>,
}

impl Routed {
    fn new(route: Route) -> Arc<Self> {
        Arc::new(Routed {
            route,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests_for(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|requested| requested.as_str() == url)
            .count()
    }
}

impl Transport for Routed {
    fn get(
        &self,
        url: &str,
        _user_agent: &str,
        _timeout: std::time::Duration,
    ) -> Result<TransportResponse, TransportError> {
        self.requests.lock().unwrap().push(url.to_string());
        let (status, headers, body) = (self.route)(url);
        let headers: BTreeMap<String, String> = headers.into_iter().collect();
        Ok(TransportResponse {
            status,
            headers,
            body: Box::new(std::io::Cursor::new(body)),
        })
    }
}

fn article_page(title: &str, author: &str) -> Vec<u8> {
    format!(
        r#"<html><head>
            <meta property="og:title" content="{title}">
            <meta name="author" content="{author}">
            <meta property="article:published_time" content="2024-05-01T09:00:00Z">
        </head><body><p>Body text for {title}.</p></body></html>"#
    )
    .into_bytes()
}

fn html_headers() -> Vec<(String, String)> {
    vec![("content-type".to_string(), "text/html".to_string())]
}

const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><link>https://example.com/posts/a</link></item>
    <item><link>https://example.com/posts/b</link></item>
    <item><link>https://example.com/posts/c</link></item>
</channel></rss>"#;

fn write_seed(dir: &std::path::Path) -> PathBuf {
    let seed = dir.join("feed.xml");
    std::fs::File::create(&seed)
        .unwrap()
        .write_all(FEED.as_bytes())
        .unwrap();
    seed
}

/// Route for the happy path: robots 404, three article pages, with one
/// title overridable to simulate a content change.
fn happy_route(title_a: &'static str) -> Route {
    Box::new(move |url| match url {
        "https://example.com/robots.txt" => (404, Vec::new(), Vec::new()),
        "https://example.com/posts/a" => (200, html_headers(), article_page(title_a, "Jane Doe")),
        "https://example.com/posts/b" => (200, html_headers(), article_page("Post B", "Jane Doe")),
        "https://example.com/posts/c" => (200, html_headers(), article_page("Post C", "John Smith")),
        other => panic!("unexpected request: {other}"),
    })
}

fn sync_pipeline(
    store: Arc<Store>,
    transport: Arc<Routed>,
    export_path: PathBuf,
) -> Pipeline {
    let mut config = Compliance::default();
    config.per_domain_delay_seconds = 0.0;
    config.validate().unwrap();

    let mut fetcher = Fetcher::with_transport(config.clone(), transport);
    fetcher.set_resolver(|_| vec!["93.184.216.34".parse().unwrap()]);
    fetcher.set_politeness(Some(PolitenessGate::new(0.0, 1)));
    fetcher.set_log_fetches(false);
    fetcher.set_event_hook(|_, _, _| {});

    let connector = connectors::Connector::for_source_id(
        "rss:example",
        Arc::new(NeverTransport),
        &config.user_agent,
        config.fetch_timeout,
    )
    .unwrap();

    let mut pipeline = Pipeline::new(
        Box::new(connector),
        Box::new(fetcher),
        Box::new(parser::Parser::new(config.snippet_max_chars)),
        Box::new(extractors::Extractor::new("rss:example", &config)),
        Box::new(store.clone()),
        Box::new(JsonlExporter::new(store.clone())),
        Some(store),
        export_path,
    );
    pipeline.set_event_hook(|_, _, _| {});
    pipeline
}

/// Seed loads come from local files in these tests.
struct NeverTransport;
impl Transport for NeverTransport {
    fn get(
        &self,
        url: &str,
        _user_agent: &str,
        _timeout: std::time::Duration,
    ) -> Result<TransportResponse, TransportError> {
        panic!("seed transport should not be used, got {url}");
    }
}

#[test]
fn rss_happy_path_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let seed = write_seed(dir.path());
    let db_path = dir.path().join("byline.db");
    let export_path = dir.path().join("export-run-rss-e2e.jsonl");

    let store = Arc::new(Store::open(&db_path).unwrap());
    let transport = Routed::new(happy_route("Post A"));
    let pipeline = sync_pipeline(store.clone(), transport.clone(), export_path.clone());

    let run_log = pipeline.run(seed.to_str().unwrap(), "rss:example", "run-rss-e2e", false);

    assert_eq!(run_log.status, RunStatus::Completed);
    assert_eq!(run_log.fetched_count, 3);
    assert_eq!(run_log.new_articles_count, 3);
    assert_eq!(run_log.updated_articles_count, 0);
    assert_eq!(run_log.error_count, 0);

    // Robots was consulted exactly once for the host.
    assert_eq!(transport.requests_for("https://example.com/robots.txt"), 1);

    // Three articles at version 1, each with full evidence coverage.
    let ids = store.list_article_ids_for_export().unwrap();
    assert_eq!(ids.len(), 3);
    for id in &ids {
        let article = store.get_article(id).unwrap();
        assert_eq!(article.version, 1);
        assert!(article.title.is_some());
        assert!(article.author_hint.is_some());
        assert!(article.published_at.is_some());
        for claim_path in ["/title", "/author_hint", "/published_at"] {
            assert!(
                article
                    .evidence
                    .iter()
                    .any(|item| item.claim_path == claim_path),
                "missing evidence for {claim_path}"
            );
        }
    }

    // Storage-level bookkeeping.
    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let versions: i64 = conn
        .query_row("SELECT COUNT(*) FROM versions", [], |row| row.get(0))
        .unwrap();
    let fetch_logs: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM fetch_log WHERE run_id = 'run-rss-e2e'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(versions, 3);
    assert_eq!(fetch_logs, 3);

    // The JSONL export has exactly three schema-valid lines.
    let exported = std::fs::read_to_string(&export_path).unwrap();
    let lines: Vec<&str> = exported.lines().collect();
    assert_eq!(lines.len(), 3);
    let validator = pipeline::schemas::article_validator().unwrap();
    for line in lines {
        let payload: serde_json::Value = serde_json::from_str(line).unwrap();
        assert!(validator.is_valid(&payload), "invalid export row: {line}");
    }
}

#[test]
fn unchanged_resync_writes_no_new_versions() {
    let dir = tempfile::tempdir().unwrap();
    let seed = write_seed(dir.path());
    let db_path = dir.path().join("byline.db");
    let store = Arc::new(Store::open(&db_path).unwrap());

    let first = sync_pipeline(
        store.clone(),
        Routed::new(happy_route("Post A")),
        dir.path().join("export-1.jsonl"),
    );
    first.run(seed.to_str().unwrap(), "rss:example", "run-1", false);

    let second = sync_pipeline(
        store.clone(),
        Routed::new(happy_route("Post A")),
        dir.path().join("export-2.jsonl"),
    );
    let run_log = second.run(seed.to_str().unwrap(), "rss:example", "run-2", false);

    assert_eq!(run_log.status, RunStatus::Completed);
    assert_eq!(run_log.new_articles_count, 0);
    assert_eq!(run_log.updated_articles_count, 0);

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let versions: i64 = conn
        .query_row("SELECT COUNT(*) FROM versions", [], |row| row.get(0))
        .unwrap();
    assert_eq!(versions, 3);
}

#[test]
fn content_change_bumps_one_version() {
    let dir = tempfile::tempdir().unwrap();
    let seed = write_seed(dir.path());
    let store = Arc::new(Store::open(dir.path().join("byline.db")).unwrap());

    let first = sync_pipeline(
        store.clone(),
        Routed::new(happy_route("Post A")),
        dir.path().join("export-1.jsonl"),
    );
    first.run(seed.to_str().unwrap(), "rss:example", "run-1", false);

    let second = sync_pipeline(
        store.clone(),
        Routed::new(happy_route("Post A, Retitled")),
        dir.path().join("export-2.jsonl"),
    );
    let run_log = second.run(seed.to_str().unwrap(), "rss:example", "run-2", false);

    assert_eq!(run_log.new_articles_count, 0);
    assert_eq!(run_log.updated_articles_count, 1);

    let changed = store
        .find_article("https://example.com/posts/a", "rss:example")
        .unwrap()
        .unwrap();
    assert_eq!(changed.version, 2);
    assert_eq!(changed.title.as_deref(), Some("Post A, Retitled"));
    assert!(changed.evidence.iter().all(|item| item.run_id == "run-2"));
}

#[test]
fn redirect_storm_is_contained() {
    let dir = tempfile::tempdir().unwrap();
    let seed = dir.path().join("feed.xml");
    std::fs::write(
        &seed,
        r#"<rss><channel><item><link>https://example.com/loop</link></item></channel></rss>"#,
    )
    .unwrap();
    let db_path = dir.path().join("byline.db");
    let store = Arc::new(Store::open(&db_path).unwrap());

    let transport = Routed::new(Box::new(|url| match url {
        "https://example.com/robots.txt" => (404, Vec::new(), Vec::new()),
        _ => (
            302,
            vec![("location".to_string(), "https://example.com/loop".to_string())],
            Vec::new(),
        ),
    }));
    let pipeline = sync_pipeline(store.clone(), transport, dir.path().join("out.jsonl"));
    let run_log = pipeline.run(seed.to_str().unwrap(), "rss:example", "run-loop", false);

    assert_eq!(run_log.status, RunStatus::Completed);
    assert_eq!(run_log.fetched_count, 1);
    assert_eq!(run_log.error_count, 1);

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let error_code: String = conn
        .query_row(
            "SELECT error_code FROM fetch_log WHERE run_id = 'run-loop'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(error_code, FetchErrorCode::RedirectLimit.as_str());
}

#[test]
fn robots_disallow_blocks_the_page() {
    let dir = tempfile::tempdir().unwrap();
    let seed = dir.path().join("feed.xml");
    std::fs::write(
        &seed,
        r#"<rss><channel><item><link>https://example.com/private/post</link></item></channel></rss>"#,
    )
    .unwrap();
    let store = Arc::new(Store::open(dir.path().join("byline.db")).unwrap());

    let transport = Routed::new(Box::new(|url| match url {
        "https://example.com/robots.txt" => (
            200,
            Vec::new(),
            b"User-agent: *\nDisallow: /private\n".to_vec(),
        ),
        other => panic!("blocked page must not be fetched, got {other}"),
    }));
    let pipeline = sync_pipeline(
        store.clone(),
        transport.clone(),
        dir.path().join("out.jsonl"),
    );
    let run_log = pipeline.run(seed.to_str().unwrap(), "rss:example", "run-robots", false);

    assert_eq!(run_log.status, RunStatus::Completed);
    assert_eq!(run_log.error_count, 1);
    assert_eq!(transport.requests_for("https://example.com/private/post"), 0);
    assert!(store.list_article_ids_for_export().unwrap().is_empty());
}
