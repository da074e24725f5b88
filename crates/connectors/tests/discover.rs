use std::collections::{BTreeMap, VecDeque};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use connectors::Connector;
use fetch::{Transport, TransportError, TransportResponse};

/// Transport that pops scripted bodies and records requested URLs.
struct Scripted {
    responses: Mutex<VecDeque<(u16, String)>>,
    urls: Mutex<Vec<String>>,
}

impl Scripted {
    fn new(responses: Vec<(u16, &str)>) -> Arc<Self> {
        Arc::new(Scripted {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|(status, body)| (status, body.to_string()))
                    .collect(),
            ),
            urls: Mutex::new(Vec::new()),
        })
    }
}

impl Transport for Scripted {
    fn get(
        &self,
        url: &str,
        _user_agent: &str,
        _timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        self.urls.lock().unwrap().push(url.to_string());
        let (status, body) = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted transport exhausted");
        Ok(TransportResponse {
            status,
            headers: BTreeMap::new(),
            body: Box::new(std::io::Cursor::new(body.into_bytes())),
        })
    }
}

fn connector(source_id: &str, transport: Arc<Scripted>) -> Connector {
    Connector::for_source_id(source_id, transport, "byline/0.1", Duration::from_secs(30)).unwrap()
}

const RSS_FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Example feed</title>
    <item><title>A</title><link>https://example.com/a</link></item>
    <item><title>B</title><link>https://example.com/b</link></item>
    <item><title>dup</title><link>https://example.com/a</link></item>
    <item><title>C</title><link>https://example.com/c</link></item>
</channel></rss>"#;

#[test]
fn rss_seed_from_file_discovers_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let seed = dir.path().join("feed.xml");
    std::fs::File::create(&seed)
        .unwrap()
        .write_all(RSS_FEED.as_bytes())
        .unwrap();

    let transport = Scripted::new(vec![]);
    let urls = connector("rss:example", transport)
        .discover(seed.to_str().unwrap())
        .unwrap();
    assert_eq!(
        urls,
        vec![
            "https://example.com/a",
            "https://example.com/b",
            "https://example.com/c"
        ]
    );
}

#[test]
fn rss_seed_from_url_uses_transport() {
    let transport = Scripted::new(vec![(200, RSS_FEED)]);
    let urls = connector("rss:example", transport.clone())
        .discover("https://example.com/feed.xml")
        .unwrap();
    assert_eq!(urls.len(), 3);
    assert_eq!(
        transport.urls.lock().unwrap().as_slice(),
        &["https://example.com/feed.xml".to_string()]
    );
}

#[test]
fn rss_seed_http_error_is_fatal() {
    let transport = Scripted::new(vec![(500, "boom")]);
    let result = connector("rss:example", transport).discover("https://example.com/feed.xml");
    assert!(result.is_err());
}

#[test]
fn html_listing_resolves_relative_links() {
    let page = r#"
        <body>
            <a href="/posts/1">one</a>
            <a href="https://other.example/post">two</a>
            <a href="/posts/1">dup</a>
            <a href="mailto:jane@example.com">mail</a>
        </body>
    "#;
    let transport = Scripted::new(vec![(200, page)]);
    let urls = connector("html:author-page", transport)
        .discover("https://example.com/authors/jane")
        .unwrap();
    assert_eq!(
        urls,
        vec![
            "https://example.com/posts/1",
            "https://other.example/post"
        ]
    );
}

#[test]
fn arxiv_query_seed_builds_api_url() {
    let feed = r#"<feed xmlns="http://www.w3.org/2005/Atom">
        <entry>
            <id>https://arxiv.org/abs/2401.00001</id>
            <link rel="alternate" href="https://arxiv.org/abs/2401.00001v2"/>
        </entry>
    </feed>"#;
    let transport = Scripted::new(vec![(200, feed)]);
    let urls = connector("arxiv:search", transport.clone())
        .discover("all:quantum computing")
        .unwrap();
    assert_eq!(urls, vec!["https://arxiv.org/abs/2401.00001v2"]);

    let requested = transport.urls.lock().unwrap();
    assert_eq!(
        requested.as_slice(),
        &["https://export.arxiv.org/api/query?search_query=all%3Aquantum+computing&start=0&max_results=100"
            .to_string()]
    );
}

#[test]
fn unknown_source_prefix_is_rejected() {
    let transport = Scripted::new(vec![]);
    assert!(Connector::for_source_id(
        "ftp:whatever",
        transport,
        "byline/0.1",
        Duration::from_secs(30)
    )
    .is_err());
}
