//! The safe HTTP fetcher.
//!
//! Fetching never raises: every outcome is a `(Option<FetchedDoc>, FetchLog)`
//! pair where failures carry a typed error code. Safety order per URL:
//! scheme check, DNS resolution against the blocked CIDR set, robots
//! evaluation, politeness slot, manual redirect following (each hop
//! revalidated), then a streamed body read under the content-type byte cap.

use std::io;
use std::net::{IpAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Instant;

use models::{Compliance, FetchErrorCode, FetchLog, FetchedDoc};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use url::Url;

use crate::politeness::PolitenessGate;
use crate::robots::RobotsCache;
use crate::transport::{HttpTransport, Transport, TransportError, TransportResponse};

/// Sink for robots side-channel events: `(event_type, run_id, payload)`.
pub type EventHook = Box<dyn Fn(&str, &str, Value) + Send + Sync>;

type ResolverFn = Box<dyn Fn(&str) -> Vec<IpAddr> + Send + Sync>;

const BODY_CHUNK_BYTES: usize = 8192;

fn resolve_host(host: &str) -> Vec<IpAddr> {
    (host, 80u16)
        .to_socket_addrs()
        .map(|addrs| addrs.map(|addr| addr.ip()).collect())
        .unwrap_or_default()
}

pub struct Fetcher {
    config: Compliance,
    transport: Arc<dyn Transport>,
    robots: Option<RobotsCache>,
    politeness: Option<PolitenessGate>,
    resolver: ResolverFn,
    event_hook: Option<EventHook>,
    log_fetches: bool,
}

impl Fetcher {
    /// Fetcher with a real HTTP transport, robots cache, and politeness gate
    /// derived from `config`.
    pub fn new(config: Compliance) -> Result<Self, TransportError> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);
        Ok(Self::with_transport(config, transport))
    }

    /// Fetcher over an injected transport. Robots and politeness still come
    /// from `config`; tests typically replace them next.
    pub fn with_transport(config: Compliance, transport: Arc<dyn Transport>) -> Self {
        let robots = RobotsCache::new(
            &config.user_agent,
            config.fetch_timeout,
            config.max_redirects,
            transport.clone(),
        );
        let politeness = PolitenessGate::new(
            config.per_domain_delay_seconds,
            config.max_global_concurrency,
        );
        Fetcher {
            config,
            transport,
            robots: Some(robots),
            politeness: Some(politeness),
            resolver: Box::new(resolve_host),
            event_hook: None,
            log_fetches: true,
        }
    }

    pub fn set_robots(&mut self, robots: Option<RobotsCache>) {
        self.robots = robots;
    }

    pub fn set_politeness(&mut self, politeness: Option<PolitenessGate>) {
        self.politeness = politeness;
    }

    pub fn set_resolver(
        &mut self,
        resolver: impl Fn(&str) -> Vec<IpAddr> + Send + Sync + 'static,
    ) {
        self.resolver = Box::new(resolver);
    }

    pub fn set_event_hook(&mut self, hook: impl Fn(&str, &str, Value) + Send + Sync + 'static) {
        self.event_hook = Some(Box::new(hook));
    }

    pub fn set_log_fetches(&mut self, enabled: bool) {
        self.log_fetches = enabled;
    }

    /// Fetch one URL under compliance and safety constraints.
    pub fn fetch(&self, url: &str, run_id: &str) -> (Option<FetchedDoc>, FetchLog) {
        let started = Instant::now();
        let (doc, log) = match self.fetch_inner(url, run_id, &started) {
            Ok((doc, log)) => (Some(doc), log),
            Err(code) => (
                None,
                FetchLog::failure(url, code, elapsed_ms(&started), run_id),
            ),
        };
        tracing::debug!(
            url,
            status = ?log.status_code,
            error_code = ?log.error_code,
            latency_ms = log.latency_ms,
            "fetch finished"
        );
        if self.log_fetches {
            ops::emit_fetch_log(&log);
        }
        (doc, log)
    }

    fn fetch_inner(
        &self,
        url: &str,
        run_id: &str,
        started: &Instant,
    ) -> Result<(FetchedDoc, FetchLog), FetchErrorCode> {
        let parsed = Url::parse(url).map_err(|_| FetchErrorCode::SecurityBlocked)?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(FetchErrorCode::SecurityBlocked);
        }
        let host = parsed.host_str().unwrap_or_default().to_string();
        if host.is_empty() {
            return Err(FetchErrorCode::SecurityBlocked);
        }
        if self.any_blocked(&host) {
            return Err(FetchErrorCode::SecurityBlocked);
        }

        let mut delay_multiplier = 1.0;
        if let Some(robots) = &self.robots {
            let decision = robots.evaluate(url);
            delay_multiplier = decision.delay_multiplier;

            if let Some(warning) = &decision.warning {
                self.emit(
                    "robots_warning",
                    run_id,
                    json!({
                        "url": url,
                        "robots_url": decision.robots_url,
                        "robots_mode": decision.mode.as_str(),
                        "robots_status_code": decision.status_code,
                        "delay_multiplier": decision.delay_multiplier,
                        "cache_hit": decision.cache_hit,
                        "message": warning,
                    }),
                );
            }
            if decision.delay_multiplier > 1.0 {
                self.emit(
                    "robots_slowdown",
                    run_id,
                    json!({
                        "url": url,
                        "host": host,
                        "robots_mode": decision.mode.as_str(),
                        "delay_multiplier": decision.delay_multiplier,
                    }),
                );
            }
            if !decision.allowed {
                return Err(FetchErrorCode::BlockedByRobots);
            }
        }

        let (response, final_url) = {
            let _slot = self
                .politeness
                .as_ref()
                .map(|gate| gate.acquire(&host, delay_multiplier));
            self.follow_redirects(url)?
        };

        let TransportResponse {
            status,
            headers,
            body,
        } = response;

        if status == 304 {
            let latency_ms = elapsed_ms(started);
            let doc = FetchedDoc {
                status_code: 304,
                final_url,
                headers,
                body_bytes: None,
                body_sha256: None,
                latency_ms,
            };
            let log = FetchLog::success(url, 304, latency_ms, 0, run_id);
            return Ok((doc, log));
        }

        let limit = self
            .config
            .body_limit_for(headers.get("content-type").map(String::as_str));
        let (body_bytes, body_sha256) = read_body_with_limit(body, limit)?;
        let latency_ms = elapsed_ms(started);
        let bytes_received = body_bytes.len() as u64;
        let doc = FetchedDoc {
            status_code: status,
            final_url,
            headers,
            body_bytes: Some(body_bytes),
            body_sha256,
            latency_ms,
        };
        let log = FetchLog::success(url, status, latency_ms, bytes_received, run_id);
        Ok((doc, log))
    }

    /// Follow up to `max_redirects` manual hops, revalidating scheme and
    /// resolved IPs at each one.
    fn follow_redirects(
        &self,
        url: &str,
    ) -> Result<(TransportResponse, String), FetchErrorCode> {
        let max_redirects = self.config.max_redirects;
        let mut current = url.to_string();

        for hop in 0..=max_redirects {
            let response = self
                .transport
                .get(&current, &self.config.user_agent, self.config.fetch_timeout)
                .map_err(|err| match err {
                    TransportError::Timeout => FetchErrorCode::Timeout,
                    TransportError::Other(_) => FetchErrorCode::FetchError,
                })?;

            let location = if (300..400).contains(&response.status) {
                response.header("location").map(str::to_string)
            } else {
                None
            };
            let Some(location) = location else {
                return Ok((response, current));
            };

            if hop >= max_redirects {
                return Err(FetchErrorCode::RedirectLimit);
            }
            let next = Url::parse(&current)
                .ok()
                .and_then(|base| base.join(&location).ok())
                .ok_or(FetchErrorCode::RedirectLimit)?;
            if next.scheme() != "http" && next.scheme() != "https" {
                return Err(FetchErrorCode::RedirectLimit);
            }
            let next_host = next.host_str().unwrap_or_default().to_string();
            if next_host.is_empty() || self.any_blocked(&next_host) {
                return Err(FetchErrorCode::RedirectLimit);
            }
            current = next.to_string();
        }

        Err(FetchErrorCode::RedirectLimit)
    }

    fn any_blocked(&self, host: &str) -> bool {
        (self.resolver)(host)
            .iter()
            .any(|addr| self.config.is_blocked_ip(*addr))
    }

    fn emit(&self, event_type: &str, run_id: &str, payload: Value) {
        match &self.event_hook {
            Some(hook) => hook(event_type, run_id, payload),
            None => {
                ops::emit_event(event_type, Some(run_id), payload);
            }
        }
    }
}

fn elapsed_ms(started: &Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Stream the body in bounded chunks, hashing on the fly. A cap of zero
/// refuses the content type outright.
fn read_body_with_limit(
    mut reader: Box<dyn io::Read + Send>,
    limit: u64,
) -> Result<(Vec<u8>, Option<String>), FetchErrorCode> {
    if limit == 0 {
        return Err(FetchErrorCode::BodyTooLarge);
    }

    let mut body = Vec::new();
    let mut hasher = Sha256::new();
    let mut chunk = [0u8; BODY_CHUNK_BYTES];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => {
                if (body.len() + read) as u64 > limit {
                    return Err(FetchErrorCode::BodyTooLarge);
                }
                hasher.update(&chunk[..read]);
                body.extend_from_slice(&chunk[..read]);
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == io::ErrorKind::TimedOut => {
                return Err(FetchErrorCode::Timeout)
            }
            Err(_) => return Err(FetchErrorCode::FetchError),
        }
    }

    let body_sha256 = if body.is_empty() {
        None
    } else {
        Some(hex::encode(hasher.finalize()))
    };
    Ok((body, body_sha256))
}

#[cfg(test)]
mod test {
    use super::Fetcher;
    use crate::politeness::PolitenessGate;
    use crate::robots::RobotsCache;
    use crate::testutil::{redirect, response, response_with_headers, Scripted};
    use models::{Compliance, FetchErrorCode};
    use std::net::IpAddr;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn public_ip() -> IpAddr {
        "93.184.216.34".parse().unwrap()
    }

    /// Fetcher wired for tests: no robots, zero-delay politeness, public DNS.
    fn fetcher(transport: Arc<Scripted>) -> Fetcher {
        let mut fetcher = Fetcher::with_transport(Compliance::default(), transport);
        fetcher.set_robots(None);
        fetcher.set_politeness(Some(PolitenessGate::new(0.0, 1)));
        fetcher.set_resolver(|_| vec![public_ip()]);
        fetcher.set_log_fetches(false);
        fetcher
    }

    #[test]
    fn success_populates_doc_and_log() {
        let transport = Scripted::new(vec![response_with_headers(
            200,
            &[("content-type", "text/html")],
            b"<html>content</html>",
        )]);
        let subject = fetcher(transport);

        let (doc, log) = subject.fetch("https://example.com/a", "run-1");
        let doc = doc.unwrap();
        assert_eq!(doc.status_code, 200);
        assert_eq!(doc.final_url, "https://example.com/a");
        assert_eq!(doc.body_bytes.as_deref(), Some(b"<html>content</html>".as_ref()));
        assert!(doc.body_sha256.is_some());
        assert_eq!(log.status_code, Some(200));
        assert_eq!(log.bytes_received, Some(20));
        assert_eq!(log.error_code, None);
        assert_eq!(log.run_id, "run-1");
    }

    #[test]
    fn disallowed_scheme_is_security_blocked() {
        let transport = Scripted::new(vec![]);
        let subject = fetcher(transport.clone());
        let (doc, log) = subject.fetch("ftp://example.com/a", "run-1");
        assert!(doc.is_none());
        assert_eq!(log.error_code, Some(FetchErrorCode::SecurityBlocked));
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn blocked_ip_is_security_blocked_before_any_request() {
        let transport = Scripted::new(vec![]);
        let mut subject = fetcher(transport.clone());
        subject.set_resolver(|_| vec!["127.0.0.1".parse().unwrap()]);
        let (doc, log) = subject.fetch("https://internal.example/a", "run-1");
        assert!(doc.is_none());
        assert_eq!(log.error_code, Some(FetchErrorCode::SecurityBlocked));
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn metadata_endpoint_is_blocked() {
        let transport = Scripted::new(vec![]);
        let mut subject = fetcher(transport);
        subject.set_resolver(|_| vec!["169.254.169.254".parse().unwrap()]);
        let (_, log) = subject.fetch("https://metadata.example/latest", "run-1");
        assert_eq!(log.error_code, Some(FetchErrorCode::SecurityBlocked));
    }

    #[test]
    fn five_redirects_succeed() {
        let transport = Scripted::new(vec![
            redirect("https://example.com/1"),
            redirect("https://example.com/2"),
            redirect("https://example.com/3"),
            redirect("https://example.com/4"),
            redirect("https://example.com/5"),
            response_with_headers(200, &[("content-type", "text/html")], b"done"),
        ]);
        let subject = fetcher(transport.clone());
        let (doc, log) = subject.fetch("https://example.com/0", "run-1");
        let doc = doc.unwrap();
        assert_eq!(doc.status_code, 200);
        assert_eq!(doc.final_url, "https://example.com/5");
        assert_eq!(log.error_code, None);
        assert_eq!(transport.call_count(), 6);
    }

    #[test]
    fn six_redirects_hit_the_limit() {
        let transport = Scripted::new(vec![
            redirect("https://example.com/1"),
            redirect("https://example.com/2"),
            redirect("https://example.com/3"),
            redirect("https://example.com/4"),
            redirect("https://example.com/5"),
            redirect("https://example.com/6"),
        ]);
        let subject = fetcher(transport.clone());
        let (doc, log) = subject.fetch("https://example.com/0", "run-1");
        assert!(doc.is_none());
        assert_eq!(log.error_code, Some(FetchErrorCode::RedirectLimit));
        assert_eq!(transport.call_count(), 6);
    }

    #[test]
    fn redirect_to_blocked_ip_is_refused() {
        let transport = Scripted::new(vec![redirect("https://internal.example/secret")]);
        let mut subject = fetcher(transport);
        subject.set_resolver(|host| {
            if host == "internal.example" {
                vec!["10.0.0.5".parse().unwrap()]
            } else {
                vec![public_ip()]
            }
        });
        let (doc, log) = subject.fetch("https://example.com/a", "run-1");
        assert!(doc.is_none());
        assert_eq!(log.error_code, Some(FetchErrorCode::RedirectLimit));
    }

    #[test]
    fn redirect_to_disallowed_scheme_is_refused() {
        let transport = Scripted::new(vec![redirect("ftp://example.com/a")]);
        let subject = fetcher(transport);
        let (_, log) = subject.fetch("https://example.com/a", "run-1");
        assert_eq!(log.error_code, Some(FetchErrorCode::RedirectLimit));
    }

    #[test]
    fn oversized_body_is_refused() {
        let mut config = Compliance::default();
        config
            .max_body_bytes_by_type
            .insert("text/html".to_string(), 8);
        let transport = Scripted::new(vec![response_with_headers(
            200,
            &[("content-type", "text/html")],
            b"0123456789",
        )]);
        let mut subject = Fetcher::with_transport(config, transport);
        subject.set_robots(None);
        subject.set_politeness(Some(PolitenessGate::new(0.0, 1)));
        subject.set_resolver(|_| vec![public_ip()]);
        subject.set_log_fetches(false);
        let (doc, log) = subject.fetch("https://example.com/a", "run-1");
        assert!(doc.is_none());
        assert_eq!(log.error_code, Some(FetchErrorCode::BodyTooLarge));
    }

    #[test]
    fn pdf_content_type_is_refused() {
        let transport = Scripted::new(vec![response_with_headers(
            200,
            &[("content-type", "application/pdf")],
            b"%PDF-1.7",
        )]);
        let subject = fetcher(transport);
        let (doc, log) = subject.fetch("https://example.com/paper", "run-1");
        assert!(doc.is_none());
        assert_eq!(log.error_code, Some(FetchErrorCode::BodyTooLarge));
    }

    #[test]
    fn not_modified_keeps_body_null() {
        let transport = Scripted::new(vec![response(304, "")]);
        let subject = fetcher(transport);
        let (doc, log) = subject.fetch("https://example.com/a", "run-1");
        let doc = doc.unwrap();
        assert_eq!(doc.status_code, 304);
        assert!(doc.body_bytes.is_none());
        assert!(doc.body_sha256.is_none());
        assert_eq!(log.bytes_received, Some(0));
    }

    #[test]
    fn robots_disallow_blocks_without_touching_content_transport() {
        let content_transport = Scripted::new(vec![]);
        let robots_transport = Scripted::new(vec![response(
            200,
            "User-agent: *\nDisallow: /private\n",
        )]);
        let mut subject = fetcher(content_transport.clone());
        subject.set_robots(Some(RobotsCache::new(
            "byline/0.1",
            Duration::from_secs(30),
            5,
            robots_transport,
        )));

        let (doc, log) = subject.fetch("https://example.com/private/post", "run-1");
        assert!(doc.is_none());
        assert_eq!(log.error_code, Some(FetchErrorCode::BlockedByRobots));
        assert_eq!(content_transport.call_count(), 0);
    }

    #[test]
    fn degraded_robots_emits_slowdown_event() {
        let content_transport = Scripted::new(vec![response_with_headers(
            200,
            &[("content-type", "text/html")],
            b"ok",
        )]);
        let robots_transport = Scripted::new(vec![response(503, "")]);
        let events: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();

        let mut subject = fetcher(content_transport);
        subject.set_robots(Some(RobotsCache::new(
            "byline/0.1",
            Duration::from_secs(30),
            5,
            robots_transport,
        )));
        subject.set_event_hook(move |event_type, run_id, _payload| {
            sink.lock()
                .unwrap()
                .push((event_type.to_string(), run_id.to_string()));
        });

        let (doc, _) = subject.fetch("https://example.com/a", "run-9");
        assert!(doc.is_some());
        let seen = events.lock().unwrap();
        let types: Vec<&str> = seen.iter().map(|(ty, _)| ty.as_str()).collect();
        assert!(types.contains(&"robots_warning"));
        assert!(types.contains(&"robots_slowdown"));
        assert!(seen.iter().all(|(_, run_id)| run_id == "run-9"));
    }
}
