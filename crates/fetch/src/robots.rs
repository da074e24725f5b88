//! Robots.txt evaluation with a per-host TTL cache.
//!
//! Degraded robots responses never hard-fail a run: unreachable or erroring
//! hosts fall back to permissive modes with shorter TTLs, and 5xx/transport
//! errors additionally double the politeness delay for the host.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use models::FetchErrorCode;
use url::Url;

use crate::transport::{Transport, TransportError};

const TTL_PARSED_SECONDS: f64 = 3600.0;
const TTL_NOT_FOUND_SECONDS: f64 = 4.0 * 3600.0;
const TTL_DEGRADED_SECONDS: f64 = 15.0 * 60.0;
const TTL_TIMEOUT_SECONDS: f64 = 3600.0;

/// How a host's robots policy was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotsMode {
    /// HTTP 200: rules parsed and enforced.
    Parsed,
    /// Missing or unusable robots file: everything allowed.
    AllowAll,
    /// 5xx or transport error: allowed, but at half speed.
    AllowWithCaution,
    /// The URL itself had no usable host.
    Invalid,
}

impl RobotsMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RobotsMode::Parsed => "parsed",
            RobotsMode::AllowAll => "allow_all",
            RobotsMode::AllowWithCaution => "allow_with_caution",
            RobotsMode::Invalid => "invalid",
        }
    }
}

/// Decision payload for one URL robots check.
#[derive(Debug, Clone)]
pub struct RobotsDecision {
    pub allowed: bool,
    pub error_code: Option<FetchErrorCode>,
    pub delay_multiplier: f64,
    pub mode: RobotsMode,
    pub warning: Option<String>,
    pub robots_url: String,
    pub status_code: Option<u16>,
    pub cache_hit: bool,
}

struct CacheEntry {
    mode: RobotsMode,
    expires_at: f64,
    delay_multiplier: f64,
    rules: Option<RobotsFile>,
    status_code: Option<u16>,
    warning: Option<String>,
}

/// Evaluate robots policy for URLs with host-level caching.
pub struct RobotsCache {
    user_agent: String,
    timeout: Duration,
    max_redirects: usize,
    transport: std::sync::Arc<dyn Transport>,
    clock: Box<dyn Fn() -> f64 + Send + Sync>,
    // The lock is held across the robots fetch so that two evaluations for
    // the same host within one TTL issue exactly one outbound request.
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl RobotsCache {
    pub fn new(
        user_agent: &str,
        timeout: Duration,
        max_redirects: usize,
        transport: std::sync::Arc<dyn Transport>,
    ) -> Self {
        let origin = Instant::now();
        Self::with_clock(
            user_agent,
            timeout,
            max_redirects,
            transport,
            Box::new(move || origin.elapsed().as_secs_f64()),
        )
    }

    pub fn with_clock(
        user_agent: &str,
        timeout: Duration,
        max_redirects: usize,
        transport: std::sync::Arc<dyn Transport>,
        clock: Box<dyn Fn() -> f64 + Send + Sync>,
    ) -> Self {
        RobotsCache {
            user_agent: user_agent.to_string(),
            timeout,
            max_redirects,
            transport,
            clock,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Drop all cached policies.
    pub fn clear(&self) {
        self.cache
            .lock()
            .expect("robots cache is never poisoned")
            .clear();
    }

    /// Return a full robots decision for observability and rate control.
    pub fn evaluate(&self, url: &str) -> RobotsDecision {
        let parsed = Url::parse(url).ok();
        let host = parsed
            .as_ref()
            .and_then(|parsed| parsed.host_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if host.is_empty() {
            return RobotsDecision {
                allowed: false,
                error_code: Some(FetchErrorCode::BlockedByRobots),
                delay_multiplier: 1.0,
                mode: RobotsMode::Invalid,
                warning: Some("Invalid URL for robots check: missing host".to_string()),
                robots_url: String::new(),
                status_code: None,
                cache_hit: false,
            };
        }

        // parsed is always Some when host is non-empty
        let scheme = parsed
            .as_ref()
            .map(|parsed| parsed.scheme())
            .unwrap_or("https");
        let authority = match parsed.as_ref().and_then(|parsed| parsed.port()) {
            Some(port) => format!("{host}:{port}"),
            None => host.clone(),
        };
        let robots_url = format!("{scheme}://{authority}/robots.txt");
        let path = parsed.as_ref().map(|parsed| parsed.path()).unwrap_or("/");

        let mut cache = self.cache.lock().expect("robots cache is never poisoned");
        let now = (self.clock)();
        let mut cache_hit = true;
        let expired = match cache.get(&authority) {
            Some(entry) => entry.expires_at <= now,
            None => true,
        };
        if expired {
            cache_hit = false;
            let entry = self.fetch_entry(&robots_url, now);
            cache.insert(authority.clone(), entry);
        }
        let entry = &cache[&authority];

        let blocked = match (&entry.mode, &entry.rules) {
            (RobotsMode::Parsed, Some(rules)) => !rules.allowed(&self.user_agent, path),
            _ => false,
        };
        if blocked {
            return RobotsDecision {
                allowed: false,
                error_code: Some(FetchErrorCode::BlockedByRobots),
                delay_multiplier: 1.0,
                mode: entry.mode,
                warning: entry.warning.clone(),
                robots_url,
                status_code: entry.status_code,
                cache_hit,
            };
        }

        RobotsDecision {
            allowed: true,
            error_code: None,
            delay_multiplier: entry.delay_multiplier,
            mode: entry.mode,
            warning: entry.warning.clone(),
            robots_url,
            status_code: entry.status_code,
            cache_hit,
        }
    }

    fn fetch_entry(&self, robots_url: &str, now: f64) -> CacheEntry {
        let mut current = robots_url.to_string();
        for _ in 0..=self.max_redirects {
            let response = match self.transport.get(&current, &self.user_agent, self.timeout) {
                Ok(response) => response,
                Err(TransportError::Timeout) => {
                    return CacheEntry {
                        mode: RobotsMode::AllowAll,
                        expires_at: now + TTL_TIMEOUT_SECONDS,
                        delay_multiplier: 1.0,
                        rules: None,
                        status_code: None,
                        warning: Some(format!("robots.txt timeout for {robots_url}; allowing")),
                    };
                }
                Err(TransportError::Other(_)) => {
                    return CacheEntry {
                        mode: RobotsMode::AllowWithCaution,
                        expires_at: now + TTL_DEGRADED_SECONDS,
                        delay_multiplier: 2.0,
                        rules: None,
                        status_code: None,
                        warning: Some(format!(
                            "robots.txt request error for {robots_url}; allowing with reduced rate"
                        )),
                    };
                }
            };

            if (300..400).contains(&response.status) {
                if let Some(location) = response.header("location") {
                    let next = Url::parse(&current)
                        .ok()
                        .and_then(|base| base.join(location).ok());
                    if let Some(next) = next {
                        current = next.to_string();
                        continue;
                    }
                }
            }

            return self.classify(response, robots_url, now);
        }

        CacheEntry {
            mode: RobotsMode::AllowAll,
            expires_at: now + TTL_TIMEOUT_SECONDS,
            delay_multiplier: 1.0,
            rules: None,
            status_code: None,
            warning: Some(format!("robots.txt redirect loop for {robots_url}; allowing")),
        }
    }

    fn classify(
        &self,
        mut response: crate::transport::TransportResponse,
        robots_url: &str,
        now: f64,
    ) -> CacheEntry {
        match response.status {
            200 => {
                let mut body = String::new();
                if std::io::Read::read_to_string(&mut response.body, &mut body).is_err() {
                    return CacheEntry {
                        mode: RobotsMode::AllowWithCaution,
                        expires_at: now + TTL_DEGRADED_SECONDS,
                        delay_multiplier: 2.0,
                        rules: None,
                        status_code: Some(200),
                        warning: Some(format!(
                            "robots.txt request error for {robots_url}; allowing with reduced rate"
                        )),
                    };
                }
                CacheEntry {
                    mode: RobotsMode::Parsed,
                    expires_at: now + TTL_PARSED_SECONDS,
                    delay_multiplier: 1.0,
                    rules: Some(RobotsFile::parse(&body)),
                    status_code: Some(200),
                    warning: None,
                }
            }
            404 => CacheEntry {
                mode: RobotsMode::AllowAll,
                expires_at: now + TTL_NOT_FOUND_SECONDS,
                delay_multiplier: 1.0,
                rules: None,
                status_code: Some(404),
                warning: Some(format!("robots.txt not found for {robots_url}; allowing")),
            },
            status @ 500..=599 => CacheEntry {
                mode: RobotsMode::AllowWithCaution,
                expires_at: now + TTL_DEGRADED_SECONDS,
                delay_multiplier: 2.0,
                rules: None,
                status_code: Some(status),
                warning: Some(format!(
                    "robots.txt returned {status} for {robots_url}; allowing with reduced rate"
                )),
            },
            status => CacheEntry {
                mode: RobotsMode::AllowAll,
                expires_at: now + TTL_TIMEOUT_SECONDS,
                delay_multiplier: 1.0,
                rules: None,
                status_code: Some(status),
                warning: Some(format!("robots.txt returned {status} for {robots_url}; allowing")),
            },
        }
    }
}

/// Parsed robots.txt rules.
///
/// Groups are matched the conventional way: the first group whose user-agent
/// token is a case-insensitive substring of the configured agent wins,
/// falling back to the `*` group. Within a group, rules apply in file order
/// by path prefix; the first match decides.
struct RobotsFile {
    groups: Vec<RuleGroup>,
}

struct RuleGroup {
    agents: Vec<String>,
    rules: Vec<Rule>,
}

struct Rule {
    allow: bool,
    path: String,
}

impl RobotsFile {
    fn parse(text: &str) -> Self {
        let mut groups: Vec<RuleGroup> = Vec::new();
        let mut open_agents = false;

        for line in text.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if !open_agents || groups.is_empty() {
                        groups.push(RuleGroup {
                            agents: Vec::new(),
                            rules: Vec::new(),
                        });
                        open_agents = true;
                    }
                    if let Some(group) = groups.last_mut() {
                        group.agents.push(value.to_ascii_lowercase());
                    }
                }
                "allow" | "disallow" => {
                    open_agents = false;
                    // Rules before any user-agent line apply to nobody.
                    let Some(group) = groups.last_mut() else {
                        continue;
                    };
                    // An empty Disallow means "allow everything"; it never
                    // matches as a prefix rule, which has the same effect.
                    if value.is_empty() {
                        continue;
                    }
                    group.rules.push(Rule {
                        allow: key == "allow",
                        path: value.to_string(),
                    });
                }
                _ => {
                    open_agents = false;
                }
            }
        }

        RobotsFile { groups }
    }

    fn allowed(&self, user_agent: &str, path: &str) -> bool {
        let agent_token = user_agent
            .split('/')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        let group = self
            .groups
            .iter()
            .find(|group| {
                group
                    .agents
                    .iter()
                    .any(|agent| agent != "*" && agent_token.contains(agent.as_str()))
            })
            .or_else(|| {
                self.groups
                    .iter()
                    .find(|group| group.agents.iter().any(|agent| agent == "*"))
            });

        let Some(group) = group else {
            return true;
        };
        for rule in &group.rules {
            if path.starts_with(&rule.path) {
                return rule.allow;
            }
        }
        true
    }
}

#[cfg(test)]
mod test {
    use super::{RobotsCache, RobotsFile, RobotsMode};
    use crate::testutil::{redirect, response as ok, Scripted};
    use crate::transport::TransportError;
    use models::FetchErrorCode;
    use std::sync::Arc;
    use std::time::Duration;

    fn cache(transport: Arc<Scripted>) -> RobotsCache {
        RobotsCache::new(
            "byline/0.1 (+https://github.com/byline/byline)",
            Duration::from_secs(30),
            5,
            transport,
        )
    }

    #[test]
    fn parsed_rules_block_disallowed_paths() {
        let transport = Scripted::new(vec![ok(200, "User-agent: *\nDisallow: /private\n")]);
        let robots = cache(transport);

        let denied = robots.evaluate("https://example.com/private/post");
        assert!(!denied.allowed);
        assert_eq!(denied.error_code, Some(FetchErrorCode::BlockedByRobots));
        assert_eq!(denied.mode, RobotsMode::Parsed);

        let allowed = robots.evaluate("https://example.com/public/post");
        assert!(allowed.allowed);
        assert!(allowed.cache_hit);
    }

    #[test]
    fn single_fetch_per_ttl() {
        let transport = Scripted::new(vec![ok(404, "")]);
        let robots = cache(transport.clone());

        let first = robots.evaluate("https://example.com/a");
        let second = robots.evaluate("https://example.com/b");
        assert_eq!(transport.call_count(), 1);
        assert!(!first.cache_hit);
        assert!(second.cache_hit);
    }

    #[test]
    fn not_found_allows_all_with_warning() {
        let transport = Scripted::new(vec![ok(404, "")]);
        let robots = cache(transport);
        let decision = robots.evaluate("https://example.com/post");
        assert!(decision.allowed);
        assert_eq!(decision.mode, RobotsMode::AllowAll);
        assert_eq!(decision.status_code, Some(404));
        assert!(decision.warning.as_deref().unwrap().contains("not found"));
        assert_eq!(decision.delay_multiplier, 1.0);
    }

    #[test]
    fn server_errors_slow_down() {
        let transport = Scripted::new(vec![ok(503, "")]);
        let robots = cache(transport);
        let decision = robots.evaluate("https://example.com/post");
        assert!(decision.allowed);
        assert_eq!(decision.mode, RobotsMode::AllowWithCaution);
        assert_eq!(decision.delay_multiplier, 2.0);
    }

    #[test]
    fn transport_errors_slow_down() {
        let transport = Scripted::new(vec![Err(TransportError::Other("refused".to_string()))]);
        let robots = cache(transport);
        let decision = robots.evaluate("https://example.com/post");
        assert!(decision.allowed);
        assert_eq!(decision.mode, RobotsMode::AllowWithCaution);
        assert_eq!(decision.delay_multiplier, 2.0);
    }

    #[test]
    fn timeouts_allow_all() {
        let transport = Scripted::new(vec![Err(TransportError::Timeout)]);
        let robots = cache(transport);
        let decision = robots.evaluate("https://example.com/post");
        assert!(decision.allowed);
        assert_eq!(decision.mode, RobotsMode::AllowAll);
        assert_eq!(decision.delay_multiplier, 1.0);
        assert!(decision.warning.as_deref().unwrap().contains("timeout"));
    }

    #[test]
    fn redirect_loops_allow_all() {
        let responses = (0..6).map(|_| redirect("/robots.txt")).collect();
        let robots = cache(Scripted::new(responses));
        let decision = robots.evaluate("https://example.com/post");
        assert!(decision.allowed);
        assert_eq!(decision.mode, RobotsMode::AllowAll);
        assert!(decision.warning.as_deref().unwrap().contains("redirect loop"));
    }

    #[test]
    fn clear_forces_refetch() {
        let transport = Scripted::new(vec![ok(404, ""), ok(404, "")]);
        let robots = cache(transport.clone());
        robots.evaluate("https://example.com/a");
        robots.clear();
        robots.evaluate("https://example.com/a");
        assert_eq!(transport.call_count(), 2);
    }

    #[test]
    fn missing_host_is_denied() {
        let transport = Scripted::new(vec![]);
        let robots = cache(transport);
        let decision = robots.evaluate("not a url");
        assert!(!decision.allowed);
        assert_eq!(decision.error_code, Some(FetchErrorCode::BlockedByRobots));
        assert_eq!(decision.mode, RobotsMode::Invalid);
    }

    #[test]
    fn specific_agent_group_wins_over_wildcard() {
        let body = "User-agent: byline\nDisallow: /drafts\n\nUser-agent: *\nDisallow: /\n";
        let rules = RobotsFile::parse(body);
        assert!(!rules.allowed("byline/0.1", "/drafts/x"));
        assert!(rules.allowed("byline/0.1", "/posts/x"));
        // Other agents fall through to the wildcard group.
        assert!(!rules.allowed("otherbot/2.0", "/posts/x"));
    }

    #[test]
    fn allow_overrides_when_listed_first() {
        let body = "User-agent: *\nAllow: /private/ok\nDisallow: /private\n";
        let rules = RobotsFile::parse(body);
        assert!(rules.allowed("byline/0.1", "/private/ok/post"));
        assert!(!rules.allowed("byline/0.1", "/private/other"));
    }

    #[test]
    fn empty_disallow_allows_everything() {
        let rules = RobotsFile::parse("User-agent: *\nDisallow:\n");
        assert!(rules.allowed("byline/0.1", "/anything"));
    }
}
