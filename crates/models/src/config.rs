//! Frozen compliance configuration.
//!
//! Everything defaults to safe-and-slow. The value is constructed once at
//! startup and validated; the process must refuse to run with a configuration
//! that weakens a compliance boundary.

use std::collections::BTreeMap;
use std::time::Duration;

use ipnetwork::IpNetwork;
use lazy_static::lazy_static;

/// IP ranges that must never be fetched (SSRF prevention), IPv4 and IPv6.
const BLOCKED_IP_RANGES: &[&str] = &[
    "127.0.0.0/8",        // loopback
    "10.0.0.0/8",         // private
    "172.16.0.0/12",      // private
    "192.168.0.0/16",     // private
    "169.254.0.0/16",     // link-local
    "169.254.169.254/32", // cloud metadata endpoint
    "224.0.0.0/4",        // multicast
    "255.255.255.255/32", // broadcast
    "0.0.0.0/8",          // this network
    "::1/128",            // loopback
    "fe80::/10",          // link-local
    "fc00::/7",           // unique local
    "ff00::/8",           // multicast
];

lazy_static! {
    static ref BLOCKED_NETWORKS: Vec<IpNetwork> = BLOCKED_IP_RANGES
        .iter()
        .map(|cidr| cidr.parse().expect("builtin CIDR must parse"))
        .collect();
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("max_global_concurrency must be >= 1")]
    ConcurrencyTooLow,
    #[error("per_domain_delay must be >= 0")]
    NegativeDelay,
    #[error("robots_check_required must be true")]
    RobotsNotRequired,
    #[error("store_full_body must be false")]
    FullBodyStorage,
    #[error("auto_merge_enabled must be false")]
    AutoMerge,
    #[error("snippet_max_chars must be > 0")]
    SnippetBound,
    #[error("evidence_snippet_max_chars must be > 0")]
    EvidenceSnippetBound,
    #[error("max_body_bytes_default must be > 0")]
    DefaultBodyCap,
}

/// Immutable compliance settings, validated at startup.
#[derive(Debug, Clone)]
pub struct Compliance {
    /// Max concurrent fetches across all domains. v0 default is serial.
    pub max_global_concurrency: usize,
    /// Minimum seconds between requests to the same host.
    pub per_domain_delay_seconds: f64,
    /// Robots.txt must be consulted; cannot be disabled.
    pub robots_check_required: bool,
    /// Maximum redirect hops per fetch.
    pub max_redirects: usize,
    /// Socket connect+read timeout for fetches and robots lookups.
    pub fetch_timeout: Duration,
    /// Max body bytes per content-type prefix. A cap of 0 refuses the type.
    pub max_body_bytes_by_type: BTreeMap<String, u64>,
    /// Fallback cap for content-types not listed above.
    pub max_body_bytes_default: u64,
    /// Descriptive User-Agent sent on every outbound request.
    pub user_agent: String,
    /// Maximum article snippet length in characters.
    pub snippet_max_chars: usize,
    /// Maximum evidence extracted_text length in characters.
    pub evidence_snippet_max_chars: usize,
    /// Full article bodies are never persisted. Hard boundary.
    pub store_full_body: bool,
    /// All merges go through manual review in v0.
    pub auto_merge_enabled: bool,
    /// Safety valve on URLs discovered per run.
    pub max_urls_per_run: usize,
}

impl Default for Compliance {
    fn default() -> Self {
        let mut caps = BTreeMap::new();
        for (content_type, cap) in [
            ("text/html", 5_000_000u64),
            ("application/xml", 5_000_000),
            ("text/xml", 5_000_000),
            ("application/atom+xml", 5_000_000),
            ("application/rss+xml", 5_000_000),
            ("application/json", 2_000_000),
            ("text/plain", 2_000_000),
            ("application/pdf", 0),
            ("application/x-pdf", 0),
        ] {
            caps.insert(content_type.to_string(), cap);
        }
        Compliance {
            max_global_concurrency: 1,
            per_domain_delay_seconds: 5.0,
            robots_check_required: true,
            max_redirects: 5,
            fetch_timeout: Duration::from_secs(30),
            max_body_bytes_by_type: caps,
            max_body_bytes_default: 500_000,
            user_agent: "byline/0.1 (+https://github.com/byline/byline)".to_string(),
            snippet_max_chars: 1500,
            evidence_snippet_max_chars: 800,
            store_full_body: false,
            auto_merge_enabled: false,
            max_urls_per_run: 10_000,
        }
    }
}

impl Compliance {
    /// Validate startup invariants. A failing configuration must abort the
    /// process before any network or storage activity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_global_concurrency < 1 {
            return Err(ConfigError::ConcurrencyTooLow);
        }
        if self.per_domain_delay_seconds < 0.0 {
            return Err(ConfigError::NegativeDelay);
        }
        if !self.robots_check_required {
            return Err(ConfigError::RobotsNotRequired);
        }
        if self.store_full_body {
            return Err(ConfigError::FullBodyStorage);
        }
        if self.auto_merge_enabled {
            return Err(ConfigError::AutoMerge);
        }
        if self.snippet_max_chars == 0 {
            return Err(ConfigError::SnippetBound);
        }
        if self.evidence_snippet_max_chars == 0 {
            return Err(ConfigError::EvidenceSnippetBound);
        }
        if self.max_body_bytes_default == 0 {
            return Err(ConfigError::DefaultBodyCap);
        }
        Ok(())
    }

    /// Byte cap for a response `Content-Type` header value.
    pub fn body_limit_for(&self, content_type: Option<&str>) -> u64 {
        let Some(content_type) = content_type else {
            return self.max_body_bytes_default;
        };
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        self.max_body_bytes_by_type
            .get(&essence)
            .copied()
            .unwrap_or(self.max_body_bytes_default)
    }

    /// The networks `blocked_ip` tests against.
    pub fn blocked_networks(&self) -> &'static [IpNetwork] {
        &BLOCKED_NETWORKS
    }

    /// True when `addr` falls inside any blocked range.
    pub fn is_blocked_ip(&self, addr: std::net::IpAddr) -> bool {
        self.blocked_networks()
            .iter()
            .any(|network| network.contains(addr))
    }
}

#[cfg(test)]
mod test {
    use super::Compliance;

    #[test]
    fn default_config_validates() {
        Compliance::default().validate().unwrap();
    }

    #[test]
    fn compliance_boundaries_are_enforced() {
        let mut config = Compliance::default();
        config.store_full_body = true;
        assert!(config.validate().is_err());

        let mut config = Compliance::default();
        config.auto_merge_enabled = true;
        assert!(config.validate().is_err());

        let mut config = Compliance::default();
        config.robots_check_required = false;
        assert!(config.validate().is_err());

        let mut config = Compliance::default();
        config.max_global_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Compliance::default();
        config.per_domain_delay_seconds = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn body_limits_follow_content_type() {
        let config = Compliance::default();
        assert_eq!(config.body_limit_for(Some("text/html; charset=utf-8")), 5_000_000);
        assert_eq!(config.body_limit_for(Some("application/pdf")), 0);
        assert_eq!(config.body_limit_for(Some("image/png")), 500_000);
        assert_eq!(config.body_limit_for(None), 500_000);
    }

    #[test]
    fn blocked_ranges_cover_ssrf_surfaces() {
        let config = Compliance::default();
        for addr in [
            "127.0.0.1",
            "10.1.2.3",
            "172.16.9.1",
            "192.168.1.1",
            "169.254.169.254",
            "::1",
            "fe80::1",
            "fd00::1",
        ] {
            let parsed: std::net::IpAddr = addr.parse().unwrap();
            assert!(config.is_blocked_ip(parsed), "{addr} should be blocked");
        }
        let public: std::net::IpAddr = "93.184.216.34".parse().unwrap();
        assert!(!config.is_blocked_ip(public));
    }
}
