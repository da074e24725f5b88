//! Seed loading: local file paths or HTTP(S) URLs, fetched with the same
//! user-agent and timeout as article fetches.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fetch::{Transport, TransportError};
use url::form_urlencoded;
use url::Url;

use crate::{ConnectorError, Result};

const SEED_REDIRECT_LIMIT: usize = 5;

pub struct SeedLoader {
    transport: Arc<dyn Transport>,
    user_agent: String,
    timeout: Duration,
}

impl SeedLoader {
    pub fn new(transport: Arc<dyn Transport>, user_agent: &str, timeout: Duration) -> Self {
        SeedLoader {
            transport,
            user_agent: user_agent.to_string(),
            timeout,
        }
    }

    /// Load seed content from a file path or HTTP(S) URL.
    pub fn load(&self, seed: &str) -> Result<String> {
        Ok(self.load_with_base(seed)?.0)
    }

    /// Like `load`, additionally returning the base URL for resolving
    /// relative links (None for file seeds).
    pub fn load_with_base(&self, seed: &str) -> Result<(String, Option<String>)> {
        if Path::new(seed).exists() {
            let content = std::fs::read_to_string(seed)
                .map_err(|err| ConnectorError::SeedFile(err.to_string()))?;
            return Ok((content, None));
        }

        if !crate::is_http_url(seed) {
            return Err(ConnectorError::UnsupportedSeed(seed.to_string()));
        }
        Ok((self.get(seed)?, Some(seed.to_string())))
    }

    /// arXiv seed loading: files and URLs as usual; anything else is treated
    /// as a raw search query against the official export API.
    pub fn load_arxiv(&self, seed: &str) -> Result<String> {
        if Path::new(seed).exists() {
            return std::fs::read_to_string(seed)
                .map_err(|err| ConnectorError::SeedFile(err.to_string()));
        }
        if crate::is_http_url(seed) {
            return self.get(seed);
        }

        let query = seed.trim();
        if query.is_empty() {
            return Err(ConnectorError::UnsupportedSeed(seed.to_string()));
        }
        let encoded: String = form_urlencoded::byte_serialize(query.as_bytes()).collect();
        let api_url = format!(
            "https://export.arxiv.org/api/query?search_query={encoded}&start=0&max_results=100"
        );
        self.get(&api_url)
    }

    fn get(&self, url: &str) -> Result<String> {
        let mut current = url.to_string();
        for _ in 0..=SEED_REDIRECT_LIMIT {
            let mut response = self
                .transport
                .get(&current, &self.user_agent, self.timeout)
                .map_err(|err| match err {
                    TransportError::Timeout => {
                        ConnectorError::SeedTransport("request timed out".to_string())
                    }
                    TransportError::Other(message) => ConnectorError::SeedTransport(message),
                })?;

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

            if response.status >= 400 {
                return Err(ConnectorError::SeedStatus {
                    status: response.status,
                    url: current,
                });
            }

            let mut body = String::new();
            std::io::Read::read_to_string(&mut response.body, &mut body)
                .map_err(|err| ConnectorError::SeedTransport(err.to_string()))?;
            tracing::debug!(url = %current, bytes = body.len(), "seed loaded");
            return Ok(body);
        }

        Err(ConnectorError::SeedTransport(format!(
            "too many redirects loading {url}"
        )))
    }
}
