//! URL canonicalization for stable deduplication keys.

use url::form_urlencoded;
use url::Url;

/// Query parameters dropped outright because they carry session state
/// rather than content identity.
const REMOVABLE_QUERY_PARAMS: &[&str] = &["session", "sessionid", "sid", "phpsessid", "jsessionid"];

/// Canonicalize a URL into the dedup-key form.
///
/// Rules (v0):
/// - Non-http(s) inputs (including unparseable ones) pass through unchanged.
/// - Scheme is forced to `https`; host and path are lowercased.
/// - Fragment is removed and default ports are dropped.
/// - `utm_*` and common session-id query parameters are dropped; remaining
///   pairs are sorted by (key, value).
///
/// The function is idempotent: `canonicalize_url(canonicalize_url(u))`
/// equals `canonicalize_url(u)`.
pub fn canonicalize_url(raw: &str) -> String {
    let parsed = match Url::parse(raw.trim()) {
        Ok(parsed) => parsed,
        Err(_) => return raw.to_string(),
    };
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return raw.to_string();
    }

    let host = parsed
        .host_str()
        .unwrap_or_default()
        .to_ascii_lowercase();
    // `Url::port` already hides the scheme default; 443 is additionally
    // dropped because the output scheme is always https.
    let port = parsed.port().filter(|port| *port != 443);

    let path = parsed.path().to_ascii_lowercase();

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| {
            let key = key.to_ascii_lowercase();
            !key.starts_with("utm_") && !REMOVABLE_QUERY_PARAMS.contains(&key.as_str())
        })
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    pairs.sort();

    let mut out = String::from("https://");
    out.push_str(&host);
    if let Some(port) = port {
        out.push(':');
        out.push_str(&port.to_string());
    }
    if path.is_empty() {
        out.push('/');
    } else {
        out.push_str(&path);
    }
    if !pairs.is_empty() {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &pairs {
            serializer.append_pair(key, value);
        }
        out.push('?');
        out.push_str(&serializer.finish());
    }
    out
}
