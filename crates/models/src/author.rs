use serde::{Deserialize, Serialize};

/// One per-source author group derived from stored articles, used by the
/// offline resolver to generate merge candidates. The `id` is deterministic
/// for its `(source_id, normalized name, domain)` triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorProfile {
    pub id: String,
    pub canonical_name: String,
    pub source_id: String,
    pub domains: Vec<String>,
    pub accounts: Vec<String>,
    pub profile_urls: Vec<String>,
}
