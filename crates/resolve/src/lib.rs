//! Rule-based candidate scoring for manual author-merge review.
//!
//! The scorer is offline and deterministic: profiles are sorted by id, every
//! unordered pair is scored with cumulative rules capped at 1.0, and
//! candidates get namespaced-UUID ids so replays produce identical queues.

use std::collections::BTreeSet;

use itertools::Itertools;
use models::AuthorProfile;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// Pairs at or above this score become review candidates.
const CANDIDATE_SCORE_FLOOR: f64 = 0.5;
/// Maximum normalized name distance for the similar-name rule.
const SIMILAR_NAME_MAX_DISTANCE: f64 = 0.15;

/// One author profile prepared for pairwise scoring.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewAuthor {
    pub id: String,
    pub canonical_name: String,
    pub source_id: String,
    pub domains: Vec<String>,
    pub accounts: Vec<String>,
    pub profile_urls: Vec<String>,
}

impl ReviewAuthor {
    pub fn from_profile(profile: &AuthorProfile) -> Self {
        let unique_lower = |values: &[String]| -> Vec<String> {
            values
                .iter()
                .map(|value| value.trim().to_lowercase())
                .filter(|value| !value.is_empty())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        };
        ReviewAuthor {
            id: profile.id.clone(),
            canonical_name: profile.canonical_name.clone(),
            source_id: profile.source_id.clone(),
            domains: unique_lower(&profile.domains),
            accounts: unique_lower(&profile.accounts),
            profile_urls: profile
                .profile_urls
                .iter()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        }
    }

    fn normalized_name(&self) -> String {
        self.canonical_name
            .trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Hosts that appear in explicit profile URLs.
    fn profile_hosts(&self) -> BTreeSet<String> {
        self.profile_urls
            .iter()
            .filter_map(|profile_url| {
                url::Url::parse(profile_url)
                    .ok()
                    .and_then(|parsed| parsed.host_str().map(str::to_lowercase))
            })
            .collect()
    }
}

/// One human-review merge candidate.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub id: String,
    pub from_author: ReviewAuthor,
    pub to_author: ReviewAuthor,
    pub score: f64,
    pub scoring_breakdown: Vec<(String, f64)>,
    pub evidence: Vec<String>,
}

impl Candidate {
    /// Bucketized confidence label.
    pub fn confidence(&self) -> &'static str {
        if self.score >= 0.75 {
            "HIGH"
        } else if self.score >= 0.5 {
            "MEDIUM"
        } else {
            "LOW"
        }
    }

    /// Serialize into the review-queue JSON shape, `decision` unset.
    pub fn to_queue_json(&self) -> Value {
        let breakdown: serde_json::Map<String, Value> = self
            .scoring_breakdown
            .iter()
            .map(|(rule, weight)| (rule.clone(), json!(weight)))
            .collect();
        json!({
            "id": self.id,
            "from_author": self.from_author,
            "to_author": self.to_author,
            "score": (self.score * 10_000.0).round() / 10_000.0,
            "confidence": self.confidence(),
            "scoring_breakdown": Value::Object(breakdown),
            "evidence": self.evidence,
            "decision": Value::Null,
        })
    }
}

/// Normalized Levenshtein distance with a max-length denominator.
pub fn name_distance(left: &str, right: &str) -> f64 {
    let normalize = |value: &str| {
        value
            .trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    };
    let left = normalize(left);
    let right = normalize(right);
    if left.is_empty() && right.is_empty() {
        return 0.0;
    }
    1.0 - strsim::normalized_levenshtein(&left, &right)
}

/// Score one author pair with the cumulative v0 rules.
pub fn score_candidate_pair(left: &ReviewAuthor, right: &ReviewAuthor) -> Option<Candidate> {
    if left.id == right.id {
        return None;
    }

    let mut breakdown: Vec<(String, f64)> = Vec::new();
    let mut evidence: Vec<String> = Vec::new();
    let mut score: f64 = 0.0;

    let left_accounts: BTreeSet<&str> = left.accounts.iter().map(String::as_str).collect();
    let right_accounts: BTreeSet<&str> = right.accounts.iter().map(String::as_str).collect();
    let shared_accounts: Vec<&str> = left_accounts.intersection(&right_accounts).copied().collect();

    let left_domains: BTreeSet<&str> = left.domains.iter().map(String::as_str).collect();
    let right_domains: BTreeSet<&str> = right.domains.iter().map(String::as_str).collect();
    let shared_domains: Vec<&str> = left_domains.intersection(&right_domains).copied().collect();

    // Rule 1: exact account match (strongest signal).
    if !shared_accounts.is_empty() {
        breakdown.push(("rule_1_exact_account_match".to_string(), 1.0));
        evidence.push(format!("exact account match: {}", shared_accounts.join(", ")));
        score += 1.0;
    }

    // Rule 2: shared host and both have explicit profile links on it.
    let left_profile_hosts = left.profile_hosts();
    let right_profile_hosts = right.profile_hosts();
    let profile_hosts: Vec<&str> = shared_domains
        .iter()
        .copied()
        .filter(|host| {
            left_profile_hosts.contains(*host) && right_profile_hosts.contains(*host)
        })
        .collect();
    if !profile_hosts.is_empty() {
        breakdown.push(("rule_2_same_domain_profile_link".to_string(), 0.9));
        evidence.push(format!(
            "profile links on shared domain: {}",
            profile_hosts.join(", ")
        ));
        score += 0.9;
    }

    let left_name = left.normalized_name();
    let right_name = right.normalized_name();

    // Rule 3: identical normalized names on a shared host.
    let mut rule_3_fired = false;
    if !shared_domains.is_empty() && !left_name.is_empty() && left_name == right_name {
        breakdown.push(("rule_3_exact_name_same_domain".to_string(), 0.8));
        evidence.push(format!(
            "exact name match on shared domain: {}",
            shared_domains.join(", ")
        ));
        score += 0.8;
        rule_3_fired = true;
    }

    // Rule 4: similar names on a shared host, only when rule 3 did not fire.
    let mut rule_4_fired = false;
    if !shared_domains.is_empty()
        && !left_name.is_empty()
        && !right_name.is_empty()
        && left_name != right_name
    {
        let distance = name_distance(&left_name, &right_name);
        if distance <= SIMILAR_NAME_MAX_DISTANCE {
            breakdown.push(("rule_4_similar_name_same_domain".to_string(), 0.6));
            evidence.push(format!(
                "similar names on shared domain ({distance:.3}): {}",
                shared_domains.join(", ")
            ));
            score += 0.6;
            rule_4_fired = true;
        }
    }

    // Rule 5: shared host only, when no name-based rule fired.
    if !shared_domains.is_empty() && !rule_3_fired && !rule_4_fired {
        breakdown.push(("rule_5_same_domain_only".to_string(), 0.3));
        evidence.push(format!(
            "shared publishing domain: {}",
            shared_domains.join(", ")
        ));
        score += 0.3;
    }

    score = score.min(1.0);
    if score < CANDIDATE_SCORE_FLOOR {
        return None;
    }

    let candidate_id = Uuid::new_v5(
        &Uuid::NAMESPACE_URL,
        format!("candidate|{}|{}", left.id, right.id).as_bytes(),
    )
    .to_string();

    Some(Candidate {
        id: candidate_id,
        from_author: left.clone(),
        to_author: right.clone(),
        score,
        scoring_breakdown: breakdown,
        evidence,
    })
}

/// Build scored candidates sorted by `(-score, id)`.
pub fn build_candidates(profiles: &[AuthorProfile], min_score: f64) -> Vec<Candidate> {
    let mut authors: Vec<ReviewAuthor> =
        profiles.iter().map(ReviewAuthor::from_profile).collect();
    authors.sort_by(|left, right| left.id.cmp(&right.id));

    let mut candidates: Vec<Candidate> = authors
        .iter()
        .tuple_combinations()
        .filter_map(|(left, right)| score_candidate_pair(left, right))
        .filter(|candidate| candidate.score >= min_score)
        .collect();

    candidates.sort_by(|left, right| {
        right
            .score
            .partial_cmp(&left.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| left.id.cmp(&right.id))
    });
    candidates
}
