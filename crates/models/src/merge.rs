use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit record for one manual author merge. Insertion is idempotent by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeDecision {
    pub id: String,
    pub from_author_id: String,
    pub to_author_id: String,
    pub evidence_ids: Vec<String>,
    /// Canonical JSON describing why the merge was accepted.
    pub decision_criteria: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub run_id: String,
    pub reverted_at: Option<DateTime<Utc>>,
    pub reverted_by: Option<String>,
    pub reverted_reason: Option<String>,
}

impl MergeDecision {
    pub fn new(
        id: &str,
        from_author_id: &str,
        to_author_id: &str,
        evidence_ids: Vec<String>,
        decision_criteria: String,
        created_by: &str,
        run_id: &str,
    ) -> Self {
        MergeDecision {
            id: id.to_string(),
            from_author_id: from_author_id.to_string(),
            to_author_id: to_author_id.to_string(),
            evidence_ids,
            decision_criteria,
            created_at: Utc::now(),
            created_by: created_by.to_string(),
            run_id: run_id.to_string(),
            reverted_at: None,
            reverted_by: None,
            reverted_reason: None,
        }
    }
}
