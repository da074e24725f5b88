use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Typed outcome for one failed fetch attempt. Fetching never raises; every
/// failure mode maps onto one of these codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchErrorCode {
    SecurityBlocked,
    BlockedByRobots,
    Timeout,
    FetchError,
    RedirectLimit,
    BodyTooLarge,
}

impl FetchErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchErrorCode::SecurityBlocked => "SECURITY_BLOCKED",
            FetchErrorCode::BlockedByRobots => "BLOCKED_BY_ROBOTS",
            FetchErrorCode::Timeout => "TIMEOUT",
            FetchErrorCode::FetchError => "FETCH_ERROR",
            FetchErrorCode::RedirectLimit => "REDIRECT_LIMIT",
            FetchErrorCode::BodyTooLarge => "BODY_TOO_LARGE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "SECURITY_BLOCKED" => Some(FetchErrorCode::SecurityBlocked),
            "BLOCKED_BY_ROBOTS" => Some(FetchErrorCode::BlockedByRobots),
            "TIMEOUT" => Some(FetchErrorCode::Timeout),
            "FETCH_ERROR" => Some(FetchErrorCode::FetchError),
            "REDIRECT_LIMIT" => Some(FetchErrorCode::RedirectLimit),
            "BODY_TOO_LARGE" => Some(FetchErrorCode::BodyTooLarge),
            _ => None,
        }
    }
}

/// One successfully fetched document. `body_bytes` and `body_sha256` are None
/// for 304 responses.
#[derive(Debug, Clone)]
pub struct FetchedDoc {
    pub status_code: u16,
    pub final_url: String,
    /// Response headers with lowercased names.
    pub headers: BTreeMap<String, String>,
    pub body_bytes: Option<Vec<u8>>,
    pub body_sha256: Option<String>,
    pub latency_ms: u64,
}

impl FetchedDoc {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// One row per fetch attempt, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchLog {
    pub id: String,
    pub url: String,
    pub status_code: Option<u16>,
    pub latency_ms: u64,
    pub bytes_received: Option<u64>,
    pub error_code: Option<FetchErrorCode>,
    pub created_at: DateTime<Utc>,
    pub run_id: String,
}

impl FetchLog {
    pub fn success(
        url: &str,
        status_code: u16,
        latency_ms: u64,
        bytes_received: u64,
        run_id: &str,
    ) -> Self {
        FetchLog {
            id: Uuid::new_v4().to_string(),
            url: url.to_string(),
            status_code: Some(status_code),
            latency_ms,
            bytes_received: Some(bytes_received),
            error_code: None,
            created_at: Utc::now(),
            run_id: run_id.to_string(),
        }
    }

    pub fn failure(url: &str, error_code: FetchErrorCode, latency_ms: u64, run_id: &str) -> Self {
        FetchLog {
            id: Uuid::new_v4().to_string(),
            url: url.to_string(),
            status_code: None,
            latency_ms,
            bytes_received: None,
            error_code: Some(error_code),
            created_at: Utc::now(),
            run_id: run_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
            RunStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "RUNNING" => Some(RunStatus::Running),
            "COMPLETED" => Some(RunStatus::Completed),
            "FAILED" => Some(RunStatus::Failed),
            "CANCELLED" => Some(RunStatus::Cancelled),
            _ => None,
        }
    }
}

/// Run-level bookkeeping for one pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLog {
    pub id: String,
    pub source_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub error_message: Option<String>,
    pub fetched_count: u64,
    pub new_articles_count: u64,
    pub updated_articles_count: u64,
    pub error_count: u64,
}

impl RunLog {
    pub fn new(id: &str, source_id: &str) -> Self {
        RunLog {
            id: id.to_string(),
            source_id: source_id.to_string(),
            started_at: Utc::now(),
            ended_at: None,
            status: RunStatus::Running,
            error_message: None,
            fetched_count: 0,
            new_articles_count: 0,
            updated_articles_count: 0,
            error_count: 0,
        }
    }
}
