use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifiers of the two generated documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultIds {
    pub motivation: String,
    pub anti_motivation: String,
}

/// What the caller asked to have generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LetterRequest {
    pub session_id: String,
    pub company: String,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
}

/// Stored job record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LetterJob {
    pub job_id: Uuid,
    pub session_id: String,
    pub company: String,
    pub job_title: Option<String>,
    pub theme: Option<String>,
    pub status: JobStatus,
    pub progress: u8,
    pub result_ids: Option<ResultIds>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LetterJob {
    pub fn new(request: &LetterRequest, max_retries: u32) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            session_id: request.session_id.clone(),
            company: request.company.clone(),
            job_title: request.job_title.clone(),
            theme: request.theme.clone(),
            status: JobStatus::Queued,
            progress: 0,
            result_ids: None,
            error: None,
            retry_count: 0,
            max_retries,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

/// Public view of a job, as returned to pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_ids: Option<ResultIds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_seconds_remaining: Option<u64>,
}
