use lettergate_common::StoreError;
use thiserror::Error;
use uuid::Uuid;

use crate::job::JobStatus;

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("job {job_id} already retried {max_retries} times")]
    MaxRetriesExceeded { job_id: Uuid, max_retries: u32 },

    #[error("cannot {action} job {job_id} while it is {from}")]
    InvalidTransition {
        job_id: Uuid,
        from: JobStatus,
        action: &'static str,
    },
}

impl From<serde_json::Error> for JobError {
    fn from(e: serde_json::Error) -> Self {
        JobError::Store(StoreError::Serde(e))
    }
}

pub type JobResult<T> = Result<T, JobError>;
