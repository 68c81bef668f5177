use std::time::Duration;

use thiserror::Error;

/// Failures talking to the shared store.
///
/// Every variant is retryable from the caller's point of view. Rate limiters
/// treat them as "allow and log"; the job pipeline and access gate surface
/// them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation `{op}` timed out after {timeout:?}")]
    Timeout { op: &'static str, timeout: Duration },

    #[error("unexpected value at key {key}: {message}")]
    Corrupt { key: String, message: String },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
