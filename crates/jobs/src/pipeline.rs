use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lettergate_common::{JobsConfig, KeySpace};
use lettergate_store::SharedStore;
use uuid::Uuid;

use crate::error::{JobError, JobResult};
use crate::job::{JobStatus, JobStatusView, LetterJob, LetterRequest, ResultIds};

/// Highest progress a worker may report before completing the job.
const MAX_IN_FLIGHT_PROGRESS: u8 = 99;

/// Durable FIFO queue of letter jobs plus their per-job state machine.
///
/// `queued -> processing -> completed`, `processing -> failed`, and
/// `failed -> queued` while retries remain. Records expire a fixed time
/// after creation; writes never extend that.
#[derive(Clone)]
pub struct JobPipeline {
    store: Arc<dyn SharedStore>,
    keys: KeySpace,
    config: JobsConfig,
}

impl JobPipeline {
    pub fn new(store: Arc<dyn SharedStore>, keys: KeySpace, config: JobsConfig) -> Self {
        Self {
            store,
            keys,
            config,
        }
    }

    fn queue_key(&self) -> String {
        self.keys.queue(&self.config.queue)
    }

    /// Time left until `job` reaches its fixed expiry.
    fn remaining_ttl(&self, job: &LetterJob) -> Duration {
        let expires_at = job.created_at + chrono::Duration::seconds(self.config.ttl_secs as i64);
        let left = (expires_at - Utc::now()).num_milliseconds().max(1_000);
        Duration::from_millis(left as u64)
    }

    async fn save(&self, job: &LetterJob) -> JobResult<()> {
        let body = serde_json::to_string(job)?;
        self.store
            .set(
                &self.keys.letter_job(&job.job_id.to_string()),
                &body,
                Some(self.remaining_ttl(job)),
            )
            .await?;
        Ok(())
    }

    pub async fn get(&self, job_id: Uuid) -> JobResult<Option<LetterJob>> {
        match self.store.get(&self.keys.letter_job(&job_id.to_string())).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn load(&self, job_id: Uuid) -> JobResult<LetterJob> {
        self.get(job_id).await?.ok_or(JobError::NotFound(job_id))
    }

    /// Store a new queued job and append it to the queue.
    pub async fn enqueue(&self, request: &LetterRequest) -> JobResult<Uuid> {
        let job = LetterJob::new(request, self.config.max_retries);
        self.save(&job).await?;
        let depth = self
            .store
            .push_back(&self.queue_key(), &job.job_id.to_string())
            .await?;

        tracing::info!(
            job_id = %job.job_id,
            session = %job.session_id,
            company = %job.company,
            queue_depth = depth,
            "letter job queued"
        );
        Ok(job.job_id)
    }

    /// Pop the next job id, waiting up to the configured timeout.
    ///
    /// Malformed queue entries are dropped.
    pub async fn dequeue(&self) -> JobResult<Option<Uuid>> {
        let timeout = Duration::from_secs(self.config.dequeue_timeout_secs);
        loop {
            let Some(raw) = self.store.pop_front(&self.queue_key(), timeout).await? else {
                return Ok(None);
            };
            match raw.parse::<Uuid>() {
                Ok(job_id) => return Ok(Some(job_id)),
                Err(e) => tracing::warn!(entry = %raw, error = %e, "dropping malformed queue entry"),
            }
        }
    }

    /// Dequeue the next live job and mark it `processing`.
    ///
    /// Ids whose record has expired, or that are no longer `queued`, are
    /// skipped.
    pub async fn claim(&self) -> JobResult<Option<LetterJob>> {
        while let Some(job_id) = self.dequeue().await? {
            let Some(mut job) = self.get(job_id).await? else {
                tracing::debug!(%job_id, "skipping expired job");
                continue;
            };
            if job.status != JobStatus::Queued {
                tracing::debug!(%job_id, status = %job.status, "skipping job that is not queued");
                continue;
            }

            job.status = JobStatus::Processing;
            job.updated_at = Utc::now();
            self.save(&job).await?;
            tracing::info!(%job_id, retry_count = job.retry_count, "letter job claimed");
            return Ok(Some(job));
        }
        Ok(None)
    }

    /// Record worker progress. Progress is held below 100 until `complete`.
    ///
    /// The only status a worker may report here is `processing`; going back
    /// to `queued` is reserved for `retry`, which also re-appends the job.
    pub async fn update_progress(
        &self,
        job_id: Uuid,
        status: JobStatus,
        progress: u8,
    ) -> JobResult<LetterJob> {
        let mut job = self.load(job_id).await?;
        if job.status.is_terminal() || status != JobStatus::Processing {
            return Err(JobError::InvalidTransition {
                job_id,
                from: job.status,
                action: "update progress of",
            });
        }

        job.status = status;
        job.progress = progress.min(MAX_IN_FLIGHT_PROGRESS);
        job.updated_at = Utc::now();
        self.save(&job).await?;
        tracing::debug!(%job_id, status = %job.status, progress = job.progress, "letter job progress");
        Ok(job)
    }

    pub async fn complete(
        &self,
        job_id: Uuid,
        motivation: String,
        anti_motivation: String,
    ) -> JobResult<LetterJob> {
        let mut job = self.load(job_id).await?;
        if job.status.is_terminal() {
            return Err(JobError::InvalidTransition {
                job_id,
                from: job.status,
                action: "complete",
            });
        }

        job.status = JobStatus::Completed;
        job.progress = 100;
        job.result_ids = Some(ResultIds {
            motivation,
            anti_motivation,
        });
        job.error = None;
        job.updated_at = Utc::now();
        self.save(&job).await?;
        tracing::info!(%job_id, "letter job completed");
        Ok(job)
    }

    pub async fn fail(&self, job_id: Uuid, message: &str) -> JobResult<LetterJob> {
        let mut job = self.load(job_id).await?;
        if job.status.is_terminal() {
            return Err(JobError::InvalidTransition {
                job_id,
                from: job.status,
                action: "fail",
            });
        }

        let message = message.trim();
        job.status = JobStatus::Failed;
        job.error = Some(if message.is_empty() {
            "unknown error".to_string()
        } else {
            message.to_string()
        });
        job.updated_at = Utc::now();
        self.save(&job).await?;
        tracing::warn!(%job_id, error = job.error.as_deref().unwrap_or_default(), "letter job failed");
        Ok(job)
    }

    /// Put a failed job back on the queue while retries remain.
    pub async fn retry(&self, job_id: Uuid) -> JobResult<LetterJob> {
        let mut job = self.load(job_id).await?;
        if job.status != JobStatus::Failed {
            return Err(JobError::InvalidTransition {
                job_id,
                from: job.status,
                action: "retry",
            });
        }
        if !job.can_retry() {
            return Err(JobError::MaxRetriesExceeded {
                job_id,
                max_retries: job.max_retries,
            });
        }

        let failed = job.clone();
        job.retry_count += 1;
        job.status = JobStatus::Queued;
        job.progress = 0;
        job.error = None;
        job.updated_at = Utc::now();
        self.save(&job).await?;

        // A queued record with no queue entry would never be claimed again.
        if let Err(e) = self
            .store
            .push_back(&self.queue_key(), &job_id.to_string())
            .await
        {
            if let Err(restore) = self.save(&failed).await {
                tracing::error!(%job_id, error = %restore, "failed to restore job after requeue error");
            }
            return Err(e.into());
        }

        tracing::info!(%job_id, retry_count = job.retry_count, "letter job requeued");
        Ok(job)
    }

    /// Linear estimate of the seconds left at `progress` percent.
    pub fn estimate_remaining(&self, progress: u8) -> u64 {
        if progress >= 100 {
            return 0;
        }
        let left = u64::from(100 - progress);
        (self.config.estimated_duration_secs * left).div_ceil(100)
    }

    pub fn view(&self, job: &LetterJob) -> JobStatusView {
        let estimated_seconds_remaining = match job.status {
            JobStatus::Queued | JobStatus::Processing => Some(self.estimate_remaining(job.progress)),
            JobStatus::Completed | JobStatus::Failed => None,
        };
        JobStatusView {
            job_id: job.job_id,
            status: job.status,
            progress: job.progress,
            result_ids: job.result_ids.clone(),
            error: job.error.clone(),
            estimated_seconds_remaining,
        }
    }

    pub async fn status(&self, job_id: Uuid) -> JobResult<JobStatusView> {
        let job = self.load(job_id).await?;
        Ok(self.view(&job))
    }

    pub async fn queue_depth(&self) -> JobResult<u64> {
        Ok(self.store.list_len(&self.queue_key()).await?)
    }
}
