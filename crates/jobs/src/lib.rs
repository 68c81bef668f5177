//! Asynchronous letter-generation jobs: a FIFO queue in the shared store and
//! a JSON record per job that workers drive to completion.

pub mod error;
pub mod job;
pub mod pipeline;

pub use error::{JobError, JobResult};
pub use job::{JobStatus, JobStatusView, LetterJob, LetterRequest, ResultIds};
pub use pipeline::JobPipeline;
