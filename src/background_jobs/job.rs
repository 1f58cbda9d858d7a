use super::context::JobContext;
use crate::config::{JobSettings, JobsSettings};
use crate::error::TaskError;
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while scheduling or running jobs.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job {0} not found")]
    NotFound(String),

    #[error("Job {0} is already scheduled")]
    AlreadyScheduled(String),

    #[error("Job {0} is already running")]
    AlreadyRunning(String),

    #[error("Invalid period for job {0}: must be greater than 0")]
    InvalidPeriod(String),

    #[error("Task failed: {0}")]
    Task(#[from] TaskError),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Job was cancelled")]
    Cancelled,

    #[error("Scheduler not available")]
    SchedulerUnavailable,
}

/// A named, periodically invoked composition of tasks.
///
/// Every tick runs under the background job system principal carried by the
/// [`JobContext`].
#[async_trait]
pub trait BackgroundJob: Send + Sync {
    /// Unique identifier for this job.
    fn id(&self) -> &'static str;

    /// Human-readable name for this job.
    fn name(&self) -> &'static str;

    /// Description of what this job does.
    fn description(&self) -> &'static str;

    /// This job's entry in the `jobs` config subtree.
    fn settings(&self, jobs: &JobsSettings) -> JobSettings;

    /// Runs one tick.
    ///
    /// Long-running implementations should check `ctx.is_cancelled()` and return
    /// `JobError::Cancelled` early.
    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;
}
