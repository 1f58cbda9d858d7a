use super::job::{BackgroundJob, JobError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};

/// Information about a registered job.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Timer period while scheduled.
    pub period_millis: Option<u64>,
    pub is_running: bool,
    pub last_run: Option<JobRunInfo>,
}

/// How a tick ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickOutcome {
    Success,
    Failed,
    Unauthorized,
    Cancelled,
    Panic,
}

impl TickOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TickOutcome::Success => "success",
            TickOutcome::Failed => "failed",
            TickOutcome::Unauthorized => "unauthorized",
            TickOutcome::Cancelled => "cancelled",
            TickOutcome::Panic => "panic",
        }
    }
}

/// The most recent finished tick of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobRunInfo {
    pub finished_at: String,
    pub duration_millis: u64,
    pub outcome: TickOutcome,
    pub error_message: Option<String>,
    pub triggered_by: String,
}

impl JobRunInfo {
    pub(super) fn new(
        finished_at: DateTime<Utc>,
        duration: Duration,
        outcome: TickOutcome,
        error_message: Option<String>,
        triggered_by: &str,
    ) -> Self {
        JobRunInfo {
            finished_at: finished_at.to_rfc3339(),
            duration_millis: duration.as_millis() as u64,
            outcome,
            error_message,
            triggered_by: triggered_by.to_string(),
        }
    }
}

/// Command sent to the scheduler.
pub enum SchedulerCommand {
    TriggerJob {
        job_id: String,
        response: oneshot::Sender<Result<(), JobError>>,
    },
}

/// Shared state between scheduler and handle.
#[derive(Default)]
pub struct SharedJobState {
    /// Static job info (set at registration, never changes)
    pub jobs: HashMap<String, Arc<dyn BackgroundJob>>,
    /// Jobs with a tick in progress
    pub running_jobs: HashSet<String>,
    /// Period of each scheduled job
    pub scheduled: HashMap<String, Duration>,
    pub last_runs: HashMap<String, JobRunInfo>,
}

impl SharedJobState {
    /// Marks `job_id` as running. Returns `false` if a tick is already in progress.
    pub(super) fn begin_run(&mut self, job_id: &str) -> bool {
        self.running_jobs.insert(job_id.to_string())
    }

    pub(super) fn finish_run(&mut self, job_id: &str, run: JobRunInfo) {
        self.running_jobs.remove(job_id);
        self.last_runs.insert(job_id.to_string(), run);
    }

    fn info(&self, job_id: &str, job: &Arc<dyn BackgroundJob>) -> JobInfo {
        JobInfo {
            id: job_id.to_string(),
            name: job.name().to_string(),
            description: job.description().to_string(),
            period_millis: self
                .scheduled
                .get(job_id)
                .map(|period| period.as_millis() as u64),
            is_running: self.running_jobs.contains(job_id),
            last_run: self.last_runs.get(job_id).cloned(),
        }
    }
}

/// Handle to interact with a running [`super::JobScheduler`].
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    shared_state: Arc<RwLock<SharedJobState>>,
}

impl SchedulerHandle {
    pub fn new(
        command_tx: mpsc::Sender<SchedulerCommand>,
        shared_state: Arc<RwLock<SharedJobState>>,
    ) -> Self {
        Self {
            command_tx,
            shared_state,
        }
    }

    /// Get information about all registered jobs, sorted by id.
    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        let state = self.shared_state.read().await;
        let mut jobs: Vec<JobInfo> = state
            .jobs
            .iter()
            .map(|(job_id, job)| state.info(job_id, job))
            .collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }

    pub async fn get_job(&self, job_id: &str) -> Option<JobInfo> {
        let state = self.shared_state.read().await;
        state.jobs.get(job_id).map(|job| state.info(job_id, job))
    }

    /// Runs one tick of `job_id` now, whether or not the job is scheduled.
    ///
    /// Returns once the tick has started. Fails with `JobError::AlreadyRunning`
    /// while another tick of the same job is in progress.
    pub async fn trigger_job(&self, job_id: &str) -> Result<(), JobError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(SchedulerCommand::TriggerJob {
                job_id: job_id.to_string(),
                response: response_tx,
            })
            .await
            .map_err(|_| JobError::SchedulerUnavailable)?;

        response_rx
            .await
            .map_err(|_| JobError::SchedulerUnavailable)?
    }

    pub async fn is_job_running(&self, job_id: &str) -> bool {
        self.shared_state.read().await.running_jobs.contains(job_id)
    }

    pub async fn job_exists(&self, job_id: &str) -> bool {
        self.shared_state.read().await.jobs.contains_key(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_run_rejects_overlap() {
        let mut state = SharedJobState::default();
        assert!(state.begin_run("job"));
        assert!(!state.begin_run("job"));

        state.finish_run(
            "job",
            JobRunInfo::new(
                Utc::now(),
                Duration::from_millis(12),
                TickOutcome::Success,
                None,
                "timer",
            ),
        );
        assert!(state.running_jobs.is_empty());
        assert_eq!(state.last_runs["job"].duration_millis, 12);
        assert!(state.begin_run("job"));
    }

    #[test]
    fn run_info_serializes_outcome_in_snake_case() {
        let run = JobRunInfo::new(
            Utc::now(),
            Duration::ZERO,
            TickOutcome::Unauthorized,
            Some("denied".to_string()),
            "manual",
        );
        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["outcome"], "unauthorized");
        assert_eq!(json["triggered_by"], "manual");
        assert!(json["finished_at"].as_str().unwrap().contains('T'));
    }

    #[tokio::test]
    async fn trigger_without_scheduler_is_unavailable() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = SchedulerHandle::new(tx, Arc::new(RwLock::new(SharedJobState::default())));
        assert!(matches!(
            handle.trigger_job("job").await,
            Err(JobError::SchedulerUnavailable)
        ));
        assert!(handle.list_jobs().await.is_empty());
    }
}
