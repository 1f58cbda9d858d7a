use super::context::JobContext;
use super::handle::{JobRunInfo, SchedulerCommand, SchedulerHandle, SharedJobState, TickOutcome};
use super::job::{BackgroundJob, JobError};
use super::timer::{ScheduleState, TimerHandle, TimerId, TimerIds};
use crate::config::{next_change, ConfigChange, JobsSettings};
use crate::metrics;
use crate::task::Tasks;
use crate::utils::format_duration;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Runs registered jobs on per-job timers driven by the `jobs` config subtree.
pub struct JobScheduler {
    /// Shared state accessible by SchedulerHandle
    shared_state: Arc<RwLock<SharedJobState>>,

    /// Timer of each registered job (not shared, managed by the scheduler)
    schedules: HashMap<String, ScheduleState>,

    timer_ids: TimerIds,

    /// Ticks started through the handle
    manual_runs: Vec<JoinHandle<()>>,

    /// Receiver for commands from SchedulerHandle
    command_receiver: mpsc::Receiver<SchedulerCommand>,

    config_changes: Option<broadcast::Receiver<ConfigChange<JobsSettings>>>,

    settings: Arc<JobsSettings>,

    /// Token to signal scheduler shutdown. Timers are children of it.
    shutdown_token: CancellationToken,

    job_context: JobContext,
}

impl JobScheduler {
    pub fn new(
        command_receiver: mpsc::Receiver<SchedulerCommand>,
        shutdown_token: CancellationToken,
        job_context: JobContext,
        shared_state: Arc<RwLock<SharedJobState>>,
        settings: Arc<JobsSettings>,
    ) -> Self {
        Self {
            shared_state,
            schedules: HashMap::new(),
            timer_ids: TimerIds::default(),
            manual_runs: Vec::new(),
            command_receiver,
            config_changes: None,
            settings,
            shutdown_token,
            job_context,
        }
    }

    /// Reschedule jobs whenever the `jobs` config subtree changes.
    pub fn with_config_changes(
        mut self,
        receiver: broadcast::Receiver<ConfigChange<JobsSettings>>,
    ) -> Self {
        self.config_changes = Some(receiver);
        self
    }

    /// Register a job with the scheduler. It stays unscheduled until settings are
    /// applied.
    pub async fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        let job_id = job.id().to_string();
        let mut state = self.shared_state.write().await;
        if state.jobs.contains_key(&job_id) {
            warn!("Job {} is already registered, ignoring", job_id);
            return;
        }
        info!("Registering job: {} - {}", job_id, job.description());
        self.schedules
            .insert(job_id.clone(), ScheduleState::Unscheduled);
        state.jobs.insert(job_id, job);
    }

    pub async fn job_count(&self) -> usize {
        self.shared_state.read().await.jobs.len()
    }

    pub fn schedule_state(&self, job_id: &str) -> Option<&ScheduleState> {
        self.schedules.get(job_id)
    }

    /// Starts the timer of `job_id`.
    ///
    /// Fails with `JobError::AlreadyScheduled` if the job already has a live timer;
    /// callers that want a new period cancel first.
    pub async fn schedule(&mut self, job_id: &str, period: Duration) -> Result<TimerId, JobError> {
        let job = {
            let state = self.shared_state.read().await;
            state
                .jobs
                .get(job_id)
                .cloned()
                .ok_or_else(|| JobError::NotFound(job_id.to_string()))?
        };
        let schedule = self
            .schedules
            .get_mut(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        if schedule.is_scheduled() {
            return Err(JobError::AlreadyScheduled(job_id.to_string()));
        }
        if period.is_zero() {
            return Err(JobError::InvalidPeriod(job_id.to_string()));
        }

        let timer_id = self.timer_ids.next();
        let ctx = self.job_context.clone();
        let shared_state = self.shared_state.clone();
        let on_tick = move || {
            let job = job.clone();
            let ctx = ctx.clone();
            let shared_state = shared_state.clone();
            async move {
                if !shared_state.write().await.begin_run(job.id()) {
                    debug!("Job {} is still running, skipping tick", job.id());
                    return;
                }
                run_tick(job, ctx, shared_state, "timer").await;
            }
        };
        let handle = TimerHandle::start(timer_id, period, &self.shutdown_token, on_tick);
        *schedule = ScheduleState::Scheduled(handle);

        self.shared_state
            .write()
            .await
            .scheduled
            .insert(job_id.to_string(), period);
        info!(
            "Scheduled job {} every {} ({})",
            job_id,
            format_duration(period),
            timer_id
        );
        Ok(timer_id)
    }

    /// Cancels the live timer of `job_id`, if any. Returns whether one was live.
    ///
    /// Cancelling an unscheduled or unknown job is a no-op. A tick already in
    /// progress runs to completion.
    pub async fn cancel(&mut self, job_id: &str) -> bool {
        let Some(handle) = self.schedules.get_mut(job_id).and_then(ScheduleState::take) else {
            return false;
        };
        let timer_id = handle.id();
        drop(handle.cancel());
        self.shared_state.write().await.scheduled.remove(job_id);
        info!("Cancelled job {} ({})", job_id, timer_id);
        true
    }

    /// Cancels the timer of `job_id` only if it is still `timer_id`.
    #[cfg(test)]
    pub(crate) async fn cancel_timer(&mut self, job_id: &str, timer_id: TimerId) -> bool {
        let is_current =
            self.schedules.get(job_id).and_then(ScheduleState::timer_id) == Some(timer_id);
        if !is_current {
            debug!("{} of job {} is no longer live", timer_id, job_id);
            return false;
        }
        self.cancel(job_id).await
    }

    /// Re-enters the scheduling decision of every job: any live timer is cancelled,
    /// then enabled jobs are scheduled with their configured period.
    pub async fn apply_settings(&mut self, settings: Arc<JobsSettings>) {
        let jobs: Vec<Arc<dyn BackgroundJob>> = {
            let state = self.shared_state.read().await;
            state.jobs.values().cloned().collect()
        };

        for job in jobs {
            let job_id = job.id();
            self.cancel(job_id).await;

            let job_settings = job.settings(&settings);
            if job_settings.disabled {
                info!("Job {} is disabled", job_id);
                continue;
            }
            let period = Duration::from_millis(job_settings.period_millis);
            if let Err(e) = self.schedule(job_id, period).await {
                error!("Failed to schedule job {}: {}", job_id, e);
            }
        }
        self.settings = settings;
    }

    /// Main scheduler loop.
    pub async fn run(mut self) {
        let job_count = self.job_count().await;
        info!("Starting job scheduler with {} registered jobs", job_count);
        self.apply_settings(self.settings.clone()).await;

        loop {
            self.manual_runs.retain(|handle| !handle.is_finished());

            tokio::select! {
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    self.shutdown().await;
                    break;
                }
                Some(cmd) = self.command_receiver.recv() => {
                    self.handle_command(cmd).await;
                }
                change = next_change(&mut self.config_changes) => {
                    self.handle_config_change(change).await;
                }
            }
        }

        info!("Job scheduler stopped");
    }

    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn handle_config_change(
        &mut self,
        change: Result<ConfigChange<JobsSettings>, broadcast::error::RecvError>,
    ) {
        match change {
            Ok(change) => match change.both() {
                Some((_, current)) => {
                    info!("Jobs configuration changed, rescheduling");
                    self.apply_settings(current.clone()).await;
                }
                None => debug!("Ignoring one-sided jobs configuration change"),
            },
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Scheduler missed {} jobs configuration changes", n);
            }
            Err(broadcast::error::RecvError::Closed) => {
                self.config_changes = None;
            }
        }
    }

    async fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::TriggerJob { job_id, response } => {
                let result = self.trigger_job(&job_id).await;
                let _ = response.send(result);
            }
        }
    }

    /// Manually trigger a job by ID.
    async fn trigger_job(&mut self, job_id: &str) -> Result<(), JobError> {
        let job = {
            let mut state = self.shared_state.write().await;
            let job = state
                .jobs
                .get(job_id)
                .cloned()
                .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
            if !state.begin_run(job_id) {
                return Err(JobError::AlreadyRunning(job_id.to_string()));
            }
            job
        };

        info!("Manually triggering job {}", job_id);
        let handle = tokio::spawn(run_tick(
            job,
            self.job_context.clone(),
            self.shared_state.clone(),
            "manual",
        ));
        self.manual_runs.push(handle);
        Ok(())
    }

    /// Cancels every timer and waits for ticks in progress.
    async fn shutdown(&mut self) {
        info!("Shutting down scheduler...");
        self.job_context.cancellation_token.cancel();

        let mut pending: Vec<(String, JoinHandle<()>)> = Vec::new();
        for (job_id, schedule) in self.schedules.iter_mut() {
            if let Some(handle) = schedule.take() {
                pending.push((job_id.clone(), handle.cancel()));
            }
        }
        pending.extend(
            self.manual_runs
                .drain(..)
                .map(|handle| ("manual".to_string(), handle)),
        );

        for (job_id, handle) in pending {
            if tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, handle)
                .await
                .is_err()
            {
                warn!(
                    "Job {} did not stop within {:?}",
                    job_id, SHUTDOWN_GRACE_PERIOD
                );
            }
        }

        self.shared_state.write().await.scheduled.clear();
        info!("Scheduler shutdown complete");
    }
}

/// Runs one tick of `job`, which must already be marked as running.
///
/// The tick runs in its own task so a panic is contained. Errors are logged and
/// recorded, never propagated.
async fn run_tick(
    job: Arc<dyn BackgroundJob>,
    ctx: JobContext,
    shared_state: Arc<RwLock<SharedJobState>>,
    triggered_by: &'static str,
) {
    let job_id = job.id();
    debug!("Starting job {} (triggered_by: {})", job_id, triggered_by);

    let start_time = Instant::now();
    let result = tokio::spawn(async move { job.execute(&ctx).await }).await;
    let elapsed = start_time.elapsed();

    let (outcome, error_message) = match result {
        Ok(Ok(())) => {
            debug!("Job {} completed in {:?}", job_id, elapsed);
            (TickOutcome::Success, None)
        }
        Ok(Err(JobError::Cancelled)) => {
            info!("Job {} was cancelled after {:?}", job_id, elapsed);
            (TickOutcome::Cancelled, Some("Cancelled".to_string()))
        }
        Ok(Err(JobError::Task(e))) if e.is_unauthorized() => {
            error!(
                "Job {} was denied by the capability table, this is a bug: {}",
                job_id, e
            );
            (TickOutcome::Unauthorized, Some(e.to_string()))
        }
        Ok(Err(e)) => {
            error!("Job {} failed after {:?}: {}", job_id, elapsed, e);
            (TickOutcome::Failed, Some(e.to_string()))
        }
        Err(e) => {
            error!("Job {} panicked after {:?}: {}", job_id, elapsed, e);
            (TickOutcome::Panic, Some(format!("Task panic: {}", e)))
        }
    };

    metrics::record_job_tick(job_id, outcome.as_str(), elapsed);
    shared_state.write().await.finish_run(
        job_id,
        JobRunInfo::new(Utc::now(), elapsed, outcome, error_message, triggered_by),
    );
}

/// Create a scheduler and its handle.
pub fn create_scheduler(
    tasks: Tasks,
    settings: Arc<JobsSettings>,
    shutdown_token: CancellationToken,
) -> (JobScheduler, SchedulerHandle) {
    let (command_tx, command_rx) = mpsc::channel(100);
    let shared_state = Arc::new(RwLock::new(SharedJobState::default()));
    let job_context = JobContext::new(shutdown_token.child_token(), tasks);

    let scheduler = JobScheduler::new(
        command_rx,
        shutdown_token,
        job_context,
        Arc::clone(&shared_state),
        settings,
    );
    let handle = SchedulerHandle::new(command_tx, shared_state);

    (scheduler, handle)
}
