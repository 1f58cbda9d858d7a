//! Background job scheduling and execution.
//!
//! Jobs run on per-job periodic timers whose periods come from the `jobs` config
//! subtree. Every tick runs under the background job system principal.

mod context;
mod handle;
mod job;
pub mod jobs;
mod scheduler;
mod timer;

pub use context::JobContext;
pub use handle::{JobInfo, JobRunInfo, SchedulerHandle, TickOutcome};
pub use job::{BackgroundJob, JobError};
pub use scheduler::{create_scheduler, JobScheduler};
pub use timer::{ScheduleState, TimerHandle, TimerId};
