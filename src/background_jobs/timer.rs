//! Per-job periodic timers.
//!
//! A job owns at most one [`TimerHandle`]. Handles carry a [`TimerId`] unique within
//! the scheduler that created them, so a cancel request can only ever reach the
//! timer it was issued for.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Hands out increasing timer ids.
#[derive(Debug, Default)]
pub(super) struct TimerIds {
    next: u64,
}

impl TimerIds {
    pub(super) fn next(&mut self) -> TimerId {
        self.next += 1;
        TimerId(self.next)
    }
}

/// A live periodic timer.
#[derive(Debug)]
pub struct TimerHandle {
    id: TimerId,
    period: Duration,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Starts a timer that calls `on_tick` every `period`, first after one full
    /// period. A tick is awaited before the next one can fire; firings missed while
    /// it runs are skipped.
    pub(super) fn start<F, Fut>(
        id: TimerId,
        period: Duration,
        parent: &CancellationToken,
        mut on_tick: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = parent.child_token();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let started = Instant::now();
                        on_tick().await;
                        let elapsed = started.elapsed();
                        if elapsed > period {
                            debug!("{} overran its {:?} period ({:?})", id, period, elapsed);
                        }
                    }
                }
            }
            debug!("{} stopped", id);
        });
        TimerHandle {
            id,
            period,
            cancel,
            task,
        }
    }

    pub fn id(&self) -> TimerId {
        self.id
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Stops the timer. A tick already in progress runs to completion.
    pub(super) fn cancel(self) -> JoinHandle<()> {
        self.cancel.cancel();
        self.task
    }
}

/// Schedule state of one job.
#[derive(Debug, Default)]
pub enum ScheduleState {
    #[default]
    Unscheduled,
    Scheduled(TimerHandle),
}

impl ScheduleState {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, ScheduleState::Scheduled(_))
    }

    pub fn timer_id(&self) -> Option<TimerId> {
        match self {
            ScheduleState::Scheduled(handle) => Some(handle.id()),
            ScheduleState::Unscheduled => None,
        }
    }

    pub fn period(&self) -> Option<Duration> {
        match self {
            ScheduleState::Scheduled(handle) => Some(handle.period()),
            ScheduleState::Unscheduled => None,
        }
    }

    /// Moves to `Unscheduled`, returning the handle that was live.
    pub(super) fn take(&mut self) -> Option<TimerHandle> {
        match std::mem::take(self) {
            ScheduleState::Scheduled(handle) => Some(handle),
            ScheduleState::Unscheduled => None,
        }
    }
}
