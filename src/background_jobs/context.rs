use crate::security::{Principal, SystemPrincipal};
use crate::task::Tasks;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    /// Builds the tasks a tick runs.
    pub tasks: Tasks,

    /// Always the background job system principal.
    pub principal: Principal,
}

impl JobContext {
    pub fn new(cancellation_token: CancellationToken, tasks: Tasks) -> Self {
        Self {
            cancellation_token,
            tasks,
            principal: Principal::from(SystemPrincipal::BackgroundJob),
        }
    }

    /// A copy whose token is cancelled together with this one, or on its own.
    pub fn child(&self) -> Self {
        Self {
            cancellation_token: self.cancellation_token.child_token(),
            tasks: self.tasks.clone(),
            principal: self.principal.clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
