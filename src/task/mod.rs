//! Authorization-gated units of business logic.
//!
//! A task is built fresh for every invocation, consumed by value when it runs, and
//! checks the capability table before touching the store or the delegation channel.

mod context;
mod users;
mod vms;

pub use context::{PrincipalResolver, TaskContext, Tasks};
pub use users::{
    verify_credentials, CreateUserTask, DeleteUserTask, GetAllUsersTask, GetUserTask, NewUser,
    UpdateUserTask, UserUpdate,
};
pub use vms::{provision_vm, BulkUpdateVmsTask, CreateVmTask, GetAllVmsTask, GetVmTask};

use crate::error::TaskError;
use crate::metrics;
use crate::security::{AuthenticatedCaller, Operation, Principal};
use async_trait::async_trait;
use tracing::{debug, warn};

#[async_trait]
pub trait Task: Sized + Send {
    type Output: Send;

    fn operation(&self) -> Operation;

    /// Authorizes `principal` and runs the task's logic.
    async fn execute(self, principal: &Principal) -> Result<Self::Output, TaskError>;

    /// Entry point for callers vouched for by the transport layer. The caller is
    /// resolved against the user repository first, and fails with
    /// `TaskError::NotFound` if the account no longer exists.
    async fn submit(
        self,
        caller: &AuthenticatedCaller,
        resolver: &PrincipalResolver,
    ) -> Result<Self::Output, TaskError> {
        let principal = resolver.resolve(caller).await?;
        self.submit_trusted(&principal).await
    }

    /// Entry point for internal callers holding an already resolved principal.
    ///
    /// This is a security boundary: identity resolution is skipped, so the
    /// principal is trusted as given. Only pass a [`SystemPrincipal`] or a
    /// principal returned by [`PrincipalResolver::resolve`]. Never build one from
    /// an id or role taken from untrusted input; route such callers through
    /// [`Task::submit`] instead.
    ///
    /// [`SystemPrincipal`]: crate::security::SystemPrincipal
    async fn submit_trusted(self, principal: &Principal) -> Result<Self::Output, TaskError> {
        let operation = self.operation();
        let result = self.execute(principal).await;
        match &result {
            Ok(_) => {
                debug!("{} by {} succeeded", operation, principal.id());
                metrics::record_task_execution(operation.as_str(), "ok");
            }
            Err(e) => {
                if e.is_unauthorized() {
                    warn!("{}", e);
                } else {
                    debug!("{} by {} failed: {}", operation, principal.id(), e);
                }
                metrics::record_task_execution(operation.as_str(), e.kind());
            }
        }
        result
    }
}
