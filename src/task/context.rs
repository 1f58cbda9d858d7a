use super::users::{
    CreateUserTask, DeleteUserTask, GetAllUsersTask, GetUserTask, NewUser, UpdateUserTask,
    UserUpdate,
};
use super::vms::{BulkUpdateVmsTask, CreateVmTask, GetAllVmsTask, GetVmTask};
use crate::delegation::DelegationClient;
use crate::error::TaskError;
use crate::security::{AuthenticatedCaller, CredentialHasher, Principal};
use crate::store::{UserRepository, VmProvider, VmRecord, VmRepository};
use std::sync::Arc;

/// Collaborators shared by every task.
#[derive(Clone)]
pub struct TaskContext {
    pub users: Arc<UserRepository>,
    pub vms: Arc<VmRepository>,
    pub delegation: DelegationClient,
    pub hasher: CredentialHasher,
}

/// Turns an authenticated caller into a principal by looking the account up.
#[derive(Clone)]
pub struct PrincipalResolver {
    users: Arc<UserRepository>,
}

impl PrincipalResolver {
    pub fn new(users: Arc<UserRepository>) -> Self {
        PrincipalResolver { users }
    }

    pub async fn resolve(&self, caller: &AuthenticatedCaller) -> Result<Principal, TaskError> {
        let user = self.users.get(caller.account_id()).await?;
        Ok(Principal::from_user(&user))
    }
}

/// Builds tasks from a shared [`TaskContext`].
#[derive(Clone)]
pub struct Tasks {
    ctx: TaskContext,
}

impl Tasks {
    pub fn new(ctx: TaskContext) -> Self {
        Tasks { ctx }
    }

    pub fn context(&self) -> &TaskContext {
        &self.ctx
    }

    pub fn resolver(&self) -> PrincipalResolver {
        PrincipalResolver::new(self.ctx.users.clone())
    }

    pub fn create_user(&self, user: NewUser) -> CreateUserTask {
        CreateUserTask::new(self.ctx.clone(), user)
    }

    pub fn get_user(&self, user_id: impl Into<String>) -> GetUserTask {
        GetUserTask::new(self.ctx.clone(), user_id.into())
    }

    pub fn get_all_users(&self) -> GetAllUsersTask {
        GetAllUsersTask::new(self.ctx.clone())
    }

    pub fn update_user(&self, update: UserUpdate) -> UpdateUserTask {
        UpdateUserTask::new(self.ctx.clone(), update)
    }

    pub fn delete_user(&self, user_id: impl Into<String>) -> DeleteUserTask {
        DeleteUserTask::new(self.ctx.clone(), user_id.into())
    }

    pub fn create_vm(&self, provider: VmProvider) -> CreateVmTask {
        CreateVmTask::new(self.ctx.clone(), provider)
    }

    pub fn get_vm(&self, vm_id: impl Into<String>) -> GetVmTask {
        GetVmTask::new(self.ctx.clone(), vm_id.into())
    }

    pub fn get_all_vms(&self) -> GetAllVmsTask {
        GetAllVmsTask::new(self.ctx.clone())
    }

    pub fn bulk_update_vms(&self, vms: Vec<VmRecord>) -> BulkUpdateVmsTask {
        BulkUpdateVmsTask::new(self.ctx.clone(), vms)
    }
}
