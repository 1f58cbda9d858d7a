use super::{Task, TaskContext};
use crate::error::TaskError;
use crate::security::{authorize, AuthenticatedCaller, Operation, Ownership, Principal, Role};
use crate::store::{next_user_id, UserRecord};
use async_trait::async_trait;
use tracing::info;

/// Input of [`CreateUserTask`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

pub struct CreateUserTask {
    ctx: TaskContext,
    user: NewUser,
    ensure_unique: bool,
}

impl CreateUserTask {
    pub(super) fn new(ctx: TaskContext, user: NewUser) -> Self {
        CreateUserTask {
            ctx,
            user,
            ensure_unique: true,
        }
    }

    /// When false, creating a user whose username is taken returns the existing
    /// account instead of failing.
    pub fn ensure_unique(mut self, ensure_unique: bool) -> Self {
        self.ensure_unique = ensure_unique;
        self
    }
}

#[async_trait]
impl Task for CreateUserTask {
    type Output = UserRecord;

    fn operation(&self) -> Operation {
        Operation::CreateUser
    }

    async fn execute(self, principal: &Principal) -> Result<UserRecord, TaskError> {
        authorize(principal, Operation::CreateUser, Ownership::NoTarget)?;

        let NewUser {
            username,
            password,
            first_name,
            last_name,
            role,
        } = self.user;
        if username.trim().is_empty() {
            return Err(TaskError::Validation("username must not be empty".to_string()));
        }
        if password.is_empty() {
            return Err(TaskError::Validation("password must not be empty".to_string()));
        }

        let hasher = self.ctx.hasher;
        let (salt, hashed_password) = tokio::task::spawn_blocking(move || {
            let salt = hasher.generate_b64_salt();
            hasher.hash(&password, &salt).map(|hash| (salt, hash))
        })
        .await
        .map_err(|e| TaskError::Internal(e.into()))?
        .map_err(TaskError::Internal)?;

        let record = UserRecord {
            id: next_user_id(),
            username,
            first_name,
            last_name,
            hashed_password,
            salt,
            role,
        };
        let stored = self.ctx.users.add(record, self.ensure_unique).await?;
        info!("User {} ({}) ready", stored.username, stored.id);
        Ok(stored)
    }
}

pub struct GetUserTask {
    ctx: TaskContext,
    user_id: String,
}

impl GetUserTask {
    pub(super) fn new(ctx: TaskContext, user_id: String) -> Self {
        GetUserTask { ctx, user_id }
    }
}

#[async_trait]
impl Task for GetUserTask {
    type Output = UserRecord;

    fn operation(&self) -> Operation {
        Operation::GetUser
    }

    async fn execute(self, principal: &Principal) -> Result<UserRecord, TaskError> {
        authorize(
            principal,
            Operation::GetUser,
            Ownership::of(principal, &self.user_id),
        )?;
        Ok(self.ctx.users.get(&self.user_id).await?)
    }
}

pub struct GetAllUsersTask {
    ctx: TaskContext,
}

impl GetAllUsersTask {
    pub(super) fn new(ctx: TaskContext) -> Self {
        GetAllUsersTask { ctx }
    }
}

#[async_trait]
impl Task for GetAllUsersTask {
    type Output = Vec<UserRecord>;

    fn operation(&self) -> Operation {
        Operation::GetAllUsers
    }

    async fn execute(self, principal: &Principal) -> Result<Vec<UserRecord>, TaskError> {
        authorize(principal, Operation::GetAllUsers, Ownership::NoTarget)?;
        Ok(self.ctx.users.get_all().await?)
    }
}

/// Input of [`UpdateUserTask`]. Empty names keep the stored value.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
}

pub struct UpdateUserTask {
    ctx: TaskContext,
    update: UserUpdate,
}

impl UpdateUserTask {
    pub(super) fn new(ctx: TaskContext, update: UserUpdate) -> Self {
        UpdateUserTask { ctx, update }
    }
}

#[async_trait]
impl Task for UpdateUserTask {
    type Output = UserRecord;

    fn operation(&self) -> Operation {
        Operation::UpdateUser
    }

    async fn execute(self, principal: &Principal) -> Result<UserRecord, TaskError> {
        let UserUpdate {
            user_id,
            first_name,
            last_name,
        } = self.update;
        authorize(
            principal,
            Operation::UpdateUser,
            Ownership::of(principal, &user_id),
        )?;

        let current = self.ctx.users.get(&user_id).await?;
        let updated = UserRecord {
            first_name: if first_name.is_empty() {
                current.first_name.clone()
            } else {
                first_name
            },
            last_name: if last_name.is_empty() {
                current.last_name.clone()
            } else {
                last_name
            },
            ..current
        };
        Ok(self.ctx.users.put(updated).await?)
    }
}

pub struct DeleteUserTask {
    ctx: TaskContext,
    user_id: String,
}

impl DeleteUserTask {
    pub(super) fn new(ctx: TaskContext, user_id: String) -> Self {
        DeleteUserTask { ctx, user_id }
    }
}

#[async_trait]
impl Task for DeleteUserTask {
    type Output = ();

    fn operation(&self) -> Operation {
        Operation::DeleteUser
    }

    async fn execute(self, principal: &Principal) -> Result<(), TaskError> {
        authorize(
            principal,
            Operation::DeleteUser,
            Ownership::of(principal, &self.user_id),
        )?;
        self.ctx.users.delete(&self.user_id).await?;
        info!("User {} deleted by {}", self.user_id, principal.id());
        Ok(())
    }
}

/// Checks a username and password against the stored credentials and returns the
/// caller identity to submit tasks with.
pub async fn verify_credentials(
    ctx: &TaskContext,
    username: &str,
    password: &str,
) -> Result<AuthenticatedCaller, TaskError> {
    let user = ctx
        .users
        .get_all()
        .await?
        .into_iter()
        .find(|user| user.username == username)
        .ok_or_else(|| TaskError::NotFound {
            kind: "user",
            id: username.to_string(),
        })?;

    let hasher = ctx.hasher;
    let password = password.to_string();
    let hashed_password = user.hashed_password.clone();
    let matches = tokio::task::spawn_blocking(move || hasher.verify(&password, &hashed_password))
        .await
        .map_err(|e| TaskError::Internal(e.into()))?
        .map_err(TaskError::Internal)?;

    if matches {
        Ok(AuthenticatedCaller::new(user.id))
    } else {
        Err(TaskError::Validation("invalid credentials".to_string()))
    }
}
