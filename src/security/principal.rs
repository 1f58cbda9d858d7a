use crate::store::UserRecord;
use serde::{Deserialize, Serialize};

/// Privilege level of a principal. Roles are compared by equality only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "ROLE:ADMIN")]
    Admin,
    #[serde(rename = "ROLE:USER")]
    User,
}

impl Role {
    /// Persisted identifier of the role.
    pub fn as_id(self) -> &'static str {
        match self {
            Role::Admin => "ROLE:ADMIN",
            Role::User => "ROLE:USER",
        }
    }

    pub fn from_id(value: &str) -> Option<Self> {
        match value {
            "ROLE:ADMIN" => Some(Role::Admin),
            "ROLE:USER" => Some(Role::User),
            _ => None,
        }
    }
}

/// Fixed identities owned by the process itself. They are never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemPrincipal {
    /// Startup and bootstrap work.
    Root,
    /// Periodic background jobs.
    BackgroundJob,
    /// Calls coming back from the cloud worker.
    CloudWorker,
}

impl SystemPrincipal {
    pub const ALL: [SystemPrincipal; 3] = [
        SystemPrincipal::Root,
        SystemPrincipal::BackgroundJob,
        SystemPrincipal::CloudWorker,
    ];

    pub fn id(self) -> &'static str {
        match self {
            SystemPrincipal::Root => "PRINCIPAL:SYSTEM:ROOT",
            SystemPrincipal::BackgroundJob => "PRINCIPAL:SYSTEM:BACKGROUND_JOB",
            SystemPrincipal::CloudWorker => "PRINCIPAL:SYSTEM:CLOUD_WORKER",
        }
    }

    pub fn role(self) -> Role {
        Role::Admin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalKind {
    User,
    System(SystemPrincipal),
}

/// The identity an operation is attributed to.
///
/// There is no public constructor taking raw strings: a principal is either one of
/// the [`SystemPrincipal`]s or the result of resolving an [`AuthenticatedCaller`]
/// against the user repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    id: String,
    role: Role,
    kind: PrincipalKind,
}

impl Principal {
    pub(crate) fn from_user(user: &UserRecord) -> Self {
        Principal {
            id: user.id.clone(),
            role: user.role,
            kind: PrincipalKind::User,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn kind(&self) -> PrincipalKind {
        self.kind
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_system(&self) -> bool {
        matches!(self.kind, PrincipalKind::System(_))
    }
}

impl From<SystemPrincipal> for Principal {
    fn from(system: SystemPrincipal) -> Self {
        Principal {
            id: system.id().to_string(),
            role: system.role(),
            kind: PrincipalKind::System(system),
        }
    }
}

/// An identity vouched for by the transport layer, not yet checked against the
/// user repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedCaller {
    account_id: String,
}

impl AuthenticatedCaller {
    pub fn new(account_id: impl Into<String>) -> Self {
        AuthenticatedCaller {
            account_id: account_id.into(),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }
}
