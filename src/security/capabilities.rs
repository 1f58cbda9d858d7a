use super::{Principal, Role};
use crate::error::TaskError;
use std::fmt;

/// Every protected operation a task can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateUser,
    GetUser,
    GetAllUsers,
    UpdateUser,
    DeleteUser,
    CreateVm,
    GetVm,
    GetAllVms,
    BulkUpdateVms,
}

impl Operation {
    pub const ALL: [Operation; 9] = [
        Operation::CreateUser,
        Operation::GetUser,
        Operation::GetAllUsers,
        Operation::UpdateUser,
        Operation::DeleteUser,
        Operation::CreateVm,
        Operation::GetVm,
        Operation::GetAllVms,
        Operation::BulkUpdateVms,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::CreateUser => "user.create",
            Operation::GetUser => "user.get",
            Operation::GetAllUsers => "user.get_all",
            Operation::UpdateUser => "user.update",
            Operation::DeleteUser => "user.delete",
            Operation::CreateVm => "vm.create",
            Operation::GetVm => "vm.get",
            Operation::GetAllVms => "vm.get_all",
            Operation::BulkUpdateVms => "vm.bulk_update",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relation between the acting principal and the resource an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The operation has no single target (creation, listing).
    NoTarget,
    /// The target is the principal itself, or is owned by it.
    Owned,
    NotOwned,
}

impl Ownership {
    pub fn of(principal: &Principal, owner_id: &str) -> Self {
        if principal.id() == owner_id {
            Ownership::Owned
        } else {
            Ownership::NotOwned
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    Any,
    OwnedOnly,
    OthersOnly,
}

impl Grant {
    fn admits(self, ownership: Ownership) -> bool {
        match (self, ownership) {
            (_, Ownership::NoTarget) => true,
            (Grant::Any, _) => true,
            (Grant::OwnedOnly, Ownership::Owned) => true,
            (Grant::OthersOnly, Ownership::NotOwned) => true,
            _ => false,
        }
    }
}

/// Who may do what. A (operation, role) pair absent from the table is denied.
pub const CAPABILITIES: &[(Operation, Role, Grant)] = &[
    (Operation::CreateUser, Role::Admin, Grant::Any),
    (Operation::GetUser, Role::Admin, Grant::Any),
    (Operation::GetUser, Role::User, Grant::OwnedOnly),
    (Operation::GetAllUsers, Role::Admin, Grant::Any),
    (Operation::UpdateUser, Role::Admin, Grant::Any),
    (Operation::UpdateUser, Role::User, Grant::OwnedOnly),
    (Operation::DeleteUser, Role::Admin, Grant::OthersOnly),
    (Operation::CreateVm, Role::Admin, Grant::Any),
    (Operation::CreateVm, Role::User, Grant::Any),
    (Operation::GetVm, Role::Admin, Grant::Any),
    (Operation::GetVm, Role::User, Grant::OwnedOnly),
    (Operation::GetAllVms, Role::Admin, Grant::Any),
    (Operation::GetAllVms, Role::User, Grant::OwnedOnly),
    (Operation::BulkUpdateVms, Role::Admin, Grant::Any),
];

pub fn grant_for(operation: Operation, role: Role) -> Option<Grant> {
    CAPABILITIES
        .iter()
        .find(|(op, r, _)| *op == operation && *r == role)
        .map(|(_, _, grant)| *grant)
}

pub fn is_allowed(principal: &Principal, operation: Operation, ownership: Ownership) -> bool {
    grant_for(operation, principal.role())
        .map(|grant| grant.admits(ownership))
        .unwrap_or(false)
}

/// Fails with [`TaskError::Unauthorized`] when the capability table denies the call.
pub fn authorize(
    principal: &Principal,
    operation: Operation,
    ownership: Ownership,
) -> Result<(), TaskError> {
    if is_allowed(principal, operation, ownership) {
        Ok(())
    } else {
        Err(TaskError::Unauthorized {
            principal_id: principal.id().to_string(),
            operation,
        })
    }
}
