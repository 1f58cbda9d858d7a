//! Principals, roles and the capability table every task consults.

mod capabilities;
mod password;
mod principal;

pub use capabilities::{
    authorize, grant_for, is_allowed, Grant, Operation, Ownership, CAPABILITIES,
};
pub use password::CredentialHasher;
pub use principal::{AuthenticatedCaller, Principal, PrincipalKind, Role, SystemPrincipal};
