//! VM Central Library
//!
//! Authorization-gated tasks over users and virtual machines, the background job
//! scheduler that drives them, and the delegation channel used to hand provisioning
//! work to the cloud worker.

pub mod background_jobs;
pub mod config;
pub mod delegation;
pub mod error;
pub mod metrics;
pub mod security;
pub mod sqlite_persistence;
pub mod store;
pub mod task;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types for convenience
pub use error::TaskError;
pub use security::{AuthenticatedCaller, Principal, Role, SystemPrincipal};
pub use store::{InMemoryRepository, Repository, StoreError, UserRecord, VmRecord};
pub use task::{Task, TaskContext, Tasks};
