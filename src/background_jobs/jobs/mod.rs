//! Specific background job implementations.

pub mod vm_status;

pub use vm_status::UpdateVmStatusJob;
