#![allow(dead_code)]

pub const ADMIN_USERNAME: &str = "root-admin";
pub const ADMIN_PASSWORD: &str = "admin-password";

pub const USER_USERNAME: &str = "alice";
pub const OTHER_USERNAME: &str = "bob";
pub const USER_PASSWORD: &str = "user-password";

/// Simulated provisioning latency of the test worker.
pub const PROVISIONING_LATENCY_MS: u64 = 3_000;
pub const REQUEST_TIMEOUT_MS: u64 = 10_000;
