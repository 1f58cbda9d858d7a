//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestCentral, USER_USERNAME};
//!
//! #[tokio::test]
//! async fn test_create_user() {
//!     let central = TestCentral::spawn().await;
//!     let user = central.create_user(USER_USERNAME, Role::User).await;
//! }
//! ```

mod central;
mod constants;
mod counting;

pub use central::{new_user, TestCentral};
pub use constants::*;
pub use counting::CountingRepository;
