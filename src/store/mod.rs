//! Persistence contract used by tasks, and its bundled implementations.

mod ids;
mod memory;
mod models;
mod sqlite;

pub use ids::{next_id, next_user_id, next_vm_id, USER_ID_PREFIX, VM_ID_PREFIX};
pub use memory::InMemoryRepository;
pub use models::{UserRecord, VmProvider, VmRecord, VmStatus};
pub use sqlite::{SqliteRecord, SqliteRepository, SqliteStore};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} {key} already exists")]
    Duplicate { kind: &'static str, key: String },

    #[error("Backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(err.into())
    }
}

/// A record with a stable id and a key that must be unique across the collection.
pub trait Identifiable: Clone + Send + Sync + 'static {
    /// Human readable record kind, used in errors.
    const KIND: &'static str;

    fn id(&self) -> &str;

    fn unique_key(&self) -> &str {
        self.id()
    }
}

/// Storage for one kind of record.
#[async_trait]
pub trait Repository<T: Identifiable>: Send + Sync {
    async fn get_all(&self) -> Result<Vec<T>, StoreError>;

    /// Returns `StoreError::NotFound` if no record has the given id.
    async fn get(&self, id: &str) -> Result<T, StoreError>;

    /// Inserts a new record.
    ///
    /// When a record with the same id or unique key already exists, fails with
    /// `StoreError::Duplicate` if `ensure_unique` is set, otherwise returns the
    /// existing record without writing.
    async fn add(&self, item: T, ensure_unique: bool) -> Result<T, StoreError>;

    /// Inserts or replaces the record with the same id.
    async fn put(&self, item: T) -> Result<T, StoreError>;

    async fn put_all(&self, items: Vec<T>) -> Result<Vec<T>, StoreError>;

    /// Returns `StoreError::NotFound` if no record has the given id.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

pub type UserRepository = dyn Repository<UserRecord>;
pub type VmRepository = dyn Repository<VmRecord>;
