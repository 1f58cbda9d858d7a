//! Shared fixtures for unit tests.

use crate::delegation::{DelegationClient, MessageBus};
use crate::security::{CredentialHasher, Principal, Role};
use crate::store::{
    Identifiable, InMemoryRepository, Repository, StoreError, UserRecord, UserRepository,
    VmRepository,
};
use crate::task::{TaskContext, Tasks};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn user_record(id: &str, username: &str, role: Role) -> UserRecord {
    UserRecord {
        id: id.to_string(),
        username: username.to_string(),
        first_name: "first".to_string(),
        last_name: "last".to_string(),
        hashed_password: "hash".to_string(),
        salt: "salt".to_string(),
        role,
    }
}

pub fn user_principal(id: &str, role: Role) -> Principal {
    Principal::from_user(&user_record(id, id, role))
}

/// In-memory repository that counts every call, reads and writes separately.
pub struct CountingRepository<T> {
    inner: InMemoryRepository<T>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl<T: Identifiable> CountingRepository<T> {
    pub fn new() -> Self {
        Self::with_items(Vec::new())
    }

    pub fn with_items(items: Vec<T>) -> Self {
        CountingRepository {
            inner: InMemoryRepository::with_items(items),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.reads() + self.writes()
    }

    fn read(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }

    fn write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl<T: Identifiable> Repository<T> for CountingRepository<T> {
    async fn get_all(&self) -> Result<Vec<T>, StoreError> {
        self.read();
        self.inner.get_all().await
    }

    async fn get(&self, id: &str) -> Result<T, StoreError> {
        self.read();
        self.inner.get(id).await
    }

    async fn add(&self, item: T, ensure_unique: bool) -> Result<T, StoreError> {
        self.write();
        self.inner.add(item, ensure_unique).await
    }

    async fn put(&self, item: T) -> Result<T, StoreError> {
        self.write();
        self.inner.put(item).await
    }

    async fn put_all(&self, items: Vec<T>) -> Result<Vec<T>, StoreError> {
        self.write();
        self.inner.put_all(items).await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.write();
        self.inner.delete(id).await
    }
}

/// Tasks over the given repositories, with a delegation client nobody answers.
pub fn tasks_over(users: Arc<UserRepository>, vms: Arc<VmRepository>) -> Tasks {
    Tasks::new(TaskContext {
        users,
        vms,
        delegation: DelegationClient::new(Arc::new(MessageBus::new()), Duration::from_secs(1)),
        hasher: CredentialHasher::Argon2,
    })
}
