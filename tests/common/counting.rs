use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use vm_central::store::{Identifiable, InMemoryRepository, Repository, StoreError};

/// In-memory repository that counts reads and writes.
pub struct CountingRepository<T> {
    inner: InMemoryRepository<T>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

#[allow(dead_code)]
impl<T: Identifiable> CountingRepository<T> {
    pub fn new() -> Self {
        CountingRepository {
            inner: InMemoryRepository::new(),
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

    pub async fn len(&self) -> usize {
        self.inner.len().await
    }
}

#[async_trait]
impl<T: Identifiable> Repository<T> for CountingRepository<T> {
    async fn get_all(&self) -> Result<Vec<T>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_all().await
    }

    async fn get(&self, id: &str) -> Result<T, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get(id).await
    }

    async fn add(&self, item: T, ensure_unique: bool) -> Result<T, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.add(item, ensure_unique).await
    }

    async fn put(&self, item: T) -> Result<T, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.put(item).await
    }

    async fn put_all(&self, items: Vec<T>) -> Result<Vec<T>, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.put_all(items).await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(id).await
    }
}
