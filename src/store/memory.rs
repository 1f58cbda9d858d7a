use super::{Identifiable, Repository, StoreError};
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Vec-backed repository. Preserves insertion order.
pub struct InMemoryRepository<T> {
    items: RwLock<Vec<T>>,
}

impl<T: Identifiable> InMemoryRepository<T> {
    pub fn new() -> Self {
        Self::with_items(Vec::new())
    }

    pub fn with_items(items: Vec<T>) -> Self {
        InMemoryRepository {
            items: RwLock::new(items),
        }
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

impl<T: Identifiable> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn conflicting_key<T: Identifiable>(items: &[T], item: &T) -> bool {
    items
        .iter()
        .any(|existing| existing.id() != item.id() && existing.unique_key() == item.unique_key())
}

#[async_trait]
impl<T: Identifiable> Repository<T> for InMemoryRepository<T> {
    async fn get_all(&self) -> Result<Vec<T>, StoreError> {
        Ok(self.items.read().await.clone())
    }

    async fn get(&self, id: &str) -> Result<T, StoreError> {
        self.items
            .read()
            .await
            .iter()
            .find(|item| item.id() == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: T::KIND,
                id: id.to_string(),
            })
    }

    async fn add(&self, item: T, ensure_unique: bool) -> Result<T, StoreError> {
        let mut items = self.items.write().await;
        let existing = items
            .iter()
            .find(|e| e.id() == item.id() || e.unique_key() == item.unique_key());
        match existing {
            Some(_) if ensure_unique => Err(StoreError::Duplicate {
                kind: T::KIND,
                key: item.unique_key().to_string(),
            }),
            Some(existing) => Ok(existing.clone()),
            None => {
                items.push(item.clone());
                Ok(item)
            }
        }
    }

    async fn put(&self, item: T) -> Result<T, StoreError> {
        let mut items = self.items.write().await;
        if conflicting_key(&items, &item) {
            return Err(StoreError::Duplicate {
                kind: T::KIND,
                key: item.unique_key().to_string(),
            });
        }
        match items.iter_mut().find(|e| e.id() == item.id()) {
            Some(slot) => *slot = item.clone(),
            None => items.push(item.clone()),
        }
        Ok(item)
    }

    async fn put_all(&self, new_items: Vec<T>) -> Result<Vec<T>, StoreError> {
        let mut items = self.items.write().await;
        // Validate everything first so a conflict leaves the collection untouched
        for item in &new_items {
            if conflicting_key(&items, item) {
                return Err(StoreError::Duplicate {
                    kind: T::KIND,
                    key: item.unique_key().to_string(),
                });
            }
        }
        for item in &new_items {
            match items.iter_mut().find(|e| e.id() == item.id()) {
                Some(slot) => *slot = item.clone(),
                None => items.push(item.clone()),
            }
        }
        Ok(new_items)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut items = self.items.write().await;
        let before = items.len();
        items.retain(|item| item.id() != id);
        if items.len() == before {
            return Err(StoreError::NotFound {
                kind: T::KIND,
                id: id.to_string(),
            });
        }
        Ok(())
    }
}
