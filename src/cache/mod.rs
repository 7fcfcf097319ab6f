//! Ephemeral per-tab storage, the client-side counterpart of browser
//! `sessionStorage`. Used to hand the confirmed order id from the payment
//! screen to the order-status view.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

/// Key under which the last confirmed order id is stored.
pub const CONFIRMED_ORDER_KEY: &str = "confirmedOrderId";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage operation failed: {0}")]
    OperationFailed(String),
}

#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>)
        -> Result<(), StorageError>;
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Clone)]
pub struct InMemorySessionStorage {
    store: Arc<RwLock<HashMap<String, StorageEntry>>>,
}

#[derive(Debug, Clone)]
struct StorageEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl StorageEntry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|expires_at| Instant::now() > expires_at)
            .unwrap_or(false)
    }
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemorySessionStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut store = self.store.write().await;
        match store.get(key) {
            Some(entry) if entry.is_expired() => {
                store.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        if key.is_empty() {
            return Err(StorageError::OperationFailed("empty storage key".to_string()));
        }
        let mut store = self.store.write().await;
        store.insert(key.to_string(), StorageEntry::new(value.to_string(), ttl));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.store.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_remove() {
        let storage = InMemorySessionStorage::new();
        storage.set(CONFIRMED_ORDER_KEY, "42", None).await.unwrap();
        assert_eq!(
            storage.get(CONFIRMED_ORDER_KEY).await.unwrap().as_deref(),
            Some("42")
        );

        storage.remove(CONFIRMED_ORDER_KEY).await.unwrap();
        assert_eq!(storage.get(CONFIRMED_ORDER_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_key_is_refused() {
        let storage = InMemorySessionStorage::new();
        assert!(matches!(
            storage.set("", "42", None).await,
            Err(StorageError::OperationFailed(_))
        ));
    }

    #[tokio::test]
    async fn expired_entries_read_as_missing() {
        let storage = InMemorySessionStorage::new();
        storage
            .set("k", "v", Some(Duration::from_millis(1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(storage.get("k").await.unwrap(), None);
    }
}
