use bytes::Bytes;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, ready};

use super::{Storage, StorageError};

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: DashMap<String, Bytes>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get_item_raw<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>, StorageError>> {
        let value = self.items.get(key).map(|entry| entry.value().clone());
        ready(Ok(value)).boxed()
    }

    fn set_item_raw<'a>(&'a self, key: &'a str, value: Bytes) -> BoxFuture<'a, Result<(), StorageError>> {
        self.items.insert(key.to_owned(), value);
        ready(Ok(())).boxed()
    }

    fn remove_item<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StorageError>> {
        self.items.remove(key);
        ready(Ok(())).boxed()
    }

    fn keys(&self) -> BoxFuture<'_, Result<Vec<String>, StorageError>> {
        let keys = self.items.iter().map(|entry| entry.key().clone()).collect();
        ready(Ok(keys)).boxed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_remove() {
        let storage = MemoryStorage::new();
        assert!(storage.get_item_raw("state").await.unwrap().is_none());

        storage
            .set_item_raw("state", Bytes::from_static(b"{}"))
            .await
            .unwrap();
        assert_eq!(
            storage.get_item_raw("state").await.unwrap().as_deref(),
            Some(&b"{}"[..])
        );
        assert_eq!(storage.keys().await.unwrap(), vec!["state".to_owned()]);

        storage.remove_item("state").await.unwrap();
        storage.remove_item("state").await.unwrap();
        assert!(storage.is_empty());
    }
}
