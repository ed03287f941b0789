use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};

use super::{SharedStorage, Storage, StorageError};

/// Namespaced view over another store. Every key is stored as
/// `<prefix>:<key>`, and `keys()` only lists (and strips) this namespace.
#[derive(Debug, Clone)]
pub struct PrefixStorage {
    inner: SharedStorage,
    prefix: String,
}

impl PrefixStorage {
    pub fn new(inner: SharedStorage, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{key}", self.prefix)
    }
}

/// Isolated view of `storage` for the namespace `name`.
pub fn prefix_storage(storage: SharedStorage, name: &str) -> SharedStorage {
    Arc::new(PrefixStorage::new(storage, name))
}

impl Storage for PrefixStorage {
    fn get_item_raw<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>, StorageError>> {
        async move { self.inner.get_item_raw(&self.full_key(key)).await }.boxed()
    }

    fn set_item_raw<'a>(&'a self, key: &'a str, value: Bytes) -> BoxFuture<'a, Result<(), StorageError>> {
        async move { self.inner.set_item_raw(&self.full_key(key), value).await }.boxed()
    }

    fn remove_item<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StorageError>> {
        async move { self.inner.remove_item(&self.full_key(key)).await }.boxed()
    }

    fn keys(&self) -> BoxFuture<'_, Result<Vec<String>, StorageError>> {
        async move {
            let marker = format!("{}:", self.prefix);
            let keys = self.inner.keys().await?;
            Ok(keys
                .into_iter()
                .filter_map(|key| key.strip_prefix(&marker).map(str::to_owned))
                .collect())
        }
        .boxed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let shared: SharedStorage = Arc::new(MemoryStorage::new());
        let rooms = prefix_storage(Arc::clone(&shared), "rooms");
        let locations = prefix_storage(Arc::clone(&shared), "locations");

        rooms
            .set_item_raw("state", Bytes::from_static(b"rooms"))
            .await
            .unwrap();
        locations
            .set_item_raw("state", Bytes::from_static(b"locations"))
            .await
            .unwrap();

        assert_eq!(&rooms.get_item_raw("state").await.unwrap().unwrap()[..], b"rooms");
        assert_eq!(
            &shared.get_item_raw("locations:state").await.unwrap().unwrap()[..],
            b"locations"
        );
        assert_eq!(rooms.keys().await.unwrap(), vec!["state".to_owned()]);

        rooms.remove_item("state").await.unwrap();
        assert!(rooms.get_item_raw("state").await.unwrap().is_none());
        assert!(locations.get_item_raw("state").await.unwrap().is_some());
    }
}
