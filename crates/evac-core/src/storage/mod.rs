// ── Persistence collaborator ──
//
// Services persist every accepted value through a raw key-value store.
// The store is shared, but each service only ever sees a namespaced view
// of it (`<service>:<key>`), so services cannot read or clobber each
// other's snapshots.

mod file;
mod memory;
mod prefix;

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use thiserror::Error;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use prefix::{PrefixStorage, prefix_storage};

/// A storage backend shared across services.
pub type SharedStorage = Arc<dyn Storage>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

/// Minimal async key-value store holding raw bytes.
pub trait Storage: Send + Sync + fmt::Debug {
    /// `Ok(None)` when the key is absent.
    fn get_item_raw<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>, StorageError>>;

    fn set_item_raw<'a>(&'a self, key: &'a str, value: Bytes) -> BoxFuture<'a, Result<(), StorageError>>;

    /// Removing an absent key is not an error.
    fn remove_item<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StorageError>>;

    /// Every key currently stored, in no particular order.
    fn keys(&self) -> BoxFuture<'_, Result<Vec<String>, StorageError>>;
}
