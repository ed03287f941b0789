use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};

use super::{Storage, StorageError};

/// One file per key under a root directory.
///
/// Keys are escaped into portable file names (`locations:state` becomes
/// `locations%3Astate`), so namespaced keys work on every platform.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// The directory is created lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey(key.to_owned()));
        }
        Ok(self.root.join(escape(key)))
    }
}

fn io_error(key: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        key: key.to_owned(),
        source,
    }
}

impl Storage for FileStorage {
    fn get_item_raw<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>, StorageError>> {
        async move {
            let path = self.path_for(key)?;
            match tokio::fs::read(&path).await {
                Ok(data) => Ok(Some(Bytes::from(data))),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(io_error(key)(e)),
            }
        }
        .boxed()
    }

    fn set_item_raw<'a>(&'a self, key: &'a str, value: Bytes) -> BoxFuture<'a, Result<(), StorageError>> {
        async move {
            let path = self.path_for(key)?;
            tokio::fs::create_dir_all(&self.root)
                .await
                .map_err(io_error(key))?;

            // Write-then-rename so readers never observe a torn snapshot.
            let staging = path.with_extension("tmp");
            tokio::fs::write(&staging, &value)
                .await
                .map_err(io_error(key))?;
            tokio::fs::rename(&staging, &path)
                .await
                .map_err(io_error(key))
        }
        .boxed()
    }

    fn remove_item<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StorageError>> {
        async move {
            let path = self.path_for(key)?;
            match tokio::fs::remove_file(&path).await {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(io_error(key)(e)),
                _ => Ok(()),
            }
        }
        .boxed()
    }

    fn keys(&self) -> BoxFuture<'_, Result<Vec<String>, StorageError>> {
        async move {
            let mut entries = match tokio::fs::read_dir(&self.root).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(io_error("*")(e)),
            };

            let mut keys = Vec::new();
            while let Some(entry) = entries.next_entry().await.map_err(io_error("*"))? {
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                if Path::new(name).extension().is_some_and(|ext| ext == "tmp") {
                    continue;
                }
                if let Some(key) = unescape(name) {
                    keys.push(key);
                }
            }
            Ok(keys)
        }
        .boxed()
    }
}

// ── Key escaping ─────────────────────────────────────────────────────

fn is_portable(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_')
}

fn escape(key: &str) -> String {
    let mut escaped = String::with_capacity(key.len());
    for c in key.chars() {
        if is_portable(c) {
            escaped.push(c);
        } else {
            let mut buf = [0_u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                let _ = write!(escaped, "%{byte:02X}");
            }
        }
    }
    escaped
}

fn unescape(name: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(name.len());
    let mut rest = name.as_bytes();
    while let Some((&first, tail)) = rest.split_first() {
        if first == b'%' {
            let hex = tail.get(..2)?;
            let hex = std::str::from_utf8(hex).ok()?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            rest = tail.get(2..)?;
        } else {
            bytes.push(first);
            rest = tail;
        }
    }
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn escaping_is_reversible() {
        for key in ["locations:state", "plain", "with space", "ünïcode:ключ"] {
            let escaped = escape(key);
            assert!(escaped.chars().all(|c| is_portable(c) || c == '%'));
            assert_eq!(unescape(&escaped).as_deref(), Some(key));
        }
        assert_eq!(escape("locations:state"), "locations%3Astate");
    }

    #[tokio::test]
    async fn persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("cache");

        let storage = FileStorage::new(&root);
        assert!(storage.keys().await.unwrap().is_empty());
        storage
            .set_item_raw("rooms:state", Bytes::from_static(b"{\"a\":1}"))
            .await
            .unwrap();

        let reopened = FileStorage::new(&root);
        let value = reopened.get_item_raw("rooms:state").await.unwrap().unwrap();
        assert_eq!(&value[..], b"{\"a\":1}");
        assert_eq!(reopened.keys().await.unwrap(), vec!["rooms:state".to_owned()]);

        reopened.remove_item("rooms:state").await.unwrap();
        reopened.remove_item("rooms:state").await.unwrap();
        assert!(reopened.get_item_raw("rooms:state").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        assert!(matches!(
            storage.get_item_raw("").await,
            Err(StorageError::InvalidKey(_))
        ));
    }
}
