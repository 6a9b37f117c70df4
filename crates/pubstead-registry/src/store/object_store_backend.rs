//! Object store implementation of BlobStore.
//!
//! Works with any `object_store` backend (S3, GCS, Azure, local filesystem,
//! in-memory). Archives are served to clients from `base_url`, which fronts the
//! same bucket or directory.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::path::Path;
use object_store::{ObjectStore, PutOptions, PutPayload};
use tracing::debug;
use url::Url;

use super::BlobStore;
use crate::error::{Collaborator, RegistryError, RegistryResult};

/// Blob store backed by `object_store`.
pub struct ObjectStoreBlobStore {
    inner: Arc<dyn ObjectStore>,
    base_url: String,
}

impl std::fmt::Debug for ObjectStoreBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreBlobStore")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ObjectStoreBlobStore {
    pub fn new(inner: Arc<dyn ObjectStore>, base_url: impl Into<String>) -> Self {
        Self {
            inner,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// In-memory store for testing.
    pub fn memory(base_url: impl Into<String>) -> Self {
        Self::new(Arc::new(object_store::memory::InMemory::new()), base_url)
    }

    /// The underlying object store.
    pub fn inner(&self) -> &Arc<dyn ObjectStore> {
        &self.inner
    }

    /// Object key for an archive.
    ///
    /// Returns: `packages/{package}/versions/{version}.tar.gz`
    ///
    /// Each name is one percent-encoded path part, so `/`, `%` and `..` stay
    /// inside their segment and distinct names never share a key.
    pub fn archive_key(package: &str, version: &str) -> Path {
        let file = format!("{}.tar.gz", version);
        Path::from_iter(["packages", package, "versions", file.as_str()])
    }
}

#[async_trait]
impl BlobStore for ObjectStoreBlobStore {
    async fn put_archive(
        &self,
        package: &str,
        version: &str,
        bytes: Bytes,
    ) -> RegistryResult<()> {
        let key = Self::archive_key(package, version);
        debug!(key = %key, size = bytes.len(), "writing archive");

        self.inner
            .put_opts(&key, PutPayload::from_bytes(bytes), PutOptions::default())
            .await
            .map_err(|e| {
                RegistryError::infra(
                    Collaborator::BlobStore,
                    format!("failed to put {}: {}", key, e),
                )
            })?;

        Ok(())
    }

    async fn location(&self, package: &str, version: &str) -> RegistryResult<String> {
        let key = Self::archive_key(package, version);
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            RegistryError::infra(
                Collaborator::BlobStore,
                format!("invalid base URL {}: {}", self.base_url, e),
            )
        })?;

        // Key parts are already encoded; the URL encodes them once more so a
        // server mapping paths back to keys decodes to the exact key.
        url.path_segments_mut()
            .map_err(|_| {
                RegistryError::infra(
                    Collaborator::BlobStore,
                    format!("base URL {} cannot carry a path", self.base_url),
                )
            })?
            .pop_if_empty()
            .extend(key.parts());

        Ok(url.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::GetOptions;

    async fn read(store: &ObjectStoreBlobStore, package: &str, version: &str) -> Bytes {
        store
            .inner()
            .get_opts(
                &ObjectStoreBlobStore::archive_key(package, version),
                GetOptions::default(),
            )
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_and_read_back() {
        let store = ObjectStoreBlobStore::memory("https://cdn.example.com/");
        store
            .put_archive("foo", "1.0.0", Bytes::from_static(b"archive"))
            .await
            .unwrap();

        assert_eq!(read(&store, "foo", "1.0.0").await, Bytes::from_static(b"archive"));
    }

    #[tokio::test]
    async fn test_put_overwrites_orphan() {
        let store = ObjectStoreBlobStore::memory("https://cdn.example.com");
        store
            .put_archive("foo", "1.0.0", Bytes::from_static(b"first"))
            .await
            .unwrap();
        store
            .put_archive("foo", "1.0.0", Bytes::from_static(b"retry"))
            .await
            .unwrap();

        assert_eq!(read(&store, "foo", "1.0.0").await, Bytes::from_static(b"retry"));
    }

    #[tokio::test]
    async fn test_location() {
        let store = ObjectStoreBlobStore::memory("https://cdn.example.com/");
        let location = store.location("foo", "1.0.0").await.unwrap();
        assert_eq!(
            location,
            "https://cdn.example.com/packages/foo/versions/1.0.0.tar.gz"
        );
    }

    #[test]
    fn test_archive_key_cannot_escape_segment() {
        let key = ObjectStoreBlobStore::archive_key("../foo", "1.0.0/x");
        assert_eq!(key.as_ref(), "packages/..%2Ffoo/versions/1.0.0%2Fx.tar.gz");

        let key = ObjectStoreBlobStore::archive_key("..", "1.0.0");
        assert_eq!(key.as_ref(), "packages/%2E%2E/versions/1.0.0.tar.gz");
    }

    #[test]
    fn test_archive_keys_are_distinct_per_name() {
        let names = ["foo/bar", "foo_bar", "foo%2Fbar", "foo\\bar", "foo"];
        let keys: std::collections::HashSet<_> = names
            .iter()
            .map(|name| ObjectStoreBlobStore::archive_key(name, "1.0.0"))
            .collect();
        assert_eq!(keys.len(), names.len());
    }

    #[tokio::test]
    async fn test_slash_in_name_does_not_overwrite_neighbour() {
        let store = ObjectStoreBlobStore::memory("https://cdn.example.com");
        store
            .put_archive("foo_bar", "1.0.0", Bytes::from_static(b"owner"))
            .await
            .unwrap();
        store
            .put_archive("foo/bar", "1.0.0", Bytes::from_static(b"other"))
            .await
            .unwrap();

        assert_eq!(read(&store, "foo_bar", "1.0.0").await, Bytes::from_static(b"owner"));
        assert_ne!(
            store.location("foo_bar", "1.0.0").await.unwrap(),
            store.location("foo/bar", "1.0.0").await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_location_encodes_reserved_characters() {
        let store = ObjectStoreBlobStore::memory("https://cdn.example.com/archives/");
        let location = store.location("foo/bar?x", "1.0.0#y").await.unwrap();
        assert_eq!(
            location,
            "https://cdn.example.com/archives/packages/foo%252Fbar%253Fx/versions/1.0.0%2523y.tar.gz"
        );
    }
}
