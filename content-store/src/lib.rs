//! # Content store
//!
//! Collaborator interfaces for a node-local, digest-addressed content store
//! and the image catalog that names its contents, along with in-memory and
//! local filesystem implementations.

use std::sync::Arc;

use camino::Utf8PathBuf;
use serde::Deserialize;

mod descriptor;
mod digest;
mod driver;
mod error;
pub(crate) mod local;
pub(crate) mod memory;

#[doc(inline)]
pub use descriptor::{Descriptor, MEDIA_TYPE_OCTET_STREAM};
#[doc(inline)]
pub use digest::{Digest, DigestError};
#[doc(inline)]
pub use driver::{BlobRead, ContentReader, ContentStore, Image, ImageCatalog, Info};
#[doc(inline)]
pub use error::{StoreError, StoreErrorBuilder, StoreErrorKind};
#[doc(inline)]
pub use local::{LayoutCatalog, LocalContentStore};
#[doc(inline)]
pub use memory::{MemoryCatalog, MemoryContentStore, ReaderCounts};

/// Configuration selecting the store and catalog implementations.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreConfig {
    /// Empty in-memory store and catalog.
    Memory,

    /// Blobs under `<root>/blobs`, images named by an OCI layout index.
    Local {
        /// Root directory of the content store.
        root: Utf8PathBuf,

        /// Path to `index.json`; defaults to `<root>/index.json`.
        #[serde(default)]
        index: Option<Utf8PathBuf>,
    },
}

impl StoreConfig {
    /// Build the store handle described by this configuration.
    #[tracing::instrument]
    pub async fn build(self) -> Result<Store, StoreError> {
        let store = match self {
            StoreConfig::Memory => Store::new(MemoryContentStore::new(), MemoryCatalog::new()),
            StoreConfig::Local { root, index } => {
                let metadata = tokio::fs::metadata(&root)
                    .await
                    .map_err(|err| StoreError::io("local", err))?;
                if !metadata.is_dir() {
                    return Err(StoreError::new(
                        "local",
                        StoreErrorKind::InvalidRequest,
                        eyre::eyre!("content store root {root} is not a directory"),
                    ));
                }

                let index = index.unwrap_or_else(|| root.join("index.json"));
                Store::new(LocalContentStore::new(root), LayoutCatalog::new(index))
            }
        };
        Ok(store)
    }
}

/// Shared handle to a content store and its image catalog.
///
/// Cheap to clone. Constructed once at startup and passed to whatever
/// needs to reach the store.
#[derive(Debug, Clone)]
pub struct Store {
    content: Arc<dyn ContentStore>,
    catalog: Arc<dyn ImageCatalog>,
}

impl Store {
    /// Create a handle from a content store and a catalog.
    pub fn new<S, C>(content: S, catalog: C) -> Self
    where
        S: ContentStore + 'static,
        C: ImageCatalog + 'static,
    {
        Self {
            content: Arc::new(content),
            catalog: Arc::new(catalog),
        }
    }

    /// The content store.
    pub fn content(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    /// The image catalog.
    pub fn catalog(&self) -> &Arc<dyn ImageCatalog> {
        &self.catalog
    }

    /// Get the metadata for a blob.
    #[tracing::instrument(skip(self), fields(store = self.content.name()))]
    pub async fn info(&self, digest: &Digest) -> Result<Info, StoreError> {
        self.content.info(digest).await
    }

    /// Open a reader over a blob.
    #[tracing::instrument(skip(self), fields(store = self.content.name()))]
    pub async fn reader(&self, digest: &Digest) -> Result<ContentReader, StoreError> {
        self.content.reader(digest).await
    }

    /// List images, optionally restricted to a name prefix.
    #[tracing::instrument(skip(self), fields(catalog = self.catalog.name()))]
    pub async fn list(&self, prefix: Option<&str>) -> Result<Vec<Image>, StoreError> {
        self.catalog.list(prefix).await
    }

    /// Look up one image by name.
    #[tracing::instrument(skip(self), fields(catalog = self.catalog.name()))]
    pub async fn get(&self, name: &str) -> Result<Image, StoreError> {
        self.catalog.get(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_impl_all!(Store: Send, Sync, Clone);

    #[test]
    fn config_variants() {
        let config: StoreConfig = serde_json::from_str("\"memory\"").unwrap();
        assert!(matches!(config, StoreConfig::Memory));

        let config: StoreConfig =
            serde_json::from_str(r#"{"local": {"root": "/var/lib/containerd/content"}}"#).unwrap();
        match config {
            StoreConfig::Local { root, index } => {
                assert_eq!(root, "/var/lib/containerd/content");
                assert!(index.is_none());
            }
            other => panic!("unexpected config: {other:?}"),
        }
    }

    #[tokio::test]
    async fn build_memory_store() {
        let store = StoreConfig::Memory.build().await.unwrap();
        assert_eq!(store.content().name(), "memory");
        assert!(store.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn build_local_store_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = camino::Utf8Path::from_path(dir.path()).unwrap().to_owned();

        let store = StoreConfig::Local {
            root: root.clone(),
            index: None,
        }
        .build()
        .await
        .unwrap();
        assert_eq!(store.content().name(), "local");
        assert_eq!(store.catalog().name(), "layout");

        let missing = StoreConfig::Local {
            root: root.join("missing"),
            index: None,
        }
        .build()
        .await
        .unwrap_err();
        assert!(missing.is_not_found());
    }
}
