//! Registry backend over a content store

use content_store::{Descriptor, Digest, Store};

use crate::backend::{Iter, RegistryBackend};
use crate::blob::BlobStream;
use crate::catalog;
use crate::error::RegistryResult;
use crate::manifest::open_manifest;

/// Serves a content store and its image catalog as a registry.
///
/// Resolve operations open the same stream as the matching fetch, keep its
/// descriptor and close it again.
///
/// The store is flat, so repository names only matter for listing tags and
/// resolving them; any blob or manifest is reachable from any repository.
#[derive(Debug, Clone)]
pub struct ContentRegistry {
    store: Store,
}

impl ContentRegistry {
    /// Create a registry over `store`.
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// The underlying store handle.
    pub fn store(&self) -> &Store {
        &self.store
    }
}

#[async_trait::async_trait]
impl RegistryBackend for ContentRegistry {
    type Reader = BlobStream;

    fn repositories(&self) -> Iter<String> {
        catalog::repositories(self.store.clone())
    }

    fn tags(&self, repository: &str) -> Iter<String> {
        catalog::tags(self.store.clone(), repository)
    }

    #[tracing::instrument(skip(self))]
    async fn get_blob(&self, repository: &str, digest: &Digest) -> RegistryResult<BlobStream> {
        BlobStream::new(self.store.clone(), Descriptor::from_digest(digest.clone())).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_manifest(&self, repository: &str, digest: &Digest) -> RegistryResult<BlobStream> {
        open_manifest(&self.store, digest).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_tag(&self, repository: &str, tag: &str) -> RegistryResult<BlobStream> {
        catalog::get_tag(&self.store, repository, tag).await
    }

    async fn resolve_blob(&self, repository: &str, digest: &Digest) -> RegistryResult<Descriptor> {
        self.get_blob(repository, digest)
            .await
            .map(BlobStream::into_descriptor)
    }

    async fn resolve_manifest(
        &self,
        repository: &str,
        digest: &Digest,
    ) -> RegistryResult<Descriptor> {
        self.get_manifest(repository, digest)
            .await
            .map(BlobStream::into_descriptor)
    }

    async fn resolve_tag(&self, repository: &str, tag: &str) -> RegistryResult<Descriptor> {
        self.get_tag(repository, tag)
            .await
            .map(BlobStream::into_descriptor)
    }
}
