//! The contract between the registry protocol surface and whatever serves
//! its content.

use std::sync::Arc;

use content_store::{Descriptor, Digest};
use futures::stream::BoxStream;
use tokio::io::AsyncRead;

use crate::blob::BlobStream;
use crate::error::RegistryResult;

/// A lazy, one-shot sequence of results.
///
/// Enumerations are computed fresh on every call; callers that need a
/// sequence twice must ask for it twice.
pub type Iter<T> = BoxStream<'static, RegistryResult<T>>;

/// Content returned by a [`RegistryBackend`].
pub trait BlobReader: AsyncRead + Send + Unpin {
    /// The descriptor of the content being read.
    fn descriptor(&self) -> &Descriptor;

    /// Release any resources held by the reader.
    fn close(&mut self);
}

impl BlobReader for BlobStream {
    fn descriptor(&self) -> &Descriptor {
        BlobStream::descriptor(self)
    }

    fn close(&mut self) {
        BlobStream::close(self)
    }
}

/// Read-only registry operations.
///
/// Repository names are passed through from the protocol; a backend over a
/// flat content store may ignore them for blob and manifest fetches.
#[async_trait::async_trait]
pub trait RegistryBackend: Send + Sync + 'static {
    /// Reader type handed out for blob, manifest and tag fetches.
    type Reader: BlobReader + 'static;

    /// Every repository name, each exactly once.
    fn repositories(&self) -> Iter<String>;

    /// Every tag in `repository`.
    fn tags(&self, repository: &str) -> Iter<String>;

    /// Open a blob by digest.
    async fn get_blob(&self, repository: &str, digest: &Digest) -> RegistryResult<Self::Reader>;

    /// Open a manifest by digest. The reader's media type is always set.
    async fn get_manifest(&self, repository: &str, digest: &Digest)
    -> RegistryResult<Self::Reader>;

    /// Open the manifest a tag points at.
    async fn get_tag(&self, repository: &str, tag: &str) -> RegistryResult<Self::Reader>;

    /// Describe a blob without returning its content.
    async fn resolve_blob(&self, repository: &str, digest: &Digest) -> RegistryResult<Descriptor>;

    /// Describe a manifest without returning its content.
    async fn resolve_manifest(
        &self,
        repository: &str,
        digest: &Digest,
    ) -> RegistryResult<Descriptor>;

    /// Describe the manifest a tag points at.
    async fn resolve_tag(&self, repository: &str, tag: &str) -> RegistryResult<Descriptor>;
}

#[async_trait::async_trait]
impl<B> RegistryBackend for Arc<B>
where
    B: RegistryBackend,
{
    type Reader = B::Reader;

    fn repositories(&self) -> Iter<String> {
        (**self).repositories()
    }

    fn tags(&self, repository: &str) -> Iter<String> {
        (**self).tags(repository)
    }

    async fn get_blob(&self, repository: &str, digest: &Digest) -> RegistryResult<Self::Reader> {
        (**self).get_blob(repository, digest).await
    }

    async fn get_manifest(
        &self,
        repository: &str,
        digest: &Digest,
    ) -> RegistryResult<Self::Reader> {
        (**self).get_manifest(repository, digest).await
    }

    async fn get_tag(&self, repository: &str, tag: &str) -> RegistryResult<Self::Reader> {
        (**self).get_tag(repository, tag).await
    }

    async fn resolve_blob(&self, repository: &str, digest: &Digest) -> RegistryResult<Descriptor> {
        (**self).resolve_blob(repository, digest).await
    }

    async fn resolve_manifest(
        &self,
        repository: &str,
        digest: &Digest,
    ) -> RegistryResult<Descriptor> {
        (**self).resolve_manifest(repository, digest).await
    }

    async fn resolve_tag(&self, repository: &str, tag: &str) -> RegistryResult<Descriptor> {
        (**self).resolve_tag(repository, tag).await
    }
}
