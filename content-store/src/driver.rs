use std::io::SeekFrom;
use std::ops::Deref;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::{fmt, io};

use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

use crate::{Descriptor, Digest, StoreError};

/// Byte source handed out by a content store.
pub trait BlobRead: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T> BlobRead for T where T: AsyncRead + AsyncSeek + Send + Unpin + ?Sized {}

/// Blob metadata, as tracked by the content store.
///
/// The store has no notion of media type; only the size is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Info {
    /// The digest of the blob.
    pub digest: Digest,

    /// The size of the blob in bytes.
    pub size: u64,

    /// When the blob was committed to the store.
    pub created: DateTime<Utc>,
}

/// A seekable reader over one blob, aware of the blob's exact size.
///
/// Dropping the reader releases whatever the store holds open for it.
pub struct ContentReader {
    size: u64,
    inner: Box<dyn BlobRead>,
}

impl fmt::Debug for ContentReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentReader")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl ContentReader {
    /// Wrap a store-specific reader.
    pub fn new<R>(size: u64, reader: R) -> Self
    where
        R: BlobRead + 'static,
    {
        Self {
            size,
            inner: Box::new(reader),
        }
    }

    /// The exact size of the blob in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl AsyncRead for ContentReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.inner).poll_read(cx, buf)
    }
}

impl AsyncSeek for ContentReader {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut *self.inner).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut *self.inner).poll_complete(cx)
    }
}

/// A digest-addressed blob store.
#[async_trait::async_trait]
pub trait ContentStore: fmt::Debug + Send + Sync {
    /// The name of the store engine, used in errors and logs.
    fn name(&self) -> &'static str;

    /// Get the metadata for a blob.
    async fn info(&self, digest: &Digest) -> Result<Info, StoreError>;

    /// Open a reader positioned at the start of a blob.
    async fn reader(&self, digest: &Digest) -> Result<ContentReader, StoreError>;
}

/// An entry in the image catalog: a fully qualified image name and the
/// descriptor it points at (usually a manifest or index).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Fully qualified name, e.g. `docker.io/library/alpine:3.20`.
    pub name: String,

    /// The blob this name resolves to.
    pub target: Descriptor,
}

/// The name-indexed image catalog kept alongside the content store.
#[async_trait::async_trait]
pub trait ImageCatalog: fmt::Debug + Send + Sync {
    /// The name of the catalog engine, used in errors and logs.
    fn name(&self) -> &'static str;

    /// List images sorted by name, optionally restricted to names starting
    /// with `prefix`.
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<Image>, StoreError>;

    /// Look up one image by its fully qualified name.
    async fn get(&self, name: &str) -> Result<Image, StoreError>;
}

#[async_trait::async_trait]
impl<S> ContentStore for Arc<S>
where
    S: ?Sized + ContentStore + Sync + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.deref().name()
    }

    async fn info(&self, digest: &Digest) -> Result<Info, StoreError> {
        self.deref().info(digest).await
    }

    async fn reader(&self, digest: &Digest) -> Result<ContentReader, StoreError> {
        self.deref().reader(digest).await
    }
}

#[async_trait::async_trait]
impl<C> ImageCatalog for Arc<C>
where
    C: ?Sized + ImageCatalog + Sync + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.deref().name()
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<Image>, StoreError> {
        self.deref().list(prefix).await
    }

    async fn get(&self, name: &str) -> Result<Image, StoreError> {
        self.deref().get(name).await
    }
}
