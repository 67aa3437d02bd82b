use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, SeekFrom};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::io::{self, AsyncRead, AsyncSeek, ReadBuf};
use tokio::sync::RwLock;

use crate::{
    ContentReader, ContentStore, Descriptor, Digest, Image, ImageCatalog, Info, StoreError,
    StoreErrorKind,
};

fn not_found(what: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotFound, format!("{what} not found"))
}

#[derive(Debug)]
struct MemoryBlob {
    created: DateTime<Utc>,
    data: Bytes,
}

/// Counts readers handed out by a [`MemoryContentStore`].
#[derive(Debug, Default)]
pub struct ReaderCounts {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl ReaderCounts {
    /// Readers opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Readers released so far.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Readers currently open.
    pub fn open(&self) -> usize {
        self.opened().saturating_sub(self.closed())
    }
}

#[derive(Debug)]
struct TrackedReader {
    inner: Cursor<Bytes>,
    counts: Arc<ReaderCounts>,
}

impl TrackedReader {
    fn new(data: Bytes, counts: Arc<ReaderCounts>) -> Self {
        counts.opened.fetch_add(1, Ordering::SeqCst);
        Self {
            inner: Cursor::new(data),
            counts,
        }
    }
}

impl Drop for TrackedReader {
    fn drop(&mut self) {
        self.counts.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl AsyncRead for TrackedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncSeek for TrackedReader {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.inner).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.inner).poll_complete(cx)
    }
}

/// Content store that keeps blobs in memory.
///
/// Readers are tracked so tests can check that every reader handed out was
/// released.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    blobs: RwLock<HashMap<Digest, MemoryBlob>>,
    readers: Arc<ReaderCounts>,
}

impl MemoryContentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a blob, returning its sha256 digest.
    pub async fn insert(&self, data: impl Into<Bytes>) -> Digest {
        let data = data.into();
        let digest = Digest::sha256(&data);
        let mut blobs = self.blobs.write().await;
        blobs.insert(
            digest.clone(),
            MemoryBlob {
                created: Utc::now(),
                data,
            },
        );
        digest
    }

    /// Remove a blob.
    pub async fn remove(&self, digest: &Digest) {
        self.blobs.write().await.remove(digest);
    }

    /// Open and close counts for readers handed out by this store.
    pub fn readers(&self) -> Arc<ReaderCounts> {
        self.readers.clone()
    }
}

#[async_trait::async_trait]
impl ContentStore for MemoryContentStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn info(&self, digest: &Digest) -> Result<Info, StoreError> {
        let blobs = self.blobs.read().await;
        let blob = blobs.get(digest).ok_or_else(|| {
            StoreError::builder(
                self.name(),
                StoreErrorKind::NotFound,
                not_found("blob"),
            )
            .digest(digest)
            .context("info")
            .build()
        })?;

        Ok(Info {
            digest: digest.clone(),
            size: blob.data.len() as u64,
            created: blob.created,
        })
    }

    async fn reader(&self, digest: &Digest) -> Result<ContentReader, StoreError> {
        let blobs = self.blobs.read().await;
        let blob = blobs.get(digest).ok_or_else(|| {
            StoreError::builder(
                self.name(),
                StoreErrorKind::NotFound,
                not_found("blob"),
            )
            .digest(digest)
            .context("reader")
            .build()
        })?;

        tracing::trace!(%digest, "open memory reader");
        Ok(ContentReader::new(
            blob.data.len() as u64,
            TrackedReader::new(blob.data.clone(), self.readers.clone()),
        ))
    }
}

/// Image catalog that keeps name to target mappings in memory.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    images: RwLock<BTreeMap<String, Descriptor>>,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Point `name` at `target`, replacing any previous target.
    pub async fn insert(&self, name: impl Into<String>, target: Descriptor) {
        self.images.write().await.insert(name.into(), target);
    }

    /// Remove an image name.
    pub async fn remove(&self, name: &str) {
        self.images.write().await.remove(name);
    }
}

#[async_trait::async_trait]
impl ImageCatalog for MemoryCatalog {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<Image>, StoreError> {
        tracing::trace!(?prefix, "list memory catalog");

        let images = self.images.read().await;
        Ok(images
            .iter()
            .filter(|(name, _)| prefix.map_or(true, |prefix| name.starts_with(prefix)))
            .map(|(name, target)| Image {
                name: name.clone(),
                target: target.clone(),
            })
            .collect())
    }

    async fn get(&self, name: &str) -> Result<Image, StoreError> {
        let images = self.images.read().await;
        let target = images.get(name).ok_or_else(|| {
            StoreError::builder(
                self.name(),
                StoreErrorKind::NotFound,
                not_found("image"),
            )
            .name(name)
            .build()
        })?;

        Ok(Image {
            name: name.to_owned(),
            target: target.clone(),
        })
    }
}
