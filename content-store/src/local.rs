use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use eyre::eyre;
use serde::Deserialize;

use crate::{
    ContentReader, ContentStore, Descriptor, Digest, Image, ImageCatalog, Info, StoreError,
    StoreErrorKind,
};

/// Annotation containerd uses to record the full image name.
pub const ANNOTATION_CONTAINERD_NAME: &str = "io.containerd.image.name";

/// Annotation from the OCI image layout specification naming an entry.
pub const ANNOTATION_REF_NAME: &str = "org.opencontainers.image.ref.name";

/// Content store reading blobs from a directory laid out the way containerd
/// stores content: `<root>/blobs/<algorithm>/<encoded>`.
#[derive(Debug)]
pub struct LocalContentStore {
    root: Utf8PathBuf,
}

impl LocalContentStore {
    /// Create a store rooted at `root`.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory of the store.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn path(&self, digest: &Digest) -> Utf8PathBuf {
        let mut path = self.root.join("blobs");
        path.push(digest.algorithm());
        path.push(digest.encoded());
        path
    }

    fn error(&self, digest: &Digest, context: &str, err: std::io::Error) -> StoreError {
        StoreError::builder(self.name(), err.kind().into(), err)
            .digest(digest)
            .context(context)
            .build()
    }
}

#[async_trait::async_trait]
impl ContentStore for LocalContentStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn info(&self, digest: &Digest) -> Result<Info, StoreError> {
        let path = self.path(digest);
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|err| self.error(digest, "metadata", err))?;

        if !metadata.is_file() {
            return Err(StoreError::builder(
                self.name(),
                StoreErrorKind::NotFound,
                eyre!("{path} is not a file"),
            )
            .digest(digest)
            .build());
        }

        let created = metadata
            .created()
            .or_else(|_| metadata.modified())
            .map_err(|err| self.error(digest, "timestamp", err))?;

        Ok(Info {
            digest: digest.clone(),
            size: metadata.len(),
            created: created.into(),
        })
    }

    async fn reader(&self, digest: &Digest) -> Result<ContentReader, StoreError> {
        let path = self.path(digest);
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|err| self.error(digest, "open", err))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|err| self.error(digest, "metadata", err))?;

        tracing::trace!(%digest, %path, "open local reader");
        Ok(ContentReader::new(metadata.len(), file))
    }
}

#[derive(Debug, Deserialize)]
struct ImageIndex {
    #[serde(default)]
    manifests: Vec<IndexEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexEntry {
    #[serde(flatten)]
    descriptor: Descriptor,

    #[serde(default)]
    annotations: BTreeMap<String, String>,
}

impl IndexEntry {
    fn into_image(self) -> Option<Image> {
        let name = self
            .annotations
            .get(ANNOTATION_CONTAINERD_NAME)
            .or_else(|| self.annotations.get(ANNOTATION_REF_NAME))?
            .clone();

        Some(Image {
            name,
            target: self.descriptor,
        })
    }
}

/// Image catalog backed by an OCI image layout `index.json`.
///
/// The index is re-read on every call, so changes on disk are visible to the
/// next request.
#[derive(Debug)]
pub struct LayoutCatalog {
    index: Utf8PathBuf,
}

impl LayoutCatalog {
    /// Create a catalog reading the given `index.json`.
    pub fn new(index: impl Into<Utf8PathBuf>) -> Self {
        Self {
            index: index.into(),
        }
    }

    #[tracing::instrument(skip(self), fields(index = %self.index))]
    async fn images(&self) -> Result<BTreeMap<String, Descriptor>, StoreError> {
        let data = tokio::fs::read(&self.index).await.map_err(|err| {
            StoreError::builder(self.name(), err.kind().into(), err)
                .context(format!("read {}", self.index))
                .build()
        })?;

        let index: ImageIndex = serde_json::from_slice(&data).map_err(|err| {
            StoreError::builder(self.name(), StoreErrorKind::Serialization, err)
                .context(format!("parse {}", self.index))
                .build()
        })?;

        let mut images = BTreeMap::new();
        for image in index.manifests.into_iter().filter_map(IndexEntry::into_image) {
            images.entry(image.name).or_insert(image.target);
        }
        Ok(images)
    }
}

#[async_trait::async_trait]
impl ImageCatalog for LayoutCatalog {
    fn name(&self) -> &'static str {
        "layout"
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<Image>, StoreError> {
        let images = self.images().await?;
        Ok(images
            .into_iter()
            .filter(|(name, _)| prefix.map_or(true, |prefix| name.starts_with(prefix)))
            .map(|(name, target)| Image { name, target })
            .collect())
    }

    async fn get(&self, name: &str) -> Result<Image, StoreError> {
        let mut images = self.images().await?;
        let target = images.remove(name).ok_or_else(|| {
            StoreError::builder(
                self.name(),
                StoreErrorKind::NotFound,
                eyre!("image {name} not found in {}", self.index),
            )
            .name(name)
            .build()
        })?;

        Ok(Image {
            name: name.to_owned(),
            target,
        })
    }
}
