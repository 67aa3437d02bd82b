//! Manifest media type discovery
//!
//! The content store does not record media types, but registry clients need
//! the right `Content-Type` for a manifest. Manifests are expected to declare
//! their own `mediaType`; anything that does not is refused rather than
//! served under a guessed type, since a guessed type lets one kind of content
//! be interpreted as another.

use content_store::{Descriptor, Digest, Store};
use serde::Deserialize;
use tokio::io::AsyncReadExt;

use crate::blob::BlobStream;
use crate::error::{RegistryError, RegistryResult};

/// Upper bound on the bytes read while looking for a manifest's media type.
pub const MAX_MANIFEST_SIZE: u64 = 4 * 1024 * 1024;

/// OCI image manifest.
pub const MEDIA_TYPE_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
/// OCI image index.
pub const MEDIA_TYPE_OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
/// Docker image manifest, schema 2.
pub const MEDIA_TYPE_DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
/// Docker manifest list.
pub const MEDIA_TYPE_DOCKER_MANIFEST_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

/// Only the top-level media type; every other field is skipped.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeclaredMediaType {
    #[serde(default)]
    media_type: Option<String>,
}

/// Open the manifest stored under `digest`, with its media type taken from
/// the manifest's own `mediaType` field.
#[tracing::instrument(skip(store))]
pub async fn open_manifest(store: &Store, digest: &Digest) -> RegistryResult<BlobStream> {
    let (size, media_type) = {
        let reader = store
            .reader(digest)
            .await
            .map_err(|err| RegistryError::manifest(digest, err))?;
        let size = reader.size();

        let mut data = Vec::new();
        reader
            .take(MAX_MANIFEST_SIZE + 1)
            .read_to_end(&mut data)
            .await?;

        (size, sniff_media_type(digest, &data)?)
    };

    tracing::debug!(%media_type, size, "sniffed manifest media type");
    BlobStream::new(store.clone(), Descriptor::new(digest.clone(), size, media_type))
        .await
        .map_err(|err| match err {
            // Removed from the store after it was sniffed.
            RegistryError::BlobNotFound(_) => RegistryError::ManifestNotFound(digest.to_string()),
            err => err,
        })
}

/// Extract the declared media type from the start of a manifest.
fn sniff_media_type(digest: &Digest, data: &[u8]) -> RegistryResult<String> {
    let malformed = |reason: String| RegistryError::MalformedManifest {
        digest: digest.clone(),
        reason,
    };

    if data.len() as u64 > MAX_MANIFEST_SIZE {
        return Err(malformed(format!(
            "manifest exceeds {MAX_MANIFEST_SIZE} bytes"
        )));
    }

    // Only the first JSON value counts, as with a streaming decoder.
    let declared = serde_json::Deserializer::from_slice(data)
        .into_iter::<DeclaredMediaType>()
        .next()
        .ok_or_else(|| malformed("empty manifest".into()))?
        .map_err(|err| malformed(err.to_string()))?;

    match declared.media_type {
        Some(media_type) if media_type.is_empty() => Err(malformed("missing mediaType".into())),
        Some(media_type) if !media_type.bytes().all(|b| b == b' ' || b.is_ascii_graphic()) => {
            Err(malformed(format!("invalid mediaType {media_type:?}")))
        }
        Some(media_type) => Ok(media_type),
        None => Err(malformed("missing mediaType".into())),
    }
}
