//! Descriptor completion

use content_store::{Descriptor, MEDIA_TYPE_OCTET_STREAM, Store};

use crate::error::{RegistryError, RegistryResult};

/// Fill in the size and media type of a descriptor from the content store.
///
/// The store is always consulted, so a digest it does not hold fails with
/// [`RegistryError::BlobNotFound`] even when the descriptor is already
/// complete. Fields that are already set are left untouched; an unknown
/// media type becomes `application/octet-stream`.
#[tracing::instrument(level = "debug", skip_all, fields(digest = %descriptor.digest))]
pub async fn complete(store: &Store, mut descriptor: Descriptor) -> RegistryResult<Descriptor> {
    let info = store
        .info(&descriptor.digest)
        .await
        .map_err(|err| RegistryError::blob(&descriptor.digest, err))?;

    if descriptor.size.is_none() {
        descriptor.size = Some(info.size);
    }

    if descriptor.media_type().is_none() {
        descriptor.media_type = Some(MEDIA_TYPE_OCTET_STREAM.to_owned());
    }

    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;

    use content_store::{Digest, MemoryCatalog, MemoryContentStore};

    async fn store_with(data: &'static [u8]) -> (Store, Digest) {
        let content = MemoryContentStore::new();
        let digest = content.insert(data).await;
        (Store::new(content, MemoryCatalog::new()), digest)
    }

    #[tokio::test]
    async fn digest_only() {
        let (store, digest) = store_with(&[0u8; 42]).await;

        let descriptor = complete(&store, Descriptor::from_digest(digest.clone()))
            .await
            .unwrap();
        assert_eq!(
            descriptor,
            Descriptor::new(digest, 42, "application/octet-stream")
        );
    }

    #[tokio::test]
    async fn keeps_declared_fields() {
        let (store, digest) = store_with(b"{}").await;

        let declared = Descriptor {
            media_type: Some("application/vnd.oci.empty.v1+json".into()),
            digest: digest.clone(),
            size: None,
        };
        let descriptor = complete(&store, declared).await.unwrap();
        assert_eq!(
            descriptor.media_type(),
            Some("application/vnd.oci.empty.v1+json")
        );
        assert_eq!(descriptor.size, Some(2));
    }

    #[tokio::test]
    async fn idempotent() {
        let (store, digest) = store_with(b"payload").await;

        let once = complete(&store, Descriptor::from_digest(digest))
            .await
            .unwrap();
        let twice = complete(&store, once.clone()).await.unwrap();
        assert_eq!(once, twice);

        // Already-complete descriptors are never rewritten, even if they
        // disagree with the store.
        let declared = Descriptor::new(once.digest.clone(), 1, "text/plain");
        assert_eq!(complete(&store, declared.clone()).await.unwrap(), declared);
    }

    #[tokio::test]
    async fn unknown_digest() {
        let (store, _) = store_with(b"present").await;
        let missing = Digest::sha256(b"absent");

        let err = complete(&store, Descriptor::from_digest(missing.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::BlobNotFound(digest) if digest == missing));
    }
}
