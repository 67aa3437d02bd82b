use serde::{Deserialize, Serialize};

use crate::Digest;

/// Media type assigned to blobs whose type is not otherwise known.
pub const MEDIA_TYPE_OCTET_STREAM: &str = "application/octet-stream";

/// Describes a blob by digest, with optional size and media type.
///
/// The content store only indexes by digest, so descriptors built from a
/// bare digest start without size or media type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// The declared media type of the blob.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    /// The digest addressing the blob in the content store.
    pub digest: Digest,

    /// The size of the blob in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl Descriptor {
    /// A descriptor carrying only a digest.
    pub fn from_digest(digest: Digest) -> Self {
        Self {
            media_type: None,
            digest,
            size: None,
        }
    }

    /// A descriptor with every field set.
    pub fn new(digest: Digest, size: u64, media_type: impl Into<String>) -> Self {
        Self {
            media_type: Some(media_type.into()),
            digest,
            size: Some(size),
        }
    }

    /// The media type, when set to a non-empty value.
    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref().filter(|media| !media.is_empty())
    }
}

impl From<Digest> for Descriptor {
    fn from(digest: Digest) -> Self {
        Descriptor::from_digest(digest)
    }
}
