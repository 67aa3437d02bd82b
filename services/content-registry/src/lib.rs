//! # Content store registry
//!
//! Serves the contents of a digest-addressed content store and its image
//! catalog over the read-only part of the
//! [OCI Distribution Specification](https://github.com/opencontainers/distribution-spec).
//!
//! The store only knows blobs by digest, and the catalog only knows fully
//! qualified image names. This crate translates between those and the
//! registry's view of repositories, tags, manifests and blobs:
//!
//! - repositories and tags are recovered by parsing catalog names,
//! - blob descriptors are completed with sizes from the store,
//! - manifests are served under the media type they declare themselves.
//!
//! ## Example
//!
//! ```no_run
//! use content_registry::RegistryBuilder;
//! use content_store::StoreConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = StoreConfig::Memory.build().await?;
//! let registry = RegistryBuilder::new().store(store).build();
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:5000").await?;
//! axum::serve(listener, registry).await?;
//! # Ok(())
//! # }
//! ```

mod adapter;
mod api;
mod backend;
mod blob;
mod catalog;
mod descriptor;
mod error;
mod manifest;
pub mod reference;

pub use adapter::ContentRegistry;
pub use api::{RegistryBuilder, router};
pub use backend::{BlobReader, Iter, RegistryBackend};
pub use blob::{BlobStream, StreamState};
pub use descriptor::complete;
pub use error::{RegistryError, RegistryResult};
pub use manifest::{
    MAX_MANIFEST_SIZE, MEDIA_TYPE_DOCKER_MANIFEST, MEDIA_TYPE_DOCKER_MANIFEST_LIST,
    MEDIA_TYPE_OCI_INDEX, MEDIA_TYPE_OCI_MANIFEST, open_manifest,
};
pub use reference::{Reference, ReferenceError};
