//! API server builder and router

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use content_store::{
    Descriptor, Digest, MEDIA_TYPE_OCTET_STREAM, MemoryCatalog, MemoryContentStore, Store,
};
use futures::TryStreamExt as _;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::io::ReaderStream;

use crate::adapter::ContentRegistry;
use crate::backend::{BlobReader, RegistryBackend};
use crate::error::RegistryResult;
use crate::reference::{ReferenceError, valid_tag, validate_repository};

const DOCKER_CONTENT_DIGEST: HeaderName = HeaderName::from_static("docker-content-digest");
const DOCKER_API_VERSION: HeaderName =
    HeaderName::from_static("docker-distribution-api-version");

/// Registry builder for configuring and creating the registry service
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    store: Option<Store>,
}

impl RegistryBuilder {
    /// Create a new registry builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the content store to serve
    pub fn store(mut self, store: Store) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the registry service
    ///
    /// Without a configured store, an empty in-memory store is served.
    pub fn build(self) -> Router {
        let store = self.store.unwrap_or_else(|| {
            tracing::warn!("no content store configured, serving an empty registry");
            Store::new(MemoryContentStore::new(), MemoryCatalog::new())
        });

        router(ContentRegistry::new(store))
    }
}

/// Router serving the read-only registry API from any backend.
pub fn router<B: RegistryBackend>(backend: B) -> Router {
    Router::new()
        .route("/v2/", get(api_version_check))
        .route("/v2/_catalog", get(list_repositories::<B>))
        .route("/v2/{*path}", get(get_content::<B>).head(head_content::<B>))
        .with_state(Arc::new(backend))
}

/// API version check endpoint
async fn api_version_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(DOCKER_API_VERSION, "registry/2.0")],
        Json(json!({})),
    )
}

/// Pagination parameters for listings
#[derive(Debug, Default, Deserialize)]
struct Pagination {
    n: Option<usize>,
    last: Option<String>,
}

impl Pagination {
    /// Apply to a sorted listing, returning the page and the `last` value for
    /// the next page, if there is one.
    fn apply(&self, mut items: Vec<String>) -> (Vec<String>, Option<String>) {
        if let Some(last) = &self.last {
            items.retain(|item| item > last);
        }

        match self.n {
            Some(n) if items.len() > n => {
                items.truncate(n);
                let next = items.last().cloned();
                (items, next)
            }
            _ => (items, None),
        }
    }

    fn link(&self, path: &str, next: Option<String>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let (Some(n), Some(last)) = (self.n, next) {
            let link = format!("</v2/{path}?n={n}&last={last}>; rel=\"next\"");
            match HeaderValue::from_str(&link) {
                Ok(value) => {
                    headers.insert(header::LINK, value);
                }
                Err(error) => tracing::warn!(%link, %error, "unable to send pagination link"),
            }
        }
        headers
    }
}

#[derive(Debug, Serialize)]
struct Catalog {
    repositories: Vec<String>,
}

#[derive(Debug, Serialize)]
struct TagList {
    name: String,
    tags: Vec<String>,
}

async fn list_repositories<B: RegistryBackend>(
    State(backend): State<Arc<B>>,
    Query(page): Query<Pagination>,
) -> RegistryResult<Response> {
    let mut repositories: Vec<String> = backend.repositories().try_collect().await?;

    // `last` pagination needs sorted, distinct names from any backend.
    repositories.sort();
    repositories.dedup();

    let (repositories, next) = page.apply(repositories);
    Ok((
        page.link("_catalog", next),
        Json(Catalog { repositories }),
    )
        .into_response())
}

async fn list_tags<B: RegistryBackend>(
    backend: &B,
    name: String,
    page: &Pagination,
) -> RegistryResult<Response> {
    let tags: Vec<String> = backend.tags(&name).try_collect().await?;
    let (tags, next) = page.apply(tags);
    let headers = page.link(&format!("{name}/tags/list"), next);
    Ok((headers, Json(TagList { name, tags })).into_response())
}

/// What a request under `/v2/` addresses.
#[derive(Debug, PartialEq, Eq)]
enum Endpoint {
    Tags { name: String },
    Manifest { name: String, reference: ManifestReference },
    Blob { name: String, digest: Digest },
}

#[derive(Debug, PartialEq, Eq)]
enum ManifestReference {
    Digest(Digest),
    Tag(String),
}

impl Endpoint {
    /// Parse the path after `/v2/`. Unknown paths are `None`.
    fn parse(path: &str) -> RegistryResult<Option<Self>> {
        if let Some(name) = path.strip_suffix("/tags/list") {
            validate_repository(name)?;
            return Ok(Some(Endpoint::Tags {
                name: name.to_owned(),
            }));
        }

        let Some((rest, target)) = path.rsplit_once('/') else {
            return Ok(None);
        };
        let Some((name, kind)) = rest.rsplit_once('/') else {
            return Ok(None);
        };

        let endpoint = match kind {
            "manifests" => {
                let reference = if target.contains(':') {
                    ManifestReference::Digest(target.parse()?)
                } else if valid_tag(target) {
                    ManifestReference::Tag(target.to_owned())
                } else {
                    return Err(ReferenceError::InvalidTag(target.to_owned()).into());
                };
                Endpoint::Manifest {
                    name: name.to_owned(),
                    reference,
                }
            }
            "blobs" => Endpoint::Blob {
                name: name.to_owned(),
                digest: target.parse()?,
            },
            _ => return Ok(None),
        };

        validate_repository(name)?;
        Ok(Some(endpoint))
    }
}

/// Headers describing content: type, length and digest.
fn descriptor_headers(descriptor: &Descriptor) -> HeaderMap {
    let mut headers = HeaderMap::new();

    let media_type = descriptor.media_type().unwrap_or(MEDIA_TYPE_OCTET_STREAM);
    let content_type = HeaderValue::from_str(media_type).unwrap_or_else(|_| {
        tracing::warn!(%media_type, digest = %descriptor.digest, "media type is not a valid header");
        HeaderValue::from_static(MEDIA_TYPE_OCTET_STREAM)
    });
    headers.insert(header::CONTENT_TYPE, content_type);

    if let Some(size) = descriptor.size {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    }

    if let Ok(digest) = HeaderValue::from_str(descriptor.digest.as_str()) {
        headers.insert(DOCKER_CONTENT_DIGEST, digest);
    }

    headers
}

fn content_response<R: BlobReader + 'static>(reader: R) -> Response {
    let headers = descriptor_headers(reader.descriptor());
    (headers, Body::from_stream(ReaderStream::new(reader))).into_response()
}

async fn get_content<B: RegistryBackend>(
    State(backend): State<Arc<B>>,
    Path(path): Path<String>,
    Query(page): Query<Pagination>,
) -> RegistryResult<Response> {
    let Some(endpoint) = Endpoint::parse(&path)? else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };

    let reader = match endpoint {
        Endpoint::Tags { name } => return list_tags(backend.as_ref(), name, &page).await,
        Endpoint::Manifest {
            name,
            reference: ManifestReference::Digest(digest),
        } => backend.get_manifest(&name, &digest).await?,
        Endpoint::Manifest {
            name,
            reference: ManifestReference::Tag(tag),
        } => backend.get_tag(&name, &tag).await?,
        Endpoint::Blob { name, digest } => backend.get_blob(&name, &digest).await?,
    };

    Ok(content_response(reader))
}

async fn head_content<B: RegistryBackend>(
    State(backend): State<Arc<B>>,
    Path(path): Path<String>,
    Query(page): Query<Pagination>,
) -> RegistryResult<Response> {
    let Some(endpoint) = Endpoint::parse(&path)? else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };

    let descriptor = match endpoint {
        Endpoint::Tags { name } => return list_tags(backend.as_ref(), name, &page).await,
        Endpoint::Manifest {
            name,
            reference: ManifestReference::Digest(digest),
        } => backend.resolve_manifest(&name, &digest).await?,
        Endpoint::Manifest {
            name,
            reference: ManifestReference::Tag(tag),
        } => backend.resolve_tag(&name, &tag).await?,
        Endpoint::Blob { name, digest } => backend.resolve_blob(&name, &digest).await?,
    };

    Ok((StatusCode::OK, descriptor_headers(&descriptor)).into_response())
}
