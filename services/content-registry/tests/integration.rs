//! Integration tests for the content store registry

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use content_registry::{ContentRegistry, RegistryBackend, RegistryBuilder, RegistryError};
use content_store::{
    Descriptor, Digest, ImageCatalog, MemoryCatalog, MemoryContentStore, ReaderCounts, Store,
    StoreConfig,
};
use futures::TryStreamExt;
use http_body_util::BodyExt;
use tower::ServiceExt;

const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";

struct TestStore {
    content: Arc<MemoryContentStore>,
    catalog: Arc<MemoryCatalog>,
}

impl TestStore {
    fn new() -> Self {
        Self {
            content: Arc::new(MemoryContentStore::new()),
            catalog: Arc::new(MemoryCatalog::new()),
        }
    }

    fn store(&self) -> Store {
        Store::new(self.content.clone(), self.catalog.clone())
    }

    fn readers(&self) -> Arc<ReaderCounts> {
        self.content.readers()
    }

    fn registry(&self) -> axum::Router {
        RegistryBuilder::new().store(self.store()).build()
    }

    async fn tag(&self, name: &str, target: &Digest) {
        self.catalog
            .insert(name, Descriptor::from_digest(target.clone()))
            .await;
    }
}

/// A manifest of exactly `size` bytes declaring `media_type`.
fn manifest_of_size(media_type: &str, size: usize) -> Vec<u8> {
    let head = format!(r#"{{"mediaType":"{media_type}","schemaVersion":2,"annotations":{{"pad":""#);
    let tail = r#""}}"#;
    let padding = size - head.len() - tail.len();
    format!("{head}{}{tail}", "x".repeat(padding)).into_bytes()
}

async fn send(app: &axum::Router, method: &str, uri: &str) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_api_version_check() {
    let app = TestStore::new().registry();

    let response = send(&app, "GET", "/v2/").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("docker-distribution-api-version")
            .unwrap(),
        "registry/2.0"
    );
}

#[tokio::test]
async fn test_repositories_and_tags() {
    let store = TestStore::new();
    let d1 = store.content.insert(&b"one"[..]).await;
    let d2 = store.content.insert(&b"two"[..]).await;
    let d3 = store.content.insert(&b"three"[..]).await;
    store.tag("a/b:v1", &d1).await;
    store.tag("a/b:v2", &d2).await;
    store.tag(&format!("c/d@{d3}"), &d3).await;

    let registry = ContentRegistry::new(store.store());
    let repositories: Vec<_> = registry.repositories().try_collect().await.unwrap();
    assert_eq!(repositories, ["a/b", "c/d"]);

    let tags: Vec<_> = registry.tags("a/b").try_collect().await.unwrap();
    assert_eq!(tags, ["v1", "v2"]);
    for tag in &tags {
        assert!(store.catalog.get(&format!("a/b:{tag}")).await.is_ok());
    }

    let tags: Vec<_> = registry.tags("c/d").try_collect().await.unwrap();
    assert!(tags.is_empty());

    let app = store.registry();

    let response = send(&app, "GET", "/v2/_catalog").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"repositories": ["a/b", "c/d"]})
    );

    let response = send(&app, "GET", "/v2/a/b/tags/list").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"name": "a/b", "tags": ["v1", "v2"]})
    );

    let response = send(&app, "GET", "/v2/c/d/tags/list").await;
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"name": "c/d", "tags": []})
    );
}

#[tokio::test]
async fn test_repositories_out_of_catalog_order() {
    let store = TestStore::new();
    let digest = store.content.insert(&b"m"[..]).await;
    for name in [
        "a/b:v1",
        "a/b/c:v1",
        "a/b-c:v1",
        "localhost:1",
        "localhost:5000/app:x",
        "localhost:9",
    ] {
        store.tag(name, &digest).await;
    }

    let registry = ContentRegistry::new(store.store());
    let repositories: Vec<_> = registry.repositories().try_collect().await.unwrap();
    assert_eq!(
        repositories,
        ["a/b", "a/b-c", "a/b/c", "localhost", "localhost:5000/app"]
    );
}

#[tokio::test]
async fn test_catalog_pagination() {
    let store = TestStore::new();
    let digest = store.content.insert(&b"m"[..]).await;
    for name in ["a:v1", "b:v1", "b:v2", "c:v1"] {
        store.tag(name, &digest).await;
    }
    let app = store.registry();

    let response = send(&app, "GET", "/v2/_catalog?n=2").await;
    assert_eq!(
        response.headers().get(header::LINK).unwrap(),
        "</v2/_catalog?n=2&last=b>; rel=\"next\""
    );
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"repositories": ["a", "b"]})
    );

    let response = send(&app, "GET", "/v2/_catalog?n=2&last=b").await;
    assert!(response.headers().get(header::LINK).is_none());
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"repositories": ["c"]})
    );

    let response = send(&app, "GET", "/v2/b/tags/list?n=1").await;
    assert_eq!(
        response.headers().get(header::LINK).unwrap(),
        "</v2/b/tags/list?n=1&last=v1>; rel=\"next\""
    );
}

#[tokio::test]
async fn test_blob_without_media_type() {
    let store = TestStore::new();
    let data = vec![0x5a; 42];
    let digest = store.content.insert(data.clone()).await;

    let registry = ContentRegistry::new(store.store());
    let blob = registry.get_blob("a/b", &digest).await.unwrap();
    assert_eq!(
        blob.descriptor(),
        &Descriptor::new(digest.clone(), 42, "application/octet-stream")
    );
    drop(blob);

    let app = store.registry();
    let response = send(&app, "GET", &format!("/v2/a/b/blobs/{digest}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(
        headers.get(header::CONTENT_TYPE).unwrap(),
        "application/octet-stream"
    );
    assert_eq!(headers.get(header::CONTENT_LENGTH).unwrap(), "42");
    assert_eq!(
        headers.get("docker-content-digest").unwrap(),
        digest.as_str()
    );
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], &data[..]);

    let response = send(&app, "HEAD", &format!("/v2/x/y/blobs/{digest}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(header::CONTENT_LENGTH).unwrap(), "42");

    assert_eq!(store.readers().open(), 0);
}

#[tokio::test]
async fn test_manifest_media_type() {
    let store = TestStore::new();
    let manifest = manifest_of_size(OCI_MANIFEST, 128);
    assert_eq!(manifest.len(), 128);
    let digest = store.content.insert(manifest.clone()).await;
    store.tag("a/b:v1", &digest).await;

    let registry = ContentRegistry::new(store.store());
    let stream = registry.get_manifest("a/b", &digest).await.unwrap();
    assert_eq!(
        stream.descriptor(),
        &Descriptor::new(digest.clone(), 128, OCI_MANIFEST)
    );
    drop(stream);

    let app = store.registry();
    let response = send(&app, "GET", &format!("/v2/a/b/manifests/{digest}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        OCI_MANIFEST
    );
    assert_eq!(
        response.headers().get(header::CONTENT_LENGTH).unwrap(),
        "128"
    );
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], &manifest[..]);

    let response = send(&app, "GET", "/v2/a/b/manifests/v1").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("docker-content-digest").unwrap(),
        digest.as_str()
    );
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], &manifest[..]);

    let response = send(&app, "HEAD", "/v2/a/b/manifests/v1").await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(store.readers().open(), 0);
}

#[tokio::test]
async fn test_unknown_blob() {
    let store = TestStore::new();
    let unknown = Digest::sha256(b"unknown");

    let registry = ContentRegistry::new(store.store());
    let err = registry.get_blob("a/b", &unknown).await.unwrap_err();
    assert!(err.is_not_found());
    let err = registry.resolve_blob("a/b", &unknown).await.unwrap_err();
    assert!(matches!(err, RegistryError::BlobNotFound(_)));

    let app = store.registry();
    let response = send(&app, "GET", &format!("/v2/a/b/blobs/{unknown}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(response).await["errors"][0]["code"],
        "BLOB_UNKNOWN"
    );

    let response = send(&app, "HEAD", &format!("/v2/a/b/blobs/{unknown}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_manifest_errors() {
    let store = TestStore::new();
    let untyped = store.content.insert(&br#"{"schemaVersion":2}"#[..]).await;
    let app = store.registry();

    let response = send(&app, "GET", &format!("/v2/a/b/manifests/{untyped}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(response).await["errors"][0]["code"],
        "MANIFEST_UNKNOWN"
    );

    let response = send(&app, "GET", "/v2/a/b/manifests/missing").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(response).await["errors"][0]["code"],
        "MANIFEST_UNKNOWN"
    );

    assert_eq!(store.readers().open(), 0);
}

#[tokio::test]
async fn test_invalid_requests() {
    let app = TestStore::new().registry();

    let response = send(&app, "GET", "/v2/a/b/blobs/sha256:short").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["errors"][0]["code"],
        "DIGEST_INVALID"
    );

    let response = send(&app, "GET", "/v2/Bad/Name/tags/list").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["errors"][0]["code"],
        "NAME_INVALID"
    );

    let response = send(&app, "GET", "/v2/a/b/uploads/").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, "DELETE", "/v2/a/b/manifests/v1").await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_local_layout() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    let manifest = manifest_of_size(OCI_MANIFEST, 256);
    let digest = Digest::sha256(&manifest);
    let blobs = root.join("blobs").join(digest.algorithm());
    std::fs::create_dir_all(&blobs).unwrap();
    std::fs::write(blobs.join(digest.encoded()), &manifest).unwrap();

    let index = serde_json::json!({
        "schemaVersion": 2,
        "manifests": [{
            "mediaType": OCI_MANIFEST,
            "digest": digest,
            "size": manifest.len(),
            "annotations": {"io.containerd.image.name": "docker.io/library/alpine:3.20"}
        }]
    });
    std::fs::write(
        root.join("index.json"),
        serde_json::to_vec(&index).unwrap(),
    )
    .unwrap();

    let store = StoreConfig::Local {
        root: root.to_str().unwrap().into(),
        index: None,
    }
    .build()
    .await
    .unwrap();
    let app = RegistryBuilder::new().store(store).build();

    let response = send(&app, "GET", "/v2/_catalog").await;
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"repositories": ["docker.io/library/alpine"]})
    );

    let response = send(&app, "GET", "/v2/docker.io/library/alpine/manifests/3.20").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        OCI_MANIFEST
    );
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], &manifest[..]);
}
