//! Registry server over an in-memory content store
//!
//! Run with: cargo run -p content-registry --features cli --example basic_server

use content_registry::RegistryBuilder;
use content_store::{Descriptor, MemoryCatalog, MemoryContentStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let content = MemoryContentStore::new();
    let catalog = MemoryCatalog::new();

    // One image with an empty config and no layers.
    let config = content.insert(&b"{}"[..]).await;
    let manifest = serde_json::json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.manifest.v1+json",
        "config": {
            "mediaType": "application/vnd.oci.empty.v1+json",
            "digest": config,
            "size": 2,
        },
        "layers": [],
    });
    let manifest = content.insert(serde_json::to_vec(&manifest)?).await;
    catalog
        .insert("example.local/hello:latest", Descriptor::from_digest(manifest))
        .await;

    let app = RegistryBuilder::new()
        .store(Store::new(content, catalog))
        .build();

    let addr = "127.0.0.1:5000";
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Registry listening on http://{}", addr);
    tracing::info!("Try: curl http://{}/v2/example.local/hello/tags/list", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
