use std::sync::Arc;

use crate::config::RegistryConfig;
use crate::metrics::HttpMonitor;
use crate::registry::{RegistryClient, Result};
use crate::transport::{InstrumentedTransport, Transport};

// Function tags grouping metrics by scenario.
pub const FULL_IMAGE_FETCH: &str = "full_image_fetch";
pub const MANIFEST_PROBE: &str = "manifest_probe";

/// Each scenario gets its own instrumented transport (own function
/// tag) over the shared base transport and shared monitor.
fn client_for(
    tag: &str,
    config: &RegistryConfig,
    base: &Arc<dyn Transport>,
    monitor: &Arc<HttpMonitor>,
) -> RegistryClient {
    let transport = Arc::new(InstrumentedTransport::new(
        base.clone(),
        monitor.clone(),
        tag,
    ));
    RegistryClient::new(transport, config)
}

/// High-level flow: resolve, fetch the manifest, fetch the config,
/// then ask for the declared image size. Mirrors what a registry
/// client's "give me the whole image view" API does — several HTTP
/// round-trips behind one logical operation.
pub async fn full_image_fetch(
    config: &RegistryConfig,
    base: &Arc<dyn Transport>,
    monitor: &Arc<HttpMonitor>,
) -> Result<()> {
    println!("=== Starting scenario: {FULL_IMAGE_FETCH} ===");
    let client = client_for(FULL_IMAGE_FETCH, config, base, monitor);

    let image_ref = config.image_reference();
    println!("Parsing image reference: {image_ref}");
    let reference = client.resolve(&image_ref)?;
    println!("Parsed reference: {reference}");

    println!("Fetching manifest (manifest + config requests follow)...");
    let manifest = client.fetch_manifest(&reference).await?;
    println!("Manifest digest: {}", manifest.digest);
    println!("Manifest media type: {}", manifest.media_type());
    println!("Manifest schema version: {}", manifest.manifest.schema_version);
    println!("Number of layers: {}", manifest.manifest.layers.len());

    println!("Fetching image config...");
    let image_config = client.fetch_config(&reference).await?;
    println!("Image architecture: {}", image_config.architecture);
    println!("Image OS: {}", image_config.os);
    if !image_config.config.env.is_empty() {
        println!(
            "Environment variables: {} entries",
            image_config.config.env.len()
        );
    }

    // Size retrieval is best-effort; the scenario still succeeds
    match client.image_size(&reference).await {
        Ok(size) => println!("Image size: {size} bytes"),
        Err(e) => println!("⚠ failed to determine image size: {e}"),
    }

    println!("=== Completed scenario: {FULL_IMAGE_FETCH} ===");
    Ok(())
}

/// Targeted flow: resolve and fetch only the manifest, reporting the
/// raw descriptor view. Mirrors a registry client's lower-level
/// single-request API.
pub async fn manifest_probe(
    config: &RegistryConfig,
    base: &Arc<dyn Transport>,
    monitor: &Arc<HttpMonitor>,
) -> Result<()> {
    println!("=== Starting scenario: {MANIFEST_PROBE} ===");
    let client = client_for(MANIFEST_PROBE, config, base, monitor);

    let image_ref = config.image_reference();
    println!("Parsing image reference: {image_ref}");
    let reference = client.resolve(&image_ref)?;
    println!("Parsed reference: {reference}");

    println!("Fetching manifest (single targeted request)...");
    let manifest = client.fetch_manifest(&reference).await?;
    println!("Descriptor digest: {}", manifest.digest);
    println!("Descriptor media type: {}", manifest.media_type());
    println!("Raw manifest size: {} bytes", manifest.raw.len());
    println!("Manifest layers count: {}", manifest.manifest.layers.len());

    if let Some(first) = manifest.manifest.layers.first() {
        println!("First layer digest: {}", first.digest);
        println!("First layer size: {} bytes", first.size);
    }

    println!("=== Completed scenario: {MANIFEST_PROBE} ===");
    Ok(())
}
