use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::Method;
use sha2::{Digest, Sha256};

use super::manifest::{
    parse_manifest, ImageConfig, Manifest, ManifestDoc, DOCKER_MANIFEST_LIST, DOCKER_MANIFEST_V2,
    OCI_INDEX, OCI_MANIFEST,
};
use super::{ImageReference, RegistryError, Result};
use crate::config::RegistryConfig;
use crate::transport::Transport;

/// A fetched manifest together with what the wire said about it.
#[derive(Debug, Clone)]
pub struct ManifestResponse {
    pub manifest: Manifest,
    /// From the `docker-content-digest` header, else sha256 of the body
    pub digest: String,
    /// Raw manifest bytes as served
    pub raw: Vec<u8>,
}

impl ManifestResponse {
    pub fn media_type(&self) -> &str {
        self.manifest.media_type.as_deref().unwrap_or(OCI_MANIFEST)
    }
}

/// OCI distribution client over a pluggable transport.
///
/// Credentials are attached here, when each request is built, so the
/// transport chain only ever observes a finished request.
pub struct RegistryClient {
    transport: Arc<dyn Transport>,
    credentials: Option<(String, String)>,
    user_agent: String,
}

impl RegistryClient {
    pub fn new(transport: Arc<dyn Transport>, config: &RegistryConfig) -> Self {
        Self {
            transport,
            credentials: config.credentials(),
            user_agent: format!("registry-probe/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Parse an image reference string into a handle for the other
    /// operations.
    pub fn resolve(&self, reference: &str) -> Result<ImageReference> {
        ImageReference::parse(reference)
    }

    /// GET `/v2/<repo>/manifests/<selector>`. A multi-arch index is
    /// followed to the entry for the running platform (one more
    /// monitored request). An index entry must resolve to an image
    /// manifest — a registry answering with another index is rejected
    /// rather than followed.
    pub async fn fetch_manifest(&self, reference: &ImageReference) -> Result<ManifestResponse> {
        self.fetch_manifest_inner(reference, true).await
    }

    async fn fetch_manifest_inner(
        &self,
        reference: &ImageReference,
        follow_index: bool,
    ) -> Result<ManifestResponse> {
        let url = format!(
            "{}/v2/{}/manifests/{}",
            reference.base_url(),
            reference.repository,
            reference.selector()
        );
        let accept = [
            OCI_MANIFEST,
            OCI_INDEX,
            DOCKER_MANIFEST_V2,
            DOCKER_MANIFEST_LIST,
        ]
        .join(", ");

        let response = self.get(&url, &accept).await?;

        let header_digest = response
            .headers()
            .get("docker-content-digest")
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);

        let raw = response
            .bytes()
            .await
            .map_err(crate::transport::TransportError::from)?
            .to_vec();

        let digest =
            header_digest.unwrap_or_else(|| format!("sha256:{:x}", Sha256::digest(&raw)));

        match parse_manifest(&raw)? {
            ManifestDoc::Image(manifest) => Ok(ManifestResponse {
                manifest,
                digest,
                raw,
            }),
            ManifestDoc::Index(index) if follow_index => {
                let entry = index.select().ok_or(RegistryError::NoMatchingPlatform)?;
                let pinned = reference.with_digest(&entry.descriptor.digest);
                Box::pin(self.fetch_manifest_inner(&pinned, false)).await
            }
            ManifestDoc::Index(_) => Err(RegistryError::NestedIndex),
        }
    }

    /// Fetch and decode the image config. Issues its own manifest
    /// request to find the config digest, so a fresh handle is enough.
    pub async fn fetch_config(&self, reference: &ImageReference) -> Result<ImageConfig> {
        let manifest = self.fetch_manifest(reference).await?;
        let data = self
            .fetch_blob(reference, &manifest.manifest.config.digest)
            .await?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// GET a blob by digest, verifying the content hash.
    pub async fn fetch_blob(&self, reference: &ImageReference, digest: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}/v2/{}/blobs/{}",
            reference.base_url(),
            reference.repository,
            digest
        );

        let response = self.get(&url, "*/*").await?;
        let data = response
            .bytes()
            .await
            .map_err(crate::transport::TransportError::from)?
            .to_vec();

        let actual = format!("sha256:{:x}", Sha256::digest(&data));
        if digest.starts_with("sha256:") && actual != digest {
            return Err(RegistryError::DigestMismatch {
                expected: digest.to_string(),
                actual,
            });
        }

        Ok(data)
    }

    /// Total declared image size: manifest bytes plus the config and
    /// layer sizes the manifest declares.
    pub async fn image_size(&self, reference: &ImageReference) -> Result<u64> {
        let response = self.fetch_manifest(reference).await?;
        Ok(response.raw.len() as u64 + response.manifest.declared_blob_size())
    }

    // ── Request plumbing ────────────────────────────────────────

    async fn get(&self, url: &str, accept: &str) -> Result<reqwest::Response> {
        let request = self.build_get(url, accept)?;
        let response = self.transport.execute(request).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    fn build_get(&self, url: &str, accept: &str) -> Result<reqwest::Request> {
        let url: reqwest::Url = url
            .parse()
            .map_err(|e| RegistryError::Request(format!("invalid url {url:?}: {e}")))?;
        let mut request = reqwest::Request::new(Method::GET, url);

        let headers = request.headers_mut();
        headers.insert(USER_AGENT, header_value(&self.user_agent)?);
        headers.insert(ACCEPT, header_value(accept)?);
        if let Some((user, pass)) = &self.credentials {
            let token = BASE64.encode(format!("{user}:{pass}"));
            headers.insert(AUTHORIZATION, header_value(&format!("Basic {token}"))?);
        }

        Ok(request)
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| RegistryError::Request(format!("invalid header value: {e}")))
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::HttpMonitor;
    use crate::transport::{InstrumentedTransport, ReqwestTransport};

    const MANIFEST_JSON: &str = r#"{
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.manifest.v1+json",
        "config": {
            "mediaType": "application/vnd.oci.image.config.v1+json",
            "digest": "sha256:cfg",
            "size": 100
        },
        "layers": [
            { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip",
              "digest": "sha256:l1", "size": 900 }
        ]
    }"#;

    fn test_config() -> RegistryConfig {
        RegistryConfig {
            registry: "ignored".into(),
            image: "ignored".into(),
            tag: "latest".into(),
            username: "admin".into(),
            password: "admin123".into(),
            summary_json: false,
        }
    }

    fn monitored_client(monitor: &Arc<HttpMonitor>, tag: &str) -> RegistryClient {
        let base = Arc::new(ReqwestTransport::new().unwrap());
        let transport = Arc::new(InstrumentedTransport::new(base, monitor.clone(), tag));
        RegistryClient::new(transport, &test_config())
    }

    #[tokio::test]
    async fn fetch_manifest_parses_and_records_one_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/demo/app/manifests/latest")
            .match_header("authorization", mockito::Matcher::Regex("^Basic ".into()))
            .with_status(200)
            .with_header("content-type", OCI_MANIFEST)
            .with_header("docker-content-digest", "sha256:feedface")
            .with_body(MANIFEST_JSON)
            .create_async()
            .await;

        let monitor = Arc::new(HttpMonitor::new());
        let client = monitored_client(&monitor, "manifest_test");

        let reference = ImageReference::parse(&format!(
            "{}/demo/app:latest",
            server.host_with_port()
        ))
        .unwrap();
        let response = client.fetch_manifest(&reference).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.digest, "sha256:feedface");
        assert_eq!(response.manifest.layers.len(), 1);
        assert_eq!(response.media_type(), OCI_MANIFEST);

        let records = monitor.all();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].method, "GET");
        assert_eq!(records[0].status, Some(200));
        assert_eq!(
            records[0].response_bytes,
            Some(MANIFEST_JSON.len() as u64)
        );
        assert!(records[0].url.ends_with("/v2/demo/app/manifests/latest"));
        // The basic-auth header went over the wire but is only
        // snapshotted, never printed; the record itself holds it.
        assert!(records[0].headers.contains_key("user-agent"));
    }

    #[tokio::test]
    async fn auth_failure_surfaces_as_status_and_is_recorded() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/demo/app/manifests/latest")
            .with_status(401)
            .with_body("unauthorized")
            .create_async()
            .await;

        let monitor = Arc::new(HttpMonitor::new());
        let client = monitored_client(&monitor, "auth_test");

        let reference = ImageReference::parse(&format!(
            "{}/demo/app:latest",
            server.host_with_port()
        ))
        .unwrap();

        match client.fetch_manifest(&reference).await {
            Err(RegistryError::Status { status, .. }) => assert_eq!(status, 401),
            other => panic!("expected Status error, got {other:?}"),
        }

        let records = monitor.all();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, Some(401));
        assert!(records[0].error.is_none());
    }

    fn index_json(digest: &str) -> String {
        format!(
            r#"{{
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.index.v1+json",
            "manifests": [
                {{ "mediaType": "application/vnd.oci.image.manifest.v1+json",
                   "digest": "{digest}", "size": 1,
                   "platform": {{ "architecture": "amd64", "os": "linux" }} }}
            ]
        }}"#
        )
    }

    #[tokio::test]
    async fn index_is_followed_to_the_platform_manifest() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/demo/app/manifests/latest")
            .with_status(200)
            .with_body(index_json("sha256:inner"))
            .create_async()
            .await;
        server
            .mock("GET", "/v2/demo/app/manifests/sha256:inner")
            .with_status(200)
            .with_body(MANIFEST_JSON)
            .create_async()
            .await;

        let monitor = Arc::new(HttpMonitor::new());
        let client = monitored_client(&monitor, "index_test");
        let reference = ImageReference::parse(&format!(
            "{}/demo/app:latest",
            server.host_with_port()
        ))
        .unwrap();

        let response = client.fetch_manifest(&reference).await.unwrap();
        assert_eq!(response.manifest.layers.len(), 1);
        // Both the index and the pinned manifest were monitored
        assert_eq!(monitor.all().len(), 2);
    }

    #[tokio::test]
    async fn index_pointing_at_another_index_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/demo/app/manifests/latest")
            .with_status(200)
            .with_body(index_json("sha256:inner"))
            .create_async()
            .await;
        // The "inner" manifest is itself an index pointing back at
        // itself — following it blindly would never terminate
        server
            .mock("GET", "/v2/demo/app/manifests/sha256:inner")
            .with_status(200)
            .with_body(index_json("sha256:inner"))
            .create_async()
            .await;

        let monitor = Arc::new(HttpMonitor::new());
        let client = monitored_client(&monitor, "nested_index_test");
        let reference = ImageReference::parse(&format!(
            "{}/demo/app:latest",
            server.host_with_port()
        ))
        .unwrap();

        match client.fetch_manifest(&reference).await {
            Err(RegistryError::NestedIndex) => {}
            other => panic!("expected NestedIndex, got {other:?}"),
        }
        // Exactly two requests went out before giving up
        assert_eq!(monitor.all().len(), 2);
    }

    #[tokio::test]
    async fn fetch_blob_verifies_digest() {
        let body = b"config-bytes".to_vec();
        let good_digest = format!("sha256:{:x}", Sha256::digest(&body));

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", format!("/v2/demo/app/blobs/{good_digest}").as_str())
            .with_status(200)
            .with_body(body.clone())
            .create_async()
            .await;
        server
            .mock("GET", "/v2/demo/app/blobs/sha256:wrong")
            .with_status(200)
            .with_body(body.clone())
            .create_async()
            .await;

        let monitor = Arc::new(HttpMonitor::new());
        let client = monitored_client(&monitor, "blob_test");
        let reference = ImageReference::parse(&format!(
            "{}/demo/app:latest",
            server.host_with_port()
        ))
        .unwrap();

        let data = client.fetch_blob(&reference, &good_digest).await.unwrap();
        assert_eq!(data, body);

        match client.fetch_blob(&reference, "sha256:wrong").await {
            Err(RegistryError::DigestMismatch { .. }) => {}
            other => panic!("expected DigestMismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn image_size_sums_manifest_and_declared_blobs() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/demo/app/manifests/latest")
            .with_status(200)
            .with_body(MANIFEST_JSON)
            .create_async()
            .await;

        let monitor = Arc::new(HttpMonitor::new());
        let client = monitored_client(&monitor, "size_test");
        let reference = ImageReference::parse(&format!(
            "{}/demo/app:latest",
            server.host_with_port()
        ))
        .unwrap();

        let size = client.image_size(&reference).await.unwrap();
        assert_eq!(size, MANIFEST_JSON.len() as u64 + 100 + 900);
    }
}
