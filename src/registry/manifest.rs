use serde::{Deserialize, Serialize};

use super::Result;

// Media types from the OCI image spec and Docker's v2 schema. The
// Docker v2 manifest shares the OCI manifest's JSON shape, so both
// deserialize into `Manifest`.
pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_MANIFEST_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

/// Content descriptor — points at a blob by digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub digest: String,
    pub size: u64,
}

/// Image manifest: config pointer plus layer list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "mediaType")]
    pub media_type: Option<String>,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
}

impl Manifest {
    /// Declared size of everything the manifest points at.
    pub fn declared_blob_size(&self) -> u64 {
        self.config.size + self.layers.iter().map(|l| l.size).sum::<u64>()
    }
}

/// One entry of a multi-arch index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    #[serde(flatten)]
    pub descriptor: Descriptor,
    pub platform: Option<Platform>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
}

impl Platform {
    fn matches_current(&self) -> bool {
        let arch_match = match std::env::consts::ARCH {
            "x86_64" => self.architecture == "amd64" || self.architecture == "x86_64",
            "aarch64" => self.architecture == "arm64" || self.architecture == "aarch64",
            other => self.architecture == other,
        };
        arch_match && self.os == std::env::consts::OS
    }
}

/// OCI image index / Docker manifest list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestIndex {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    pub manifests: Vec<IndexEntry>,
}

impl ManifestIndex {
    /// Entry for the running platform, falling back to linux/amd64.
    pub fn select(&self) -> Option<&IndexEntry> {
        self.manifests
            .iter()
            .find(|e| {
                e.platform
                    .as_ref()
                    .map(Platform::matches_current)
                    .unwrap_or(false)
            })
            .or_else(|| {
                self.manifests.iter().find(|e| {
                    e.platform
                        .as_ref()
                        .map(|p| p.architecture == "amd64" && p.os == "linux")
                        .unwrap_or(false)
                })
            })
    }
}

/// What a `/manifests/` endpoint can answer with.
#[derive(Debug, Clone)]
pub enum ManifestDoc {
    Image(Manifest),
    Index(ManifestIndex),
}

/// Parse either manifest shape. Indexes are recognized by their
/// `manifests` array, so a missing or exotic mediaType still parses.
pub fn parse_manifest(data: &[u8]) -> Result<ManifestDoc> {
    #[derive(Deserialize)]
    struct Probe {
        manifests: Option<serde_json::Value>,
    }

    let probe: Probe = serde_json::from_slice(data)?;
    if probe.manifests.is_some() {
        Ok(ManifestDoc::Index(serde_json::from_slice(data)?))
    } else {
        Ok(ManifestDoc::Image(serde_json::from_slice(data)?))
    }
}

/// Image config blob — the slice of it this program reports on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub config: RuntimeConfig,
}

/// Runtime section of the config blob; keys are capitalized on the
/// wire per the image spec.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(rename = "Env", default)]
    pub env: Vec<String>,
    #[serde(rename = "Cmd", default)]
    pub cmd: Vec<String>,
    #[serde(rename = "Entrypoint", default)]
    pub entrypoint: Vec<String>,
}
