//! Minimal OCI distribution client: resolve a reference, fetch a
//! manifest, fetch the config blob. Every request goes through the
//! `Transport` the client is constructed with — that pluggable
//! transport is the sole extension point, and it is where the
//! monitoring decorator slots in.

mod client;
mod manifest;
mod reference;

pub use client::{ManifestResponse, RegistryClient};
pub use manifest::{Descriptor, ImageConfig, Manifest};
pub use reference::ImageReference;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("invalid image reference: {0}")]
    InvalidReference(String),

    #[error(transparent)]
    Transport(#[from] crate::transport::TransportError),

    #[error("could not build request: {0}")]
    Request(String),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("failed to decode registry response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("no matching platform in manifest list")]
    NoMatchingPlatform,

    #[error("manifest index resolved to another index")]
    NestedIndex,
}

pub type Result<T> = std::result::Result<T, RegistryError>;
