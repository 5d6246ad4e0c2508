use super::{RegistryError, Result};

/// A parsed Docker-style image reference.
///
/// Accepts the usual shorthand forms: `nginx`, `nginx:1.25`,
/// `user/app:v1`, `ghcr.io/owner/repo:tag`, `localhost:8082/app@sha256:…`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry host, e.g. "docker.io" or "localhost:8082"
    pub registry: String,
    /// Repository path, e.g. "library/nginx"
    pub repository: String,
    pub tag: String,
    /// Takes precedence over the tag when present
    pub digest: Option<String>,
}

impl ImageReference {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(RegistryError::InvalidReference("empty reference".into()));
        }

        let (name, digest) = match input.split_once('@') {
            Some((name, digest)) => (name, Some(digest.to_string())),
            None => (input, None),
        };

        // The part before the first slash is a registry host only if
        // it looks like one (dot, port, or localhost); otherwise the
        // whole thing is a docker.io repository path.
        let (registry, rest) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first, rest)
            }
            _ => ("docker.io", name),
        };

        if rest.is_empty() {
            return Err(RegistryError::InvalidReference(format!(
                "no repository in {input:?}"
            )));
        }

        let (repository, tag) = match rest.rsplit_once(':') {
            Some((repository, tag)) => (repository.to_string(), tag.to_string()),
            None => (rest.to_string(), "latest".to_string()),
        };

        // Docker Hub official images live under "library/"
        let repository = if registry == "docker.io" && !repository.contains('/') {
            format!("library/{repository}")
        } else {
            repository
        };

        let registry = match registry {
            "index.docker.io" | "registry-1.docker.io" | "registry.hub.docker.com" => {
                "docker.io".to_string()
            }
            other => other.to_string(),
        };

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// The same repository pinned to a digest (used when a manifest
    /// list points at a platform-specific manifest).
    pub fn with_digest(&self, digest: &str) -> Self {
        Self {
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            tag: String::new(),
            digest: Some(digest.to_string()),
        }
    }

    /// Base URL of the distribution API for this registry.
    /// Registries with an explicit port (and bare localhost) are
    /// assumed to be plain HTTP.
    pub fn base_url(&self) -> String {
        if self.registry == "docker.io" {
            "https://registry-1.docker.io".to_string()
        } else if self.registry.contains(':') || self.registry == "localhost" {
            format!("http://{}", self.registry)
        } else {
            format!("https://{}", self.registry)
        }
    }

    /// What goes into the `/manifests/<…>` path segment.
    pub fn selector(&self) -> &str {
        self.digest.as_deref().unwrap_or(&self.tag)
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.digest {
            Some(digest) => write!(f, "{}/{}@{}", self.registry, self.repository, digest),
            None => write!(f, "{}/{}:{}", self.registry, self.repository, self.tag),
        }
    }
}

impl std::str::FromStr for ImageReference {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
