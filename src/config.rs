use clap::Parser;

/// Explicit configuration for the probe run. Everything the
/// orchestrator and registry adapter need travels through this struct;
/// nothing is read from globals past startup.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "registry-probe",
    about = "Fetches an image manifest/config two ways while monitoring every HTTP call"
)]
pub struct RegistryConfig {
    /// Registry host, with port if any
    #[arg(long, default_value = "localhost:8082")]
    pub registry: String,

    /// Image repository name
    #[arg(long, default_value = "nexus-test")]
    pub image: String,

    /// Image tag
    #[arg(long, default_value = "latest")]
    pub tag: String,

    /// Basic-auth username; empty disables authentication
    #[arg(long, env = "REGISTRY_PROBE_USERNAME", default_value = "admin")]
    pub username: String,

    /// Basic-auth password
    #[arg(
        long,
        env = "REGISTRY_PROBE_PASSWORD",
        default_value = "admin123",
        hide_env_values = true
    )]
    pub password: String,

    /// Also emit the aggregate summary as JSON after the report
    #[arg(long)]
    pub summary_json: bool,
}

impl RegistryConfig {
    /// The full reference string both scenarios resolve.
    pub fn image_reference(&self) -> String {
        format!("{}/{}:{}", self.registry, self.image, self.tag)
    }

    /// Credentials for the registry adapter, if configured.
    pub fn credentials(&self) -> Option<(String, String)> {
        if self.username.is_empty() {
            None
        } else {
            Some((self.username.clone(), self.password.clone()))
        }
    }

    /// Safe-to-log form of the credentials. The password never
    /// appears in full anywhere in the output.
    pub fn redacted_credentials(&self) -> String {
        if self.username.is_empty() {
            return "<none>".into();
        }
        let shown: String = self.password.chars().take(2).collect();
        format!("{}/{}***", self.username, shown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RegistryConfig {
        RegistryConfig {
            registry: "localhost:8082".into(),
            image: "nexus-test".into(),
            tag: "latest".into(),
            username: "admin".into(),
            password: "admin123".into(),
            summary_json: false,
        }
    }

    #[test]
    fn image_reference_joins_the_parts() {
        assert_eq!(config().image_reference(), "localhost:8082/nexus-test:latest");
    }

    #[test]
    fn redaction_never_reveals_the_full_password() {
        let redacted = config().redacted_credentials();
        assert!(!redacted.contains("admin123"));
        assert_eq!(redacted, "admin/ad***");
    }

    #[test]
    fn empty_username_disables_auth() {
        let mut c = config();
        c.username.clear();
        assert!(c.credentials().is_none());
        assert_eq!(c.redacted_credentials(), "<none>");
    }
}
