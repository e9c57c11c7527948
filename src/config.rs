//! Provider configuration, loaded from YAML or the environment.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ProvisionError;
use crate::retry::RetryPolicy;

pub const DEFAULT_API_URL: &str = "https://api.astra.datastax.com";
pub const DEFAULT_STREAMING_API_URL: &str = "https://api.astra.datastax.com";

const ENV_TOKEN: &str = "ASTRA_API_TOKEN";
const ENV_API_URL: &str = "ASTRA_API_URL";
const ENV_STREAMING_API_URL: &str = "ASTRA_STREAMING_API_URL";
const ENV_OPERATION_TIMEOUT: &str = "ASTRA_OPERATION_TIMEOUT_SECS";

/// Connection settings and retry policies for all provisioning operations.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Organisation-scoped API token.
    pub token: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_streaming_api_url")]
    pub streaming_api_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
    /// Waiting for the database to become active.
    #[serde(default = "default_status_retry")]
    pub status_retry: RetryPolicy,
    /// Waiting for a mutation to show up in (or drop out of) the listing.
    #[serde(default = "default_convergence_retry")]
    pub convergence_retry: RetryPolicy,
    /// Refreshing a streaming credential the mutation endpoint rejected.
    #[serde(default = "default_credential_retry")]
    pub credential_retry: RetryPolicy,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_streaming_api_url() -> String {
    DEFAULT_STREAMING_API_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_operation_timeout_secs() -> u64 {
    20 * 60
}

fn default_status_retry() -> RetryPolicy {
    RetryPolicy::until_deadline(Duration::from_secs(10))
}

fn default_convergence_retry() -> RetryPolicy {
    RetryPolicy::fixed(7, Duration::from_secs(20))
}

fn default_credential_retry() -> RetryPolicy {
    RetryPolicy::fixed(7, Duration::from_secs(20))
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("streaming_api_url", &self.streaming_api_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("operation_timeout_secs", &self.operation_timeout_secs)
            .field("status_retry", &self.status_retry)
            .field("convergence_retry", &self.convergence_retry)
            .field("credential_retry", &self.credential_retry)
            .finish()
    }
}

impl ProviderConfig {
    /// Config with default endpoints and policies.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_url: default_api_url(),
            streaming_api_url: default_streaming_api_url(),
            request_timeout_secs: default_request_timeout_secs(),
            operation_timeout_secs: default_operation_timeout_secs(),
            status_retry: default_status_retry(),
            convergence_retry: default_convergence_retry(),
            credential_retry: default_credential_retry(),
        }
    }

    /// Load from a YAML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
        let config: ProviderConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Build from `ASTRA_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let token = lookup(ENV_TOKEN).unwrap_or_default();
        let mut config = Self::new(token);
        if let Some(url) = lookup(ENV_API_URL) {
            config.api_url = url;
        }
        if let Some(url) = lookup(ENV_STREAMING_API_URL) {
            config.streaming_api_url = url;
        }
        if let Some(secs) = lookup(ENV_OPERATION_TIMEOUT) {
            config.operation_timeout_secs = secs
                .parse()
                .with_context(|| format!("Parsing {ENV_OPERATION_TIMEOUT}={secs}"))?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ProvisionError> {
        if self.token.trim().is_empty() {
            return Err(ProvisionError::Config(format!(
                "an API token is required (set {ENV_TOKEN})"
            )));
        }
        for (name, url) in [
            ("api_url", &self.api_url),
            ("streaming_api_url", &self.streaming_api_url),
        ] {
            url::Url::parse(url)
                .map_err(|e| ProvisionError::Config(format!("{name} '{url}' is invalid: {e}")))?;
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}
