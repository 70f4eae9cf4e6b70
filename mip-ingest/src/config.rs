//! Configuration for mip-ingest
//!
//! Bootstrap settings come from `mip-ingest.toml` (see
//! [`mip_common::config::resolve_config_path`]); every field has a built-in
//! default. The provider API key additionally resolves from the
//! environment, which takes priority over the file.

use mip_common::config::{default_data_dir, load_toml_or_default, LoggingConfig};
use mip_common::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::services::readiness_poller::PollPolicy;

/// Configuration file name looked up in the platform config dir
pub const CONFIG_FILE_NAME: &str = "mip-ingest.toml";

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "MIP_CONFIG";

/// Environment variable holding the provider API key
pub const API_KEY_ENV_VAR: &str = "MIP_PROVIDER_API_KEY";

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// HTTP listen address
    pub bind: String,
    /// SQLite database file (defaults to `<data dir>/mip/mip.db`)
    pub database_path: Option<PathBuf>,
    /// Tenant used when a request carries no `x-tenant-id` header.
    /// Unset means the header is mandatory.
    pub default_tenant: Option<String>,
    pub logging: LoggingConfig,
    pub provider: ProviderSettings,
    pub polling: PollingSettings,
    pub url_import: UrlImportSettings,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5730".to_string(),
            database_path: None,
            default_tenant: None,
            logging: LoggingConfig::default(),
            provider: ProviderSettings::default(),
            polling: PollingSettings::default(),
            url_import: UrlImportSettings::default(),
        }
    }
}

/// Provider endpoint and credentials
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Timeout for init and status requests
    pub request_timeout_secs: u64,
    /// Timeout for the upload-and-finalize request
    pub transfer_timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_key: None,
            request_timeout_secs: 30,
            transfer_timeout_secs: 600,
        }
    }
}

/// Readiness polling cadence
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    pub interval_ms: u64,
    pub max_attempts: u32,
}

impl Default for PollingSettings {
    fn default() -> Self {
        let policy = PollPolicy::default();
        Self {
            interval_ms: policy.interval.as_millis() as u64,
            max_attempts: policy.max_attempts,
        }
    }
}

impl PollingSettings {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.interval_ms),
            max_attempts: self.max_attempts.max(1),
        }
    }
}

/// Server-side URL import settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UrlImportSettings {
    /// Storage-provider hosts accepted regardless of file extension.
    /// Subdomains of an entry match too.
    pub allowed_hosts: Vec<String>,
    pub fetch_timeout_secs: u64,
}

impl Default for UrlImportSettings {
    fn default() -> Self {
        Self {
            allowed_hosts: [
                "storage.googleapis.com",
                "s3.amazonaws.com",
                "blob.core.windows.net",
                "dl.dropboxusercontent.com",
                "r2.cloudflarestorage.com",
                "objects.githubusercontent.com",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            fetch_timeout_secs: 300,
        }
    }
}

impl IngestConfig {
    /// Load from an optional TOML path, defaults when absent
    pub fn load(path: Option<&Path>) -> Result<Self> {
        load_toml_or_default(path)
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| default_data_dir().join("mip.db"))
    }
}

/// Resolve the provider API key
///
/// **Priority:** ENV → TOML
pub fn resolve_provider_api_key(settings: &ProviderSettings) -> Result<String> {
    let env_key = std::env::var(API_KEY_ENV_VAR).ok().filter(|k| is_valid_key(k));
    let toml_key = settings.api_key.clone().filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "Provider API key found in both environment and TOML. Using environment (highest priority)."
        );
    }

    if let Some(key) = env_key {
        info!("Provider API key loaded from environment variable");
        return Ok(key);
    }

    if let Some(key) = toml_key {
        info!("Provider API key loaded from TOML config");
        return Ok(key);
    }

    Err(Error::Config(format!(
        "Provider API key not configured. Please configure using one of:\n\
         1. Environment: {}=your-key-here\n\
         2. TOML config: [provider] api_key = \"your-key\"",
        API_KEY_ENV_VAR
    )))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = IngestConfig::default();
        assert_eq!(config.bind, "127.0.0.1:5730");
        assert_eq!(config.polling.interval_ms, 3000);
        assert_eq!(config.polling.max_attempts, 60);
        assert!(config
            .url_import
            .allowed_hosts
            .contains(&"storage.googleapis.com".to_string()));
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config: IngestConfig = toml::from_str(
            r#"
default_tenant = "solo"

[polling]
interval_ms = 10
"#,
        )
        .unwrap();
        assert_eq!(config.default_tenant.as_deref(), Some("solo"));
        assert_eq!(config.polling.interval_ms, 10);
        assert_eq!(config.polling.max_attempts, 60);
        assert_eq!(config.provider.request_timeout_secs, 30);
    }

    #[test]
    fn zero_attempts_is_clamped() {
        let settings = PollingSettings {
            interval_ms: 1,
            max_attempts: 0,
        };
        assert_eq!(settings.policy().max_attempts, 1);
    }

    #[test]
    fn whitespace_key_is_invalid() {
        assert!(!is_valid_key("   "));
        assert!(is_valid_key("abc"));
    }
}
