//! Engine configuration
//!
//! Settings resolve with ENV → TOML → compiled default priority, using
//! the shared loader in `fincode_common::config`. All environment
//! overrides use the `FINCODE_*` prefix.

use std::sync::Arc;
use std::time::Duration;

use fincode_common::config::{config_file_path, load_toml_config, resolve_setting, TomlConfig};
use fincode_common::{Error, Result};

use crate::services::resolver_client::{CodeResolver, HttpResolverClient, UnconfiguredResolver};

/// Default minimum fuzzy similarity for an alias match
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.85;

/// Fully resolved engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// SQLite database file path
    pub database_path: String,
    /// HTTP bind address
    pub bind_address: String,
    /// Minimum fuzzy similarity for an alias match (0.0-1.0)
    pub fuzzy_threshold: f64,
    /// Resolver endpoint; Smart Pass is unavailable when unset
    pub resolver_base_url: Option<String>,
    /// Bearer token for the resolver endpoint
    pub resolver_api_key: Option<String>,
    /// Per-request resolver timeout
    pub resolver_timeout: Duration,
    /// Retry attempts after the first resolver failure
    pub resolver_max_retries: u32,
    /// Initial retry backoff (doubles per attempt)
    pub resolver_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: "fincode.db".to_string(),
            bind_address: "127.0.0.1:5810".to_string(),
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            resolver_base_url: None,
            resolver_api_key: None,
            resolver_timeout: Duration::from_secs(30),
            resolver_max_retries: 2,
            resolver_backoff: Duration::from_millis(500),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the default file location plus environment
    pub fn load() -> Result<Self> {
        let toml = load_toml_config(&config_file_path())?;
        Self::from_toml(&toml)
    }

    /// Resolve settings from parsed TOML plus environment overrides
    pub fn from_toml(toml: &TomlConfig) -> Result<Self> {
        let defaults = Self::default();

        let database_path = resolve_setting(
            "FINCODE_DATABASE_PATH",
            toml.database_path.as_deref(),
            &defaults.database_path,
        );
        let bind_address = resolve_setting(
            "FINCODE_BIND_ADDRESS",
            toml.bind_address.as_deref(),
            &defaults.bind_address,
        );

        let fuzzy_threshold = parse_f64(
            "FINCODE_FUZZY_THRESHOLD",
            toml.matching.fuzzy_threshold,
            defaults.fuzzy_threshold,
        )?;
        if !(0.0..=1.0).contains(&fuzzy_threshold) {
            return Err(Error::Config(format!(
                "fuzzy_threshold must be in 0.0-1.0, got {}",
                fuzzy_threshold
            )));
        }

        let resolver_base_url =
            resolve_optional("FINCODE_RESOLVER_URL", toml.resolver.base_url.as_deref());
        let resolver_api_key =
            resolve_optional("FINCODE_RESOLVER_API_KEY", toml.resolver.api_key.as_deref());

        let timeout_secs = parse_u64(
            "FINCODE_RESOLVER_TIMEOUT_SECS",
            toml.resolver.timeout_secs,
            defaults.resolver_timeout.as_secs(),
        )?;
        let max_retries = parse_u64(
            "FINCODE_RESOLVER_MAX_RETRIES",
            toml.resolver.max_retries.map(u64::from),
            u64::from(defaults.resolver_max_retries),
        )? as u32;
        let backoff_ms = parse_u64(
            "FINCODE_RESOLVER_BACKOFF_MS",
            toml.resolver.backoff_ms,
            defaults.resolver_backoff.as_millis() as u64,
        )?;

        Ok(Self {
            database_path,
            bind_address,
            fuzzy_threshold,
            resolver_base_url,
            resolver_api_key,
            resolver_timeout: Duration::from_secs(timeout_secs),
            resolver_max_retries: max_retries,
            resolver_backoff: Duration::from_millis(backoff_ms),
        })
    }

    /// Build the resolver client this configuration describes
    pub fn build_resolver(&self) -> Result<Arc<dyn CodeResolver>> {
        match &self.resolver_base_url {
            Some(base_url) => {
                let client = HttpResolverClient::new(
                    base_url.clone(),
                    self.resolver_api_key.clone(),
                    self.resolver_timeout,
                    self.resolver_max_retries,
                    self.resolver_backoff,
                )
                .map_err(|e| Error::Config(format!("Resolver client init failed: {}", e)))?;
                Ok(Arc::new(client))
            }
            None => {
                tracing::warn!("No resolver endpoint configured; Smart Pass is unavailable");
                Ok(Arc::new(UnconfiguredResolver))
            }
        }
    }
}

fn resolve_optional(env_var: &str, toml_value: Option<&str>) -> Option<String> {
    if let Ok(value) = std::env::var(env_var) {
        if !value.trim().is_empty() {
            return Some(value);
        }
    }
    toml_value
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
}

fn parse_f64(env_var: &str, toml_value: Option<f64>, default: f64) -> Result<f64> {
    if let Ok(value) = std::env::var(env_var) {
        if !value.trim().is_empty() {
            return value
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{} must be a number, got {}", env_var, value)));
        }
    }
    Ok(toml_value.unwrap_or(default))
}

fn parse_u64(env_var: &str, toml_value: Option<u64>, default: u64) -> Result<u64> {
    if let Ok(value) = std::env::var(env_var) {
        if !value.trim().is_empty() {
            return value.trim().parse().map_err(|_| {
                Error::Config(format!("{} must be an integer, got {}", env_var, value))
            });
        }
    }
    Ok(toml_value.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fincode_common::config::{MatchingConfig, ResolverConfig};

    #[test]
    fn test_defaults_when_toml_empty() {
        let config = EngineConfig::from_toml(&TomlConfig::default()).unwrap();
        assert_eq!(config.fuzzy_threshold, DEFAULT_FUZZY_THRESHOLD);
        assert_eq!(config.bind_address, "127.0.0.1:5810");
        assert!(config.resolver_base_url.is_none());
        assert_eq!(config.resolver_max_retries, 2);
    }

    #[test]
    fn test_toml_values_applied() {
        let toml = TomlConfig {
            database_path: Some("/tmp/fincode.db".to_string()),
            bind_address: Some("0.0.0.0:8080".to_string()),
            resolver: ResolverConfig {
                base_url: Some("http://localhost:9000".to_string()),
                api_key: None,
                timeout_secs: Some(10),
                max_retries: Some(5),
                backoff_ms: Some(250),
            },
            matching: MatchingConfig {
                fuzzy_threshold: Some(0.9),
            },
        };
        let config = EngineConfig::from_toml(&toml).unwrap();
        assert_eq!(config.database_path, "/tmp/fincode.db");
        assert_eq!(config.fuzzy_threshold, 0.9);
        assert_eq!(
            config.resolver_base_url.as_deref(),
            Some("http://localhost:9000")
        );
        assert_eq!(config.resolver_timeout, Duration::from_secs(10));
        assert_eq!(config.resolver_max_retries, 5);
        assert_eq!(config.resolver_backoff, Duration::from_millis(250));
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let toml = TomlConfig {
            matching: MatchingConfig {
                fuzzy_threshold: Some(1.5),
            },
            ..TomlConfig::default()
        };
        assert!(EngineConfig::from_toml(&toml).is_err());
    }
}
