//! Configuration loading for fincode services
//!
//! Resolution follows ENV → TOML → compiled default priority. The TOML
//! file carries deployment settings (database path, bind address, resolver
//! endpoint); individual values can be overridden via `FINCODE_*`
//! environment variables without editing the file.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Raw TOML configuration file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// SQLite database file path
    pub database_path: Option<String>,
    /// HTTP bind address, e.g. "127.0.0.1:5810"
    pub bind_address: Option<String>,
    /// Resolver settings
    #[serde(default)]
    pub resolver: ResolverConfig,
    /// Matching settings
    #[serde(default)]
    pub matching: MatchingConfig,
}

/// Model-assisted resolver endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Base URL of the external resolver service
    pub base_url: Option<String>,
    /// API key sent as a bearer token
    pub api_key: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,
    /// Retry attempts before degrading to the deterministic fallback
    pub max_retries: Option<u32>,
    /// Initial backoff between retries in milliseconds (doubles per attempt)
    pub backoff_ms: Option<u64>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_secs: None,
            max_retries: None,
            backoff_ms: None,
        }
    }
}

/// Alias matching settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Minimum fuzzy similarity for an alias match (0.0-1.0)
    pub fuzzy_threshold: Option<f64>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: None,
        }
    }
}

/// Load TOML configuration from an explicit path
///
/// A missing file yields the defaults rather than an error; a present but
/// unparsable file is a configuration error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No config file, using defaults");
        return Ok(TomlConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read config failed ({}): {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse config failed ({}): {}", path.display(), e)))
}

/// Resolve the configuration file path
///
/// Priority: `FINCODE_CONFIG` environment variable, then
/// `./fincode.toml` in the working directory.
pub fn config_file_path() -> PathBuf {
    if let Ok(path) = std::env::var("FINCODE_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("fincode.toml")
}

/// Resolve a string setting with ENV → TOML → default priority
pub fn resolve_setting(env_var: &str, toml_value: Option<&str>, default: &str) -> String {
    if let Ok(value) = std::env::var(env_var) {
        if !value.trim().is_empty() {
            return value;
        }
    }
    if let Some(value) = toml_value {
        if !value.trim().is_empty() {
            return value.to_string();
        }
    }
    default.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = load_toml_config(Path::new("/nonexistent/fincode.toml")).unwrap();
        assert!(config.database_path.is_none());
        assert!(config.resolver.base_url.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fincode.toml");
        std::fs::write(
            &path,
            r#"
database_path = "/tmp/fincode.db"
bind_address = "127.0.0.1:5810"

[resolver]
base_url = "http://localhost:9000"
timeout_secs = 20
max_retries = 2

[matching]
fuzzy_threshold = 0.9
"#,
        )
        .unwrap();

        let config = load_toml_config(&path).unwrap();
        assert_eq!(config.database_path.as_deref(), Some("/tmp/fincode.db"));
        assert_eq!(
            config.resolver.base_url.as_deref(),
            Some("http://localhost:9000")
        );
        assert_eq!(config.resolver.max_retries, Some(2));
        assert_eq!(config.matching.fuzzy_threshold, Some(0.9));
    }

    #[test]
    fn test_resolve_setting_priority() {
        // TOML value beats default
        let value = resolve_setting("FINCODE_TEST_UNSET_VAR", Some("from-toml"), "fallback");
        assert_eq!(value, "from-toml");

        // Default when nothing else is set
        let value = resolve_setting("FINCODE_TEST_UNSET_VAR", None, "fallback");
        assert_eq!(value, "fallback");
    }
}
