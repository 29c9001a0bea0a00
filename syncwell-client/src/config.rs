//! Configuration loading for SYNCWELL clients.
//!
//! All fields are required unless explicitly marked optional. No defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use syncwell_core::{CacheSettings, ConfigError, DebounceSettings};

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV: &str = "SYNCWELL_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub auth: AuthConfig,
    pub cache: CacheConfig,
    pub debounce: DebounceConfig,
    pub tree: TreeConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    pub api_key: Option<String>,
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Optional; without it data only goes stale through invalidation.
    pub stale_after_ms: Option<u64>,
    pub retain_unused: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DebounceConfig {
    pub search_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TreeConfig {
    /// Connection name whose metadata tree is loaded.
    pub database: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Missing configuration file path (use --config or SYNCWELL_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

impl ClientConfig {
    pub fn load() -> Result<Self, ConfigLoadError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigLoadError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigLoadError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigLoadError> {
        let config: ClientConfig = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.api_base_url.trim();
        if url.is_empty() {
            return Err(invalid("api_base_url", "must not be empty"));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(invalid("api_base_url", "must start with http:// or https://"));
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms", "must be > 0"));
        }
        if self.auth.api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            return Err(invalid("auth.api_key", "must not be empty when set"));
        }
        if self
            .auth
            .bearer_token
            .as_deref()
            .is_some_and(|t| t.trim().is_empty())
        {
            return Err(invalid("auth.bearer_token", "must not be empty when set"));
        }
        if self.cache.stale_after_ms == Some(0) {
            return Err(invalid("cache.stale_after_ms", "must be > 0 when set"));
        }
        if self.debounce.search_delay_ms == 0 {
            return Err(invalid("debounce.search_delay_ms", "must be > 0"));
        }
        if self.tree.database.trim().is_empty() {
            return Err(invalid("tree.database", "must not be empty"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cache_settings(&self) -> CacheSettings {
        let settings = CacheSettings::new().with_retain_unused(self.cache.retain_unused);
        match self.cache.stale_after_ms {
            Some(ms) => settings.with_stale_after(Duration::from_millis(ms)),
            None => settings,
        }
    }

    pub fn debounce_settings(&self) -> DebounceSettings {
        DebounceSettings::with_delay(Duration::from_millis(self.debounce.search_delay_ms))
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV).ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}
