//! Optional TOML configuration and environment credentials.

use crate::error::ConfigError;
use crate::types::Platform;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_ENV_VAR: &str = "HARVEST_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "harvest.toml";
pub const X_TOKEN_ENV_VAR: &str = "X_BEARER_TOKEN";
pub const YOUTUBE_KEY_ENV_VAR: &str = "YOUTUBE_API_KEY";

/// Bounded exponential backoff settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlatformSettings {
    /// Replaces the platform's public API base URL.
    pub base_url: Option<String>,
    /// Secondary base URL (Hacker News item API).
    pub item_base_url: Option<String>,
    pub requests_per_minute: Option<u32>,
    pub burst: Option<u32>,
    pub retry: Option<RetrySettings>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub output_dir: Option<PathBuf>,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub retry: RetrySettings,
    pub hn: PlatformSettings,
    pub reddit: PlatformSettings,
    pub x: PlatformSettings,
    pub youtube: PlatformSettings,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            user_agent: format!("harvest/{} (research tool)", env!("CARGO_PKG_VERSION")),
            request_timeout_secs: 30,
            retry: RetrySettings::default(),
            hn: PlatformSettings::default(),
            reddit: PlatformSettings::default(),
            x: PlatformSettings::default(),
            youtube: PlatformSettings::default(),
        }
    }
}

impl HarvestConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: HarvestConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the explicit path, else `$HARVEST_CONFIG`, else `./harvest.toml`
    /// when present, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
        let (path, required) = match (explicit, from_env) {
            (Some(path), _) => (path.to_path_buf(), true),
            (None, Some(path)) => (path, true),
            (None, None) => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !path.exists() {
            if required {
                return Err(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                });
            }
            debug!("No config file found, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        debug!("Loaded config from {}", path.display());
        Self::from_toml_str(&contents)
    }

    pub fn platform(&self, platform: Platform) -> &PlatformSettings {
        match platform {
            Platform::HackerNews => &self.hn,
            Platform::Reddit => &self.reddit,
            Platform::X => &self.x,
            Platform::YouTube => &self.youtube,
        }
    }

    /// Platform retry override, falling back to the global policy.
    pub fn retry_for(&self, platform: Platform) -> &RetrySettings {
        self.platform(platform).retry.as_ref().unwrap_or(&self.retry)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_secs".to_string(),
                value: "0".to_string(),
            });
        }
        for platform in Platform::all() {
            let retry = self.retry_for(*platform);
            if retry.max_attempts == 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.retry.max_attempts", platform.slug()),
                    value: "0".to_string(),
                });
            }
            if !(0.0..=1.0).contains(&retry.jitter_factor) {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.retry.jitter_factor", platform.slug()),
                    value: retry.jitter_factor.to_string(),
                });
            }
            if self.platform(*platform).requests_per_minute == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.requests_per_minute", platform.slug()),
                    value: "0".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Environment variable holding the platform's credential, if it needs one.
pub fn credential_env_var(platform: Platform) -> Option<&'static str> {
    match platform {
        Platform::X => Some(X_TOKEN_ENV_VAR),
        Platform::YouTube => Some(YOUTUBE_KEY_ENV_VAR),
        Platform::HackerNews | Platform::Reddit => None,
    }
}

/// Reads the platform credential from the environment.
pub fn load_credential(platform: Platform) -> Result<Option<String>, ConfigError> {
    let Some(var_name) = credential_env_var(platform) else {
        return Ok(None);
    };
    match std::env::var(var_name) {
        Ok(value) if !value.trim().is_empty() => Ok(Some(value.trim().to_string())),
        _ => Err(ConfigError::MissingEnvironmentVariable {
            var_name: var_name.to_string(),
        }),
    }
}
