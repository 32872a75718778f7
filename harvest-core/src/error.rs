use crate::types::Platform;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Usage error: {message}")]
    Usage { message: String },

    #[error("{platform} rejected request to {endpoint} (HTTP {status}): {body}")]
    ClientRequest {
        platform: Platform,
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("{platform} rate limited the request after {attempts} attempt(s)")]
    RateLimited {
        platform: Platform,
        retry_after: Option<Duration>,
        attempts: u32,
    },

    #[error("Network error talking to {platform}: {reason}")]
    TransientNetwork {
        platform: Platform,
        reason: String,
        status: Option<u16>,
    },

    #[error("Malformed {entity} from {platform}: {details}")]
    MalformedResponse {
        platform: Platform,
        entity: String,
        details: String,
    },

    #[error("Failed to write report {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Interrupted before the report was written")]
    Interrupted,
}

impl HarvestError {
    pub fn usage(message: impl Into<String>) -> Self {
        HarvestError::Usage {
            message: message.into(),
        }
    }

    pub fn malformed(
        platform: Platform,
        entity: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        HarvestError::MalformedResponse {
            platform,
            entity: entity.into(),
            details: details.into(),
        }
    }

    /// The platform the failure came from, when one is known.
    pub fn platform(&self) -> Option<Platform> {
        match self {
            HarvestError::ClientRequest { platform, .. }
            | HarvestError::RateLimited { platform, .. }
            | HarvestError::TransientNetwork { platform, .. }
            | HarvestError::MalformedResponse { platform, .. } => Some(*platform),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to read configuration {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Environment variable not set: {var_name}")]
    MissingEnvironmentVariable { var_name: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}
