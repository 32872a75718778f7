use crate::error::*;
use crate::types::{CommandKind, Platform};
use std::time::Duration;
use tracing::{error, info};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for HarvestError {
    fn log_error(&self) -> &Self {
        error!("HarvestError: {}", self);
        if let HarvestError::Config(e) = self {
            error!("Configuration error details: {:?}", e);
        }
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            HarvestError::RateLimited { .. } | HarvestError::TransientNetwork { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            HarvestError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            HarvestError::Usage { message } => message.clone(),
            HarvestError::ClientRequest {
                platform,
                status: 401 | 403,
                ..
            } => format!(
                "{} refused the credentials. Check the API token and its permissions.",
                platform
            ),
            HarvestError::ClientRequest {
                platform,
                status: 404,
                endpoint,
                ..
            } => format!("{} could not find {}.", platform, endpoint),
            HarvestError::ClientRequest {
                platform,
                status,
                body,
                ..
            } => format!("{} rejected the request (HTTP {}): {}", platform, status, body),
            HarvestError::RateLimited {
                platform, attempts, ..
            } => format!(
                "{} kept rate limiting after {} attempts. Wait a while before trying again.",
                platform, attempts
            ),
            HarvestError::TransientNetwork { platform, reason, .. } => format!(
                "Could not reach {}: {}. Check your network connection.",
                platform, reason
            ),
            HarvestError::MalformedResponse {
                platform, entity, ..
            } => format!("{} returned a {} we could not read.", platform, entity),
            HarvestError::Write { path, source } => {
                format!("Could not write report to {}: {}", path.display(), source)
            }
            HarvestError::Config(e) => e.user_friendly_message(),
            HarvestError::Interrupted => "Interrupted; no report was written.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            HarvestError::Usage { .. } => "USAGE".to_string(),
            HarvestError::ClientRequest { .. } => "CLIENT_REQUEST".to_string(),
            HarvestError::RateLimited { .. } => "RATE_LIMITED".to_string(),
            HarvestError::TransientNetwork { .. } => "TRANSIENT_NETWORK".to_string(),
            HarvestError::MalformedResponse { .. } => "MALFORMED_RESPONSE".to_string(),
            HarvestError::Write { .. } => "WRITE".to_string(),
            HarvestError::Config(e) => e.error_code(),
            HarvestError::Interrupted => "INTERRUPTED".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Configuration file '{}' does not exist.", path)
            }
            ConfigError::InvalidValue { field, .. } => {
                format!("Invalid value for configuration field '{}'.", field)
            }
            ConfigError::MissingEnvironmentVariable { var_name } => format!(
                "Environment variable '{}' is required but not set.",
                var_name
            ),
            _ => format!("Configuration error: {}", self),
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::Unreadable { .. } => "CONFIG_UNREADABLE".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::MissingEnvironmentVariable { .. } => "CONFIG_MISSING_ENV_VAR".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
        }
    }
}

pub struct ErrorReporter {
    report_errors: bool,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            report_errors: true,
        }
    }

    pub fn with_error_reporting(mut self, enabled: bool) -> Self {
        self.report_errors = enabled;
        self
    }

    /// One-line failure description naming platform, verb and cause.
    pub fn describe_failure(
        &self,
        platform: Platform,
        command: CommandKind,
        error: &HarvestError,
    ) -> String {
        format!(
            "{} {} failed [{}]: {}",
            platform.slug(),
            command,
            error.error_code(),
            error.user_friendly_message()
        )
    }

    /// Logs the failure with its code; a no-op when error reporting is off.
    pub fn report_error(&self, platform: Platform, command: CommandKind, error: &HarvestError) {
        if self.report_errors {
            error.log_error();
            info!("Error code: {}", error.error_code());
            info!(
                "User message: {}",
                self.describe_failure(platform, command, error)
            );
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}
