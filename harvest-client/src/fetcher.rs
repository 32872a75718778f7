use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use crate::retry::{RetryConfig, RetryExecutor, RetryMetrics};
use harvest_core::normalize::truncate;
use harvest_core::{ConfigError, HarvestConfig, HarvestError, Platform};
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::Client;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Error bodies are attached to `ClientRequest` errors up to this many chars.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// YouTube reports quota exhaustion as a 403 with one of these reasons.
const YOUTUBE_THROTTLE_REASONS: &[&str] =
    &["quotaExceeded", "rateLimitExceeded", "userRateLimitExceeded"];

/// How requests to a platform authenticate.
#[derive(Clone, PartialEq)]
pub enum Credential {
    None,
    Bearer(String),
    /// Sent as a query parameter, e.g. `key=...`.
    ApiKey { param: &'static str, value: String },
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::None => f.write_str("None"),
            Credential::Bearer(_) => f.write_str("Bearer(<redacted>)"),
            Credential::ApiKey { param, .. } => write!(f, "ApiKey({param}=<redacted>)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub platform: Platform,
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub credential: Credential,
}

impl FetcherConfig {
    pub fn new(platform: Platform, base_url: impl Into<String>) -> Self {
        let defaults = HarvestConfig::default();
        Self {
            platform,
            base_url: base_url.into(),
            user_agent: defaults.user_agent,
            timeout: Duration::from_secs(defaults.request_timeout_secs),
            rate_limit: RateLimitConfig::for_platform(platform),
            retry: RetryConfig::from(&defaults.retry),
            credential: Credential::None,
        }
    }

    /// Applies the global and per-platform sections of a loaded config.
    pub fn from_config(
        platform: Platform,
        default_base_url: &str,
        config: &HarvestConfig,
    ) -> Self {
        let settings = config.platform(platform);
        let base_url = settings
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url.to_string());

        Self {
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            rate_limit: RateLimitConfig::for_platform(platform).with_overrides(settings),
            retry: RetryConfig::from(config.retry_for(platform)),
            ..Self::new(platform, base_url)
        }
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }
}

/// Throttled, retrying JSON GET client for one platform API.
///
/// Requests are issued one at a time; every call passes through the
/// platform's token bucket, and transient failures are retried by the
/// embedded [`RetryExecutor`].
#[derive(Debug)]
pub struct Fetcher {
    http_client: Client,
    platform: Platform,
    base_url: Url,
    credential: Credential,
    rate_limiter: RateLimiter,
    retry: RetryExecutor,
    request_count: AtomicU64,
}

impl Fetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, HarvestError> {
        let base_url = parse_base_url(config.platform, &config.base_url)?;

        let http_client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "http_client".to_string(),
                value: e.to_string(),
            })?;

        Ok(Self {
            http_client,
            platform: config.platform,
            base_url,
            credential: config.credential,
            rate_limiter: RateLimiter::new(config.rate_limit),
            retry: RetryExecutor::new(config.retry),
            request_count: AtomicU64::new(0),
        })
    }

    /// Fetches `endpoint` relative to the base URL and parses the JSON body.
    pub async fn fetch(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Value, HarvestError> {
        let url = self.build_url(endpoint, params)?;
        let operation = format!("{} {}", self.platform.slug(), endpoint);
        self.retry
            .execute(&operation, || self.fetch_once(endpoint, &url))
            .await
    }

    /// Number of HTTP requests sent, retries included.
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn retry_metrics(&self) -> RetryMetrics {
        self.retry.metrics()
    }

    fn build_url(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Url, HarvestError> {
        let mut url = self
            .base_url
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| HarvestError::usage(format!("invalid request path '{endpoint}': {e}")))?;

        let api_key = match &self.credential {
            Credential::ApiKey { param, value } => Some((*param, value.clone())),
            _ => None,
        };
        if !params.is_empty() || api_key.is_some() {
            let mut pairs = url.query_pairs_mut();
            pairs.extend_pairs(params.iter());
            if let Some((param, value)) = &api_key {
                pairs.append_pair(param, value);
            }
        }
        Ok(url)
    }

    async fn fetch_once(&self, endpoint: &str, url: &Url) -> Result<Value, HarvestError> {
        let waited = self.rate_limiter.acquire().await;
        if !waited.is_zero() {
            debug!("Throttled {} for {:?}", self.platform.slug(), waited);
        }
        self.request_count.fetch_add(1, Ordering::Relaxed);

        debug!("GET {} {}", self.platform.slug(), endpoint);
        let mut request = self.http_client.get(url.clone());
        if let Credential::Bearer(token) = &self.credential {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| network_error(self.platform, endpoint, e))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("text/html"));

        let body = response
            .text()
            .await
            .map_err(|e| network_error(self.platform, endpoint, e))?;

        if is_html && (200..300).contains(&status) {
            warn!("{} returned HTML for {}", self.platform, endpoint);
            return Err(HarvestError::TransientNetwork {
                platform: self.platform,
                reason: "received an HTML page instead of JSON".to_string(),
                status: Some(status),
            });
        }

        classify_response(self.platform, endpoint, status, retry_after, &body)
    }
}

impl Drop for Fetcher {
    fn drop(&mut self) {
        let metrics = self.retry_metrics();
        let requests = self.request_count();
        if metrics.total_retries > 0 || metrics.failed_operations > 0 {
            info!(
                "{}: {} requests, {} retries ({} recovered), {} failed calls",
                self.platform,
                requests,
                metrics.total_retries,
                metrics.successful_retries,
                metrics.failed_operations
            );
        } else {
            debug!("{}: {} requests, no retries", self.platform, requests);
        }
    }
}

fn parse_base_url(platform: Platform, raw: &str) -> Result<Url, HarvestError> {
    // `Url::join` replaces the last path segment unless the base ends in '/'
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|e| {
        HarvestError::Config(ConfigError::InvalidValue {
            field: format!("{}.base_url", platform.slug()),
            value: format!("{raw} ({e})"),
        })
    })
}

fn network_error(platform: Platform, endpoint: &str, error: reqwest::Error) -> HarvestError {
    let reason = if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        format!("connection failed: {error}")
    } else {
        error.to_string()
    };
    debug!("Network error for {} {}: {}", platform.slug(), endpoint, reason);
    HarvestError::TransientNetwork {
        platform,
        reason,
        status: error.status().map(|s| s.as_u16()),
    }
}

/// Maps a raw HTTP outcome onto the error taxonomy, or parses the JSON body.
pub fn classify_response(
    platform: Platform,
    endpoint: &str,
    status: u16,
    retry_after: Option<Duration>,
    body: &str,
) -> Result<Value, HarvestError> {
    match status {
        200..=299 => parse_success(platform, endpoint, status, body),
        429 => Err(HarvestError::RateLimited {
            platform,
            retry_after,
            attempts: 1,
        }),
        403 if platform == Platform::YouTube && is_youtube_throttle(body) => {
            Err(HarvestError::RateLimited {
                platform,
                retry_after,
                attempts: 1,
            })
        }
        408 | 500..=599 => Err(HarvestError::TransientNetwork {
            platform,
            reason: format!("server returned HTTP {status} for {endpoint}"),
            status: Some(status),
        }),
        _ => Err(HarvestError::ClientRequest {
            platform,
            endpoint: endpoint.to_string(),
            status,
            body: truncate(body.trim(), MAX_ERROR_BODY_CHARS),
        }),
    }
}

fn parse_success(
    platform: Platform,
    endpoint: &str,
    status: u16,
    body: &str,
) -> Result<Value, HarvestError> {
    if body.trim_start().starts_with('<') {
        return Err(HarvestError::TransientNetwork {
            platform,
            reason: "received an HTML page instead of JSON".to_string(),
            status: Some(status),
        });
    }

    let value: Value = serde_json::from_str(body).map_err(|e| {
        HarvestError::malformed(platform, "response", format!("{endpoint}: {e}"))
    })?;

    // X reports lookup failures as 200 with only an `errors` array
    if platform == Platform::X && value.get("data").is_none() {
        if let Some(errors) = value.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                return Err(HarvestError::ClientRequest {
                    platform,
                    endpoint: endpoint.to_string(),
                    status,
                    body: truncate(&Value::Array(errors.clone()).to_string(), MAX_ERROR_BODY_CHARS),
                });
            }
        }
    }

    Ok(value)
}

fn is_youtube_throttle(body: &str) -> bool {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return false;
    };
    value
        .pointer("/error/errors")
        .and_then(Value::as_array)
        .is_some_and(|errors| {
            errors.iter().any(|e| {
                e.get("reason")
                    .and_then(Value::as_str)
                    .is_some_and(|reason| YOUTUBE_THROTTLE_REASONS.contains(&reason))
            })
        })
}
