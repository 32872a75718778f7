use harvest_core::{ErrorExt, HarvestError, RetrySettings};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Base delay for exponential backoff (in milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay between retries (in milliseconds)
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Maximum jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay_ms: settings.base_delay_ms,
            max_delay_ms: settings.max_delay_ms.max(settings.base_delay_ms),
            backoff_multiplier: settings.backoff_multiplier,
            jitter_factor: settings.jitter_factor.clamp(0.0, 1.0),
        }
    }
}

/// Retry strategy based on error type
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Retry with exponential backoff
    Retry,
    /// Retry after the delay the platform asked for
    RetryWithDelay(Duration),
    /// Don't retry (for permanent failures)
    NoRetry,
}

/// Determine retry strategy based on error type
pub fn get_retry_strategy(error: &HarvestError) -> RetryStrategy {
    if !error.is_retryable() {
        return RetryStrategy::NoRetry;
    }
    match error.retry_after() {
        Some(delay) => RetryStrategy::RetryWithDelay(delay),
        None => RetryStrategy::Retry,
    }
}

/// Calculate delay with exponential backoff and jitter
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let max_delay = Duration::from_millis(config.max_delay_ms);

    let multiplier = config.backoff_multiplier.powi(attempt as i32);
    let delay_ms = (config.base_delay_ms as f64 * multiplier).min(config.max_delay_ms as f64) as u64;
    let exponential_delay = Duration::from_millis(delay_ms);

    // Add jitter to prevent thundering herd
    let jitter_range = (exponential_delay.as_millis() as f64 * config.jitter_factor) as u64;
    let jitter = if jitter_range == 0 {
        0
    } else {
        fastrand::u64(0..=jitter_range)
    };

    (exponential_delay + Duration::from_millis(jitter)).min(max_delay)
}

/// Counters reported when a fetcher is dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryMetrics {
    pub total_retries: u64,
    pub successful_retries: u64,
    pub failed_operations: u64,
}

/// Retry executor that wraps operations with retry logic
#[derive(Debug)]
pub struct RetryExecutor {
    config: RetryConfig,
    total_retries: AtomicU64,
    successful_retries: AtomicU64,
    failed_operations: AtomicU64,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            total_retries: AtomicU64::new(0),
            successful_retries: AtomicU64::new(0),
            failed_operations: AtomicU64::new(0),
        }
    }

    /// Runs `operation` until it succeeds, fails permanently, or the attempt
    /// cap is reached. The last error is returned unchanged, except that an
    /// exhausted rate limit reports the number of attempts made.
    pub async fn execute<F, Fut, T>(
        &self,
        operation_name: &str,
        operation: F,
    ) -> Result<T, HarvestError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, HarvestError>>,
    {
        let max_delay = Duration::from_millis(self.config.max_delay_ms);
        let mut total_delay = Duration::ZERO;
        let mut attempt = 0;

        loop {
            if attempt > 0 {
                debug!("Retry attempt {} for {}", attempt, operation_name);
            }

            let error = match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        self.total_retries
                            .fetch_add(u64::from(attempt), Ordering::Relaxed);
                        self.successful_retries.fetch_add(1, Ordering::Relaxed);
                        info!(
                            "Operation {} succeeded after {} retries (total delay: {:?})",
                            operation_name, attempt, total_delay
                        );
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            attempt += 1;
            let attempts_left = attempt < self.config.max_attempts;

            let delay = match get_retry_strategy(&error) {
                RetryStrategy::NoRetry => {
                    debug!("Not retrying {} due to error type: {}", operation_name, error);
                    return Err(self.give_up(error, attempt));
                }
                _ if !attempts_left => {
                    error!(
                        "Operation {} failed after {} attempts with total delay of {:?}",
                        operation_name, attempt, total_delay
                    );
                    return Err(self.give_up(error, attempt));
                }
                RetryStrategy::Retry => calculate_delay(attempt - 1, &self.config),
                RetryStrategy::RetryWithDelay(requested) => requested.min(max_delay),
            };

            warn!(
                "Retrying {} in {:?} (attempt {}/{}) due to: {}",
                operation_name, delay, attempt, self.config.max_attempts, error
            );
            total_delay += delay;
            sleep(delay).await;
        }
    }

    fn give_up(&self, error: HarvestError, attempts: u32) -> HarvestError {
        self.total_retries
            .fetch_add(u64::from(attempts.saturating_sub(1)), Ordering::Relaxed);
        self.failed_operations.fetch_add(1, Ordering::Relaxed);
        match error {
            HarvestError::RateLimited {
                platform,
                retry_after,
                ..
            } => HarvestError::RateLimited {
                platform,
                retry_after,
                attempts,
            },
            other => other,
        }
    }

    /// Get current retry metrics
    pub fn metrics(&self) -> RetryMetrics {
        RetryMetrics {
            total_retries: self.total_retries.load(Ordering::Relaxed),
            successful_retries: self.successful_retries.load(Ordering::Relaxed),
            failed_operations: self.failed_operations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_core::Platform;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay_ms: 1, // Very short delay for test
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    fn transient() -> HarvestError {
        HarvestError::TransientNetwork {
            platform: Platform::Reddit,
            reason: "connection reset".to_string(),
            status: None,
        }
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 60_000);
        assert!(config.jitter_factor <= 1.0);
    }

    #[test]
    fn test_retry_strategy_for_errors() {
        let rate_limited = HarvestError::RateLimited {
            platform: Platform::X,
            retry_after: Some(Duration::from_secs(60)),
            attempts: 1,
        };
        assert_eq!(
            get_retry_strategy(&rate_limited),
            RetryStrategy::RetryWithDelay(Duration::from_secs(60))
        );

        let unspecified = HarvestError::RateLimited {
            platform: Platform::X,
            retry_after: None,
            attempts: 1,
        };
        assert_eq!(get_retry_strategy(&unspecified), RetryStrategy::Retry);
        assert_eq!(get_retry_strategy(&transient()), RetryStrategy::Retry);

        let client = HarvestError::ClientRequest {
            platform: Platform::X,
            endpoint: "tweets/search/recent".to_string(),
            status: 400,
            body: "invalid query".to_string(),
        };
        assert_eq!(get_retry_strategy(&client), RetryStrategy::NoRetry);
    }

    #[test]
    fn test_exponential_backoff_calculation() {
        let config = RetryConfig {
            base_delay_ms: 1000,
            max_delay_ms: 10000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0, // No jitter for predictable test
            ..Default::default()
        };

        assert_eq!(calculate_delay(0, &config), Duration::from_millis(1000));
        assert_eq!(calculate_delay(1, &config), Duration::from_millis(2000));
        assert_eq!(calculate_delay(2, &config), Duration::from_millis(4000));
        assert_eq!(calculate_delay(3, &config), Duration::from_millis(8000));

        // Should cap at max_delay_ms
        assert_eq!(calculate_delay(10, &config), Duration::from_millis(10000));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let config = RetryConfig {
            base_delay_ms: 1000,
            max_delay_ms: 10000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.5, // 50% jitter
            ..Default::default()
        };

        for _ in 0..20 {
            let delay = calculate_delay(1, &config);
            assert!(delay >= Duration::from_millis(2000));
            assert!(delay <= Duration::from_millis(3000)); // base 2000 + 50% jitter
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let executor = RetryExecutor::new(fast_config(3));

        let result = executor
            .execute("test_operation", || async { Ok::<i32, HarvestError>(42) })
            .await;

        assert_eq!(tokio_test::assert_ok!(result), 42);
        assert_eq!(executor.metrics(), RetryMetrics::default());
    }

    #[tokio::test]
    async fn test_success_after_transient_failures() {
        let executor = RetryExecutor::new(fast_config(3));
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result = executor
            .execute("test_operation", move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(transient())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        let metrics = executor.metrics();
        assert_eq!(metrics.total_retries, 2);
        assert_eq!(metrics.successful_retries, 1);
    }

    #[tokio::test]
    async fn test_no_retry_on_client_error() {
        let executor = RetryExecutor::new(fast_config(3));
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result = executor
            .execute("test_operation", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, HarvestError>(HarvestError::ClientRequest {
                        platform: Platform::X,
                        endpoint: "users/by/username/nobody".to_string(),
                        status: 401,
                        body: "Unauthorized".to_string(),
                    })
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(HarvestError::ClientRequest { status: 401, .. })
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(executor.metrics().failed_operations, 1);
    }

    #[tokio::test]
    async fn test_rate_limit_becomes_terminal_after_cap() {
        let executor = RetryExecutor::new(fast_config(4));
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result = executor
            .execute("test_operation", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, HarvestError>(HarvestError::RateLimited {
                        platform: Platform::Reddit,
                        retry_after: Some(Duration::from_millis(1)),
                        attempts: 1,
                    })
                }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        match result {
            Err(HarvestError::RateLimited { attempts, .. }) => assert_eq!(attempts, 4),
            other => panic!("expected terminal RateLimited, got {other:?}"),
        }
        assert_eq!(executor.metrics().total_retries, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requested_delay_is_capped() {
        let config = RetryConfig {
            max_delay_ms: 2_000,
            ..fast_config(2)
        };
        let executor = RetryExecutor::new(config);
        let attempts = Arc::new(AtomicU32::new(0));

        let start = tokio::time::Instant::now();
        let counter = attempts.clone();
        let result = executor
            .execute("test_operation", move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(HarvestError::RateLimited {
                            platform: Platform::X,
                            retry_after: Some(Duration::from_secs(900)),
                            attempts: 1,
                        })
                    } else {
                        Ok("page")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "page");
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }
}
