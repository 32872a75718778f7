use harvest_core::{Platform, PlatformSettings};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub time_window: Duration,
    pub burst_allowance: u32,
}

impl RateLimitConfig {
    /// Published or conservative request budgets per platform.
    pub fn for_platform(platform: Platform) -> Self {
        let (max_requests, burst_allowance) = match platform {
            // Algolia allows 10k/hour per IP
            Platform::HackerNews => (120, 10),
            // Unauthenticated JSON listings are throttled aggressively
            Platform::Reddit => (30, 5),
            // Search and drill-down endpoints share 15 minute windows
            Platform::X => (30, 5),
            // Quota is unit-based; keep request bursts modest
            Platform::YouTube => (60, 10),
        };
        Self {
            max_requests,
            time_window: Duration::from_secs(60),
            burst_allowance,
        }
    }

    pub fn with_overrides(mut self, settings: &PlatformSettings) -> Self {
        if let Some(rpm) = settings.requests_per_minute {
            self.max_requests = rpm.max(1);
        }
        if let Some(burst) = settings.burst {
            self.burst_allowance = burst.max(1);
        }
        self
    }

    /// A limiter that never waits, for tests and mock servers.
    pub fn unlimited() -> Self {
        Self {
            max_requests: u32::MAX,
            time_window: Duration::from_secs(1),
            burst_allowance: u32::MAX,
        }
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_rate: f64, // tokens per second
}

impl TokenBucket {
    pub fn new(config: &RateLimitConfig) -> Self {
        let capacity = config.burst_allowance as f64;
        let refill_rate = config.max_requests as f64 / config.time_window.as_secs_f64();

        Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_rate,
        }
    }

    /// Takes tokens, or reports how long until enough are available.
    pub async fn acquire(&self, tokens_needed: f64) -> Result<(), Duration> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let elapsed = now.duration_since(state.last_refill);
        state.tokens = (state.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= tokens_needed {
            state.tokens -= tokens_needed;
            Ok(())
        } else {
            let missing = tokens_needed - state.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_rate))
        }
    }
}

/// Client-side throttle applied before every request to one platform.
#[derive(Debug)]
pub struct RateLimiter {
    token_bucket: TokenBucket,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            token_bucket: TokenBucket::new(&config),
        }
    }

    /// Waits until a request may be sent; returns the time spent waiting.
    pub async fn acquire(&self) -> Duration {
        let start_time = Instant::now();
        loop {
            match self.token_bucket.acquire(1.0).await {
                Ok(()) => break,
                Err(wait_time) => {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    sleep(wait_time).await;
                }
            }
        }
        start_time.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_basic() {
        let config = RateLimitConfig {
            max_requests: 10,
            time_window: Duration::from_secs(10),
            burst_allowance: 5,
        };

        let bucket = TokenBucket::new(&config);

        // Should be able to acquire up to burst allowance
        for _ in 0..5 {
            assert!(bucket.acquire(1.0).await.is_ok());
        }

        // Next acquisition should fail with a one second wait
        let wait = bucket.acquire(1.0).await.unwrap_err();
        assert_eq!(wait, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_refill() {
        let config = RateLimitConfig {
            max_requests: 60, // 1 token per second
            time_window: Duration::from_secs(60),
            burst_allowance: 2,
        };

        let bucket = TokenBucket::new(&config);

        assert!(bucket.acquire(2.0).await.is_ok());
        assert!(bucket.acquire(1.0).await.is_err());

        tokio::time::advance(Duration::from_millis(1100)).await;

        assert!(bucket.acquire(1.0).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_waits_when_bucket_is_empty() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 60,
            time_window: Duration::from_secs(60),
            burst_allowance: 1,
        });

        assert_eq!(limiter.acquire().await, Duration::ZERO);
        let waited = limiter.acquire().await;
        assert!(waited >= Duration::from_millis(999), "waited {waited:?}");
    }

    #[test]
    fn test_platform_budgets_and_overrides() {
        let reddit = RateLimitConfig::for_platform(Platform::Reddit);
        assert_eq!(reddit.max_requests, 30);
        assert_eq!(reddit.burst_allowance, 5);

        let settings = PlatformSettings {
            requests_per_minute: Some(600),
            burst: Some(0),
            ..Default::default()
        };
        let tuned = reddit.with_overrides(&settings);
        assert_eq!(tuned.max_requests, 600);
        assert_eq!(tuned.burst_allowance, 1);
    }

    #[tokio::test]
    async fn test_unlimited_never_waits() {
        let limiter = RateLimiter::new(RateLimitConfig::unlimited());
        for _ in 0..100 {
            assert!(limiter.acquire().await < Duration::from_millis(50));
        }
    }
}
