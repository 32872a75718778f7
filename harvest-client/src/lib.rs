pub mod fetcher;
pub mod pagination;
pub mod rate_limiter;
pub mod retry;


pub use fetcher::{classify_response, Credential, Fetcher, FetcherConfig};
pub use pagination::{PageCursor, PageSource, PaginationWalker, RawPage};
pub use rate_limiter::{RateLimitConfig, RateLimiter, TokenBucket};
pub use retry::{RetryConfig, RetryExecutor, RetryMetrics, RetryStrategy};
