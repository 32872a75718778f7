pub mod hackernews;
pub mod reddit;
pub mod text;
pub mod x;
pub mod youtube;

use harvest_client::{Credential, Fetcher, FetcherConfig};
use harvest_core::{Comment, HarvestConfig, HarvestError, Platform, Post};

pub use hackernews::HackerNewsClient;
pub use reddit::RedditClient;
pub use x::XClient;
pub use youtube::YouTubeClient;

/// A root post and its comments in display order.
#[derive(Debug, Clone, PartialEq)]
pub struct Thread {
    pub root: Post,
    pub comments: Vec<Comment>,
}

/// Builds a fetcher from the loaded config, falling back to `default_base_url`.
pub(crate) fn build_fetcher(
    platform: Platform,
    default_base_url: &str,
    config: &HarvestConfig,
    credential: Credential,
) -> Result<Fetcher, HarvestError> {
    Fetcher::new(
        FetcherConfig::from_config(platform, default_base_url, config).with_credential(credential),
    )
}

/// Resource-not-found outcome for APIs that answer `null` instead of 404.
pub(crate) fn not_found(platform: Platform, endpoint: &str, what: &str) -> HarvestError {
    HarvestError::ClientRequest {
        platform,
        endpoint: endpoint.to_string(),
        status: 404,
        body: format!("{what} not found"),
    }
}
