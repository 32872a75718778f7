//! X API v2: recent search, engagement drill-down and user lookup.

use crate::build_fetcher;
use crate::text::strip_handle;
use harvest_client::{Credential, Fetcher, PageCursor, PageSource, PaginationWalker, RawPage};
use harvest_core::normalize::{
    count, flag, normalize_page, opt_str, required_id, required_str, rfc3339_timestamp,
    str_or_empty, RecordSet,
};
use harvest_core::{HarvestConfig, HarvestError, NormalizedRecord, Platform, Tweet, UserProfile};
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::HashMap;
use tracing::{info, warn};

pub const X_BASE_URL: &str = "https://api.x.com/2";

const SITE_URL: &str = "https://x.com";
const TWEET_FIELDS: &str = "id,text,author_id,created_at,public_metrics,conversation_id";
const USER_FIELDS: &str =
    "id,name,username,created_at,description,public_metrics,verified,location,url";
const MAX_PAGE_SIZE: u32 = 100;
/// `tweets/search/recent` and `quote_tweets` reject `max_results` below 10.
const MIN_TWEET_PAGE: u32 = 10;
const MIN_USER_PAGE: u32 = 1;

const PLATFORM: Platform = Platform::X;

/// The three engagement views of one tweet, fetched independently.
#[derive(Debug)]
pub struct Drilldown {
    pub tweet_id: String,
    /// Sorted by follower count, largest first.
    pub liking_users: Result<Vec<NormalizedRecord>, HarvestError>,
    /// Sorted by follower count, largest first.
    pub retweeted_by: Result<Vec<NormalizedRecord>, HarvestError>,
    pub quote_tweets: Result<Vec<NormalizedRecord>, HarvestError>,
}

impl Drilldown {
    pub fn tweet_url(&self) -> String {
        format!("{SITE_URL}/i/status/{}", self.tweet_id)
    }
}

#[derive(Debug)]
pub struct XClient {
    fetcher: Fetcher,
}

impl XClient {
    pub fn new(config: &HarvestConfig, bearer_token: String) -> Result<Self, HarvestError> {
        Ok(Self {
            fetcher: build_fetcher(PLATFORM, X_BASE_URL, config, Credential::Bearer(bearer_token))?,
        })
    }

    pub async fn search(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<NormalizedRecord>, HarvestError> {
        let source = EndpointSource {
            fetcher: &self.fetcher,
            endpoint: "tweets/search/recent".to_string(),
            params: vec![
                ("query", query.to_string()),
                ("tweet.fields", TWEET_FIELDS.to_string()),
                ("user.fields", USER_FIELDS.to_string()),
                ("expansions", "author_id".to_string()),
            ],
            cursor_param: "next_token",
            min_page_size: MIN_TWEET_PAGE,
        };
        let walker = PaginationWalker::new(source, max_results, MAX_PAGE_SIZE);
        let tweets = tweets_from_pages(walker.collect_pages().await?);
        info!("X search returned {} tweets", tweets.len());
        Ok(tweets)
    }

    /// Likers, retweeters and quotes, one after another. A failed view does
    /// not affect the others.
    pub async fn drill(&self, tweet_id: &str, max_users: u32) -> Drilldown {
        let liking_users = self
            .engaged_users(tweet_id, "liking_users", max_users)
            .await;
        let retweeted_by = self
            .engaged_users(tweet_id, "retweeted_by", max_users)
            .await;
        let quote_tweets = self.quote_tweets(tweet_id, max_users).await;

        for (view, result) in [
            ("liking_users", liking_users.as_ref().err()),
            ("retweeted_by", retweeted_by.as_ref().err()),
            ("quote_tweets", quote_tweets.as_ref().err()),
        ] {
            if let Some(error) = result {
                warn!("Drill-down view {} failed: {}", view, error);
            }
        }

        Drilldown {
            tweet_id: tweet_id.to_string(),
            liking_users,
            retweeted_by,
            quote_tweets,
        }
    }

    async fn engaged_users(
        &self,
        tweet_id: &str,
        view: &str,
        max_users: u32,
    ) -> Result<Vec<NormalizedRecord>, HarvestError> {
        let source = EndpointSource {
            fetcher: &self.fetcher,
            endpoint: format!("tweets/{tweet_id}/{view}"),
            params: vec![("user.fields", USER_FIELDS.to_string())],
            cursor_param: "pagination_token",
            min_page_size: MIN_USER_PAGE,
        };
        let items = PaginationWalker::new(source, max_users, MAX_PAGE_SIZE)
            .collect_items()
            .await?;

        let mut users = RecordSet::new();
        users.extend(normalize_page(&items, user_from_json));
        let mut users = users.into_vec();
        users.sort_by_key(|user| Reverse(user.reach()));
        Ok(users)
    }

    async fn quote_tweets(
        &self,
        tweet_id: &str,
        max_results: u32,
    ) -> Result<Vec<NormalizedRecord>, HarvestError> {
        let source = EndpointSource {
            fetcher: &self.fetcher,
            endpoint: format!("tweets/{tweet_id}/quote_tweets"),
            params: vec![
                ("tweet.fields", TWEET_FIELDS.to_string()),
                ("user.fields", USER_FIELDS.to_string()),
                ("expansions", "author_id".to_string()),
            ],
            cursor_param: "pagination_token",
            min_page_size: MIN_TWEET_PAGE,
        };
        let pages = PaginationWalker::new(source, max_results, MAX_PAGE_SIZE)
            .collect_pages()
            .await?;
        Ok(tweets_from_pages(pages))
    }

    pub async fn user(&self, username: &str) -> Result<UserProfile, HarvestError> {
        let handle = strip_handle(username);
        if handle.is_empty() {
            return Err(HarvestError::usage("--username must not be empty"));
        }

        let body = self
            .fetcher
            .fetch(
                &format!("users/by/username/{handle}"),
                &[("user.fields", USER_FIELDS.to_string())],
            )
            .await?;
        let data = body
            .get("data")
            .ok_or_else(|| HarvestError::malformed(PLATFORM, "user", "missing 'data'"))?;
        user_profile(data)
    }
}

struct EndpointSource<'a> {
    fetcher: &'a Fetcher,
    endpoint: String,
    params: Vec<(&'static str, String)>,
    cursor_param: &'static str,
    min_page_size: u32,
}

impl PageSource for EndpointSource<'_> {
    async fn fetch_page(
        &self,
        cursor: Option<&PageCursor>,
        page_size: u32,
    ) -> Result<RawPage, HarvestError> {
        let mut params = self.params.clone();
        params.push((
            "max_results",
            page_size.clamp(self.min_page_size, MAX_PAGE_SIZE).to_string(),
        ));
        if let Some(PageCursor::Token(token)) = cursor {
            params.push((self.cursor_param, token.clone()));
        }

        let body = self.fetcher.fetch(&self.endpoint, &params).await?;
        let items = body
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let next = body
            .pointer("/meta/next_token")
            .and_then(Value::as_str)
            .map(|token| PageCursor::Token(token.to_string()));

        Ok(RawPage {
            items,
            next,
            includes: body.get("includes").cloned(),
        })
    }
}

/// Joins each page's tweets with the authors side-loaded in `includes.users`.
fn tweets_from_pages(pages: Vec<RawPage>) -> Vec<NormalizedRecord> {
    let mut tweets = RecordSet::new();
    for page in pages {
        let authors = author_index(page.includes.as_ref());
        tweets.extend(normalize_page(&page.items, |raw| tweet_from_json(raw, &authors)));
    }
    tweets.into_vec()
}

fn author_index(includes: Option<&Value>) -> HashMap<String, Value> {
    includes
        .and_then(|includes| includes.get("users"))
        .and_then(Value::as_array)
        .map(|users| {
            users
                .iter()
                .filter_map(|user| Some((opt_str(user, "id")?, user.clone())))
                .collect()
        })
        .unwrap_or_default()
}

pub fn tweet_from_json(
    raw: &Value,
    authors: &HashMap<String, Value>,
) -> Result<NormalizedRecord, HarvestError> {
    let id = required_id(raw, "id", PLATFORM, "tweet")?;
    let author_id = required_str(raw, "author_id", PLATFORM, "tweet")?;
    let author = authors.get(&author_id);
    let username = author.and_then(|a| opt_str(a, "username"));
    let metrics = raw.get("public_metrics").cloned().unwrap_or(Value::Null);

    Ok(NormalizedRecord::Tweet(Tweet {
        url: format!("{SITE_URL}/{}/status/{id}", username.as_deref().unwrap_or("i")),
        id,
        author: username.unwrap_or_else(|| author_id.clone()),
        author_name: author
            .and_then(|a| opt_str(a, "name"))
            .unwrap_or_else(|| "Unknown".to_string()),
        author_followers: author
            .and_then(|a| a.get("public_metrics"))
            .map_or(0, |m| count(m, "followers_count")),
        author_verified: author.is_some_and(|a| flag(a, "verified")),
        text: str_or_empty(raw, "text"),
        likes: count(&metrics, "like_count"),
        retweets: count(&metrics, "retweet_count"),
        replies: count(&metrics, "reply_count"),
        quotes: count(&metrics, "quote_count"),
        conversation_id: opt_str(raw, "conversation_id"),
        created_at: rfc3339_timestamp(raw, "created_at"),
    }))
}

pub fn user_from_json(raw: &Value) -> Result<NormalizedRecord, HarvestError> {
    user_profile(raw).map(NormalizedRecord::User)
}

fn user_profile(raw: &Value) -> Result<UserProfile, HarvestError> {
    let id = required_id(raw, "id", PLATFORM, "user")?;
    let handle = required_str(raw, "username", PLATFORM, "user")?;
    let metrics = raw.get("public_metrics").cloned().unwrap_or(Value::Null);

    Ok(UserProfile {
        platform: PLATFORM,
        id,
        profile_url: format!("{SITE_URL}/{handle}"),
        handle,
        display_name: opt_str(raw, "name"),
        bio: str_or_empty(raw, "description"),
        location: opt_str(raw, "location"),
        website: opt_str(raw, "url"),
        followers: count(&metrics, "followers_count"),
        following: count(&metrics, "following_count"),
        post_count: count(&metrics, "tweet_count"),
        karma: 0,
        verified: flag(raw, "verified"),
        recent_submissions: Vec::new(),
        created_at: rfc3339_timestamp(raw, "created_at"),
    })
}
