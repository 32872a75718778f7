//! Reddit's public `.json` listings. No credential is needed.

use crate::text::{normalize_subreddit, reddit_post_id, subreddit_mentions};
use crate::{build_fetcher, not_found, Thread};
use harvest_client::{Credential, Fetcher, PageCursor, PageSource, PaginationWalker, RawPage};
use harvest_core::normalize::{
    count, flag, normalize_page, opt_str, required_id, required_str, signed, str_or_empty,
    truncate, unix_timestamp, RecordSet,
};
use harvest_core::{
    Comment, Community, HarvestConfig, HarvestError, NormalizedRecord, Platform, Post,
};
use serde::Deserialize;
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::str::FromStr;
use tracing::{debug, info, warn};

pub const REDDIT_BASE_URL: &str = "https://www.reddit.com";

const SITE_URL: &str = "https://reddit.com";
const MAX_LISTING_LIMIT: u32 = 100;
const MIN_PER_SUBREDDIT: u32 = 10;
const MAX_DESCRIPTION_CHARS: usize = 500;
const MAX_FULL_DESCRIPTION_CHARS: usize = 2_000;

const PLATFORM: Platform = Platform::Reddit;

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    kind: String,
    data: Value,
}

fn parse_listing(body: Value, entity: &str) -> Result<Listing, HarvestError> {
    serde_json::from_value(body).map_err(|e| HarvestError::malformed(PLATFORM, entity, e.to_string()))
}

macro_rules! choice_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = HarvestError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(HarvestError::usage(format!(
                        "unknown {} '{}' (expected one of: {})",
                        stringify!($name),
                        other,
                        [$($text),+].join(", ")
                    ))),
                }
            }
        }
    };
}

choice_enum!(
    /// Subreddit listing order.
    PostSort { Hot => "hot", New => "new", Top => "top", Rising => "rising" }
);

choice_enum!(
    /// Search result order.
    SearchSort { Relevance => "relevance", Top => "top", New => "new", Comments => "comments" }
);

choice_enum!(
    TimeWindow {
        Hour => "hour",
        Day => "day",
        Week => "week",
        Month => "month",
        Year => "year",
        All => "all",
    }
);

choice_enum!(
    /// Subreddit directory listings.
    SubredditListing { Popular => "popular", New => "new" }
);

/// Merged search results plus the subreddits that could not be searched.
#[derive(Debug)]
pub struct PostSearch {
    pub posts: Vec<NormalizedRecord>,
    pub failed: Vec<(String, HarvestError)>,
}

#[derive(Debug)]
pub struct RedditClient {
    fetcher: Fetcher,
}

impl RedditClient {
    pub fn new(config: &HarvestConfig) -> Result<Self, HarvestError> {
        Ok(Self {
            fetcher: build_fetcher(PLATFORM, REDDIT_BASE_URL, config, Credential::None)?,
        })
    }

    async fn walk(
        &self,
        path: String,
        params: Vec<(&'static str, String)>,
        target: u32,
    ) -> Result<Vec<Value>, HarvestError> {
        let source = ListingSource {
            fetcher: &self.fetcher,
            path,
            params,
        };
        PaginationWalker::new(source, target, MAX_LISTING_LIMIT)
            .collect_items()
            .await
    }

    pub async fn search_subreddits(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<NormalizedRecord>, HarvestError> {
        let items = self
            .walk(
                "subreddits/search.json".to_string(),
                vec![("q", query.to_string()), ("include_over_18", "1".to_string())],
                limit,
            )
            .await?;
        Ok(dedupe(normalize_page(&items, community_from_listing)))
    }

    pub async fn subreddit_info(&self, name: &str) -> Result<Community, HarvestError> {
        let name = normalize_subreddit(name);
        let endpoint = format!("r/{name}/about.json");
        let body = self.fetcher.fetch(&endpoint, &[]).await?;

        let data = body
            .get("data")
            .filter(|data| data.get("display_name").is_some())
            .ok_or_else(|| not_found(PLATFORM, &endpoint, "subreddit"))?;
        community(data)
    }

    pub async fn popular_subreddits(
        &self,
        listing: SubredditListing,
        limit: u32,
    ) -> Result<Vec<NormalizedRecord>, HarvestError> {
        let items = self
            .walk(format!("subreddits/{}.json", listing.as_str()), Vec::new(), limit)
            .await?;
        Ok(dedupe(normalize_page(&items, community_from_listing)))
    }

    pub async fn subreddit_posts(
        &self,
        name: &str,
        sort: PostSort,
        time: TimeWindow,
        limit: u32,
    ) -> Result<Vec<NormalizedRecord>, HarvestError> {
        let name = normalize_subreddit(name);
        let mut params = Vec::new();
        if sort == PostSort::Top {
            params.push(("t", time.as_str().to_string()));
        }
        let items = self
            .walk(format!("r/{name}/{}.json", sort.as_str()), params, limit)
            .await?;
        Ok(dedupe(normalize_page(&items, post_from_listing)))
    }

    /// Site-wide search, or one walk per subreddit merged by score.
    ///
    /// A subreddit that cannot be searched is reported in
    /// [`PostSearch::failed`]; the call only errors when nothing succeeded.
    pub async fn search_posts(
        &self,
        query: &str,
        subreddits: &[String],
        sort: SearchSort,
        time: TimeWindow,
        limit: u32,
    ) -> Result<PostSearch, HarvestError> {
        let base_params = vec![
            ("q", query.to_string()),
            ("sort", sort.as_str().to_string()),
            ("t", time.as_str().to_string()),
        ];

        let mut records = RecordSet::new();
        let mut failed = Vec::new();
        if subreddits.is_empty() {
            let items = self
                .walk("search.json".to_string(), base_params, limit)
                .await?;
            records.extend(normalize_page(&items, post_from_listing));
        } else {
            let per_subreddit = (limit / subreddits.len() as u32).max(MIN_PER_SUBREDDIT);
            for subreddit in subreddits {
                let name = normalize_subreddit(subreddit);
                let mut params = base_params.clone();
                params.push(("restrict_sr", "on".to_string()));
                match self
                    .walk(format!("r/{name}/search.json"), params, per_subreddit)
                    .await
                {
                    Ok(items) => {
                        debug!("r/{} returned {} search results", name, items.len());
                        records.extend(normalize_page(&items, post_from_listing));
                    }
                    Err(error) => {
                        warn!("Search in r/{} failed: {}", name, error);
                        failed.push((name, error));
                    }
                }
            }
            if failed.len() == subreddits.len() {
                let (_, error) = failed.swap_remove(0);
                return Err(error);
            }
        }

        let mut posts = records.into_vec();
        posts.sort_by_key(|record| Reverse(post_score(record)));
        posts.truncate(limit as usize);
        info!("Reddit search returned {} posts", posts.len());
        Ok(PostSearch { posts, failed })
    }

    /// The post plus its comment tree flattened depth-first.
    pub async fn post_comments(&self, post_ref: &str, limit: u32) -> Result<Thread, HarvestError> {
        let post_id = reddit_post_id(post_ref);
        if post_id.is_empty() {
            return Err(HarvestError::usage("--post-id must name a post id or URL"));
        }

        let lookup = format!("by_id/t3_{post_id}.json");
        let listing = parse_listing(self.fetcher.fetch(&lookup, &[]).await?, "post lookup")?;
        let raw_post = listing
            .data
            .children
            .into_iter()
            .next()
            .map(|child| child.data)
            .ok_or_else(|| not_found(PLATFORM, &lookup, "post"))?;

        let root = post(&raw_post)?;
        let subreddit = root
            .community
            .clone()
            .ok_or_else(|| HarvestError::malformed(PLATFORM, "post", "missing 'subreddit'"))?;

        let endpoint = format!("r/{subreddit}/comments/{post_id}.json");
        let body = self
            .fetcher
            .fetch(&endpoint, &[("limit", limit.to_string())])
            .await?;
        let comment_listing = body
            .as_array()
            .and_then(|parts| parts.get(1))
            .cloned()
            .ok_or_else(|| {
                HarvestError::malformed(PLATFORM, "comment tree", "expected [post, comments] pair")
            })?;
        let listing = parse_listing(comment_listing, "comment tree")?;

        let mut comments = Vec::new();
        flatten_comments(&listing.data.children, 0, &mut comments);
        comments.truncate(limit as usize);
        info!("Post {} has {} comments", post_id, comments.len());
        Ok(Thread { root, comments })
    }
}

struct ListingSource<'a> {
    fetcher: &'a Fetcher,
    path: String,
    params: Vec<(&'static str, String)>,
}

impl PageSource for ListingSource<'_> {
    async fn fetch_page(
        &self,
        cursor: Option<&PageCursor>,
        page_size: u32,
    ) -> Result<RawPage, HarvestError> {
        let mut params = self.params.clone();
        params.push(("limit", page_size.to_string()));
        if let Some(PageCursor::Token(after)) = cursor {
            params.push(("after", after.clone()));
        }

        let listing = parse_listing(self.fetcher.fetch(&self.path, &params).await?, "listing")?;
        Ok(RawPage {
            items: listing
                .data
                .children
                .into_iter()
                .filter(|child| child.kind != "more")
                .map(|child| child.data)
                .collect(),
            next: listing.data.after.map(PageCursor::Token),
            includes: None,
        })
    }
}

fn dedupe(records: Vec<NormalizedRecord>) -> Vec<NormalizedRecord> {
    let mut set = RecordSet::new();
    set.extend(records);
    set.into_vec()
}

fn post_score(record: &NormalizedRecord) -> i64 {
    match record {
        NormalizedRecord::Post(post) => post.score,
        _ => 0,
    }
}

fn flatten_comments(children: &[ListingChild], depth: u32, out: &mut Vec<Comment>) {
    for child in children.iter().filter(|child| child.kind == "t1") {
        let replies = child
            .data
            .get("replies")
            .filter(|replies| replies.is_object())
            .and_then(|replies| parse_listing(replies.clone(), "replies").ok())
            .map(|listing| listing.data.children)
            .unwrap_or_default();

        match comment(&child.data, depth, replies.len() as u64) {
            Ok(comment) => out.push(comment),
            Err(error) => warn!("Skipping comment: {}", error),
        }
        flatten_comments(&replies, depth + 1, out);
    }
}

fn permalink(raw: &Value) -> String {
    format!("{SITE_URL}{}", str_or_empty(raw, "permalink"))
}

/// Listing child of kind `t3`.
pub fn post_from_listing(raw: &Value) -> Result<NormalizedRecord, HarvestError> {
    post(raw).map(NormalizedRecord::Post)
}

fn post(raw: &Value) -> Result<Post, HarvestError> {
    Ok(Post {
        platform: PLATFORM,
        id: required_id(raw, "id", PLATFORM, "post")?,
        author: required_str(raw, "author", PLATFORM, "post")?,
        title: str_or_empty(raw, "title"),
        body: str_or_empty(raw, "selftext"),
        score: signed(raw, "score"),
        comment_count: count(raw, "num_comments"),
        upvote_ratio: raw.get("upvote_ratio").and_then(Value::as_f64),
        community: opt_str(raw, "subreddit"),
        flair: opt_str(raw, "link_flair_text"),
        link_url: opt_str(raw, "url"),
        permalink: permalink(raw),
        created_at: unix_timestamp(raw, "created_utc"),
    })
}

/// Listing child of kind `t5`.
pub fn community_from_listing(raw: &Value) -> Result<NormalizedRecord, HarvestError> {
    community(raw).map(NormalizedRecord::Community)
}

fn community(raw: &Value) -> Result<Community, HarvestError> {
    let name = required_str(raw, "display_name", PLATFORM, "subreddit")?;
    let public = str_or_empty(raw, "public_description");
    let full = str_or_empty(raw, "description");
    let active = match count(raw, "accounts_active") {
        0 => count(raw, "active_user_count"),
        n => n,
    };

    Ok(Community {
        platform: PLATFORM,
        url: format!("{SITE_URL}/r/{name}"),
        related: subreddit_mentions(&format!("{full} {public}"))
            .into_iter()
            .filter(|related| !related.eq_ignore_ascii_case(&name))
            .collect(),
        name,
        subscribers: count(raw, "subscribers"),
        active_users: active,
        description: truncate(&public, MAX_DESCRIPTION_CHARS),
        full_description: truncate(&full, MAX_FULL_DESCRIPTION_CHARS),
        nsfw: flag(raw, "over18"),
        created_at: unix_timestamp(raw, "created_utc"),
    })
}

/// Listing child of kind `t1`.
pub fn comment_from_listing(raw: &Value, depth: u32) -> Result<NormalizedRecord, HarvestError> {
    comment(raw, depth, 0).map(NormalizedRecord::Comment)
}

fn comment(raw: &Value, depth: u32, reply_count: u64) -> Result<Comment, HarvestError> {
    Ok(Comment {
        platform: PLATFORM,
        id: required_id(raw, "id", PLATFORM, "comment")?,
        author: required_str(raw, "author", PLATFORM, "comment")?,
        body: str_or_empty(raw, "body"),
        score: signed(raw, "score"),
        reply_count,
        depth,
        parent_id: opt_str(raw, "parent_id"),
        parent_title: None,
        permalink: permalink(raw),
        created_at: unix_timestamp(raw, "created_utc"),
        signals: BTreeSet::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn comment_child(id: &str, replies: Value) -> Value {
        json!({
            "kind": "t1",
            "data": {
                "id": id,
                "author": format!("user_{id}"),
                "body": format!("body {id}"),
                "score": 3,
                "permalink": format!("/r/rust/comments/abc/t/{id}/"),
                "replies": replies
            }
        })
    }

    #[test]
    fn test_post_from_listing() {
        let raw = json!({
            "id": "abc123",
            "title": "Rust 2.0 when?",
            "author": "ferris",
            "subreddit": "rust",
            "score": 1543,
            "num_comments": 201,
            "upvote_ratio": 0.97,
            "selftext": "",
            "permalink": "/r/rust/comments/abc123/rust_20_when/",
            "created_utc": 1700000000.0
        });

        let NormalizedRecord::Post(post) = post_from_listing(&raw).unwrap() else {
            panic!("expected post");
        };
        assert_eq!(post.community.as_deref(), Some("rust"));
        assert_eq!(post.score, 1543);
        assert_eq!(post.upvote_ratio, Some(0.97));
        assert_eq!(
            post.permalink,
            "https://reddit.com/r/rust/comments/abc123/rust_20_when/"
        );
    }

    #[test]
    fn test_community_extracts_related_subreddits() {
        let raw = json!({
            "display_name": "rust",
            "subscribers": 300000,
            "accounts_active": null,
            "active_user_count": 1200,
            "public_description": "A place for all things Rust",
            "description": "See also /r/learnrust and /r/rust_gamedev. Not /r/rust itself.",
            "over18": false
        });

        let community = community(&raw).unwrap();
        assert_eq!(community.active_users, 1200);
        assert_eq!(community.related, vec!["learnrust", "rust_gamedev"]);
        assert_eq!(community.url, "https://reddit.com/r/rust");
    }

    #[test]
    fn test_flatten_comments_is_depth_first() {
        let nested = json!({
            "kind": "Listing",
            "data": { "children": [comment_child("b", json!(""))], "after": null }
        });
        let tree: Listing = serde_json::from_value(json!({
            "data": {
                "children": [
                    comment_child("a", nested),
                    comment_child("c", json!("")),
                    { "kind": "more", "data": { "id": "zz", "count": 40 } }
                ],
                "after": null
            }
        }))
        .unwrap();

        let mut comments = Vec::new();
        flatten_comments(&tree.data.children, 0, &mut comments);

        let order: Vec<(&str, u32)> = comments.iter().map(|c| (c.id.as_str(), c.depth)).collect();
        assert_eq!(order, vec![("a", 0), ("b", 1), ("c", 0)]);
        assert_eq!(comments[0].reply_count, 1);
        assert!(comments[1].is_reply());
    }

    #[test]
    fn test_deleted_comment_without_author_is_malformed() {
        let raw = json!({"id": "x1", "body": "[removed]"});
        assert!(matches!(
            comment_from_listing(&raw, 0),
            Err(HarvestError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_choice_parsing() {
        assert_eq!("top".parse::<PostSort>().unwrap(), PostSort::Top);
        assert_eq!("comments".parse::<SearchSort>().unwrap(), SearchSort::Comments);
        assert_eq!("all".parse::<TimeWindow>().unwrap(), TimeWindow::All);
        let err = "decade".parse::<TimeWindow>().unwrap_err();
        assert!(err.to_string().contains("hour, day, week, month, year, all"));
    }
}
