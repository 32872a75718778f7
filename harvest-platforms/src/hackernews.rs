//! Hacker News: Algolia full-text search and the Firebase item API.

use crate::text::clean_html;
use crate::{build_fetcher, not_found, Thread};
use harvest_client::{
    Credential, Fetcher, FetcherConfig, PageCursor, PageSource, PaginationWalker, RawPage,
};
use harvest_core::normalize::{
    count, flag, normalize_page, opt_str, required_id, required_str, rfc3339_timestamp, signed,
    str_or_empty, unix_timestamp, RecordSet,
};
use harvest_core::{
    Comment, HarvestConfig, HarvestError, NormalizedRecord, Platform, Post, UserProfile,
};
use serde_json::Value;
use std::collections::BTreeSet;
use std::str::FromStr;
use tracing::{debug, info};

pub const ALGOLIA_BASE_URL: &str = "https://hn.algolia.com/api/v1";
pub const FIREBASE_BASE_URL: &str = "https://hacker-news.firebaseio.com/v0";

const ITEM_URL: &str = "https://news.ycombinator.com/item?id=";
const USER_URL: &str = "https://news.ycombinator.com/user?id=";
const MAX_HITS_PER_PAGE: u32 = 100;
const MAX_RECENT_SUBMISSIONS: usize = 20;

const PLATFORM: Platform = Platform::HackerNews;

/// Firebase story listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoryList {
    Top,
    New,
    Best,
}

impl StoryList {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoryList::Top => "top",
            StoryList::New => "new",
            StoryList::Best => "best",
        }
    }

    fn endpoint(&self) -> String {
        format!("{}stories.json", self.as_str())
    }
}

impl FromStr for StoryList {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "top" => Ok(StoryList::Top),
            "new" => Ok(StoryList::New),
            "best" => Ok(StoryList::Best),
            other => Err(HarvestError::usage(format!(
                "unknown story list '{other}' (expected top, new or best)"
            ))),
        }
    }
}

/// Story ids are numeric; reject anything else before touching the network.
pub fn parse_item_id(raw: &str) -> Result<u64, HarvestError> {
    raw.trim()
        .parse()
        .map_err(|_| HarvestError::usage(format!("--id must be a numeric story id, got '{raw}'")))
}

/// Stories and comments matching one search, each walked independently.
#[derive(Debug)]
pub struct SearchResults {
    pub stories: Result<Vec<NormalizedRecord>, HarvestError>,
    pub comments: Result<Vec<NormalizedRecord>, HarvestError>,
}

#[derive(Debug)]
pub struct HackerNewsClient {
    search: Fetcher,
    items: Fetcher,
}

impl HackerNewsClient {
    pub fn new(config: &HarvestConfig) -> Result<Self, HarvestError> {
        let search = build_fetcher(PLATFORM, ALGOLIA_BASE_URL, config, Credential::None)?;

        let mut items_config = FetcherConfig::from_config(PLATFORM, FIREBASE_BASE_URL, config);
        items_config.base_url = config
            .hn
            .item_base_url
            .clone()
            .unwrap_or_else(|| FIREBASE_BASE_URL.to_string());
        let items = Fetcher::new(items_config)?;

        Ok(Self { search, items })
    }

    pub async fn search(&self, query: &str, max_stories: u32, max_comments: u32) -> SearchResults {
        let stories = self.search_hits(query, "story", max_stories, story_from_hit).await;
        let comments = self
            .search_hits(query, "comment", max_comments, comment_from_hit)
            .await;
        SearchResults { stories, comments }
    }

    async fn search_hits(
        &self,
        query: &str,
        tag: &'static str,
        target: u32,
        normalize: fn(&Value) -> Result<NormalizedRecord, HarvestError>,
    ) -> Result<Vec<NormalizedRecord>, HarvestError> {
        let source = AlgoliaSource {
            fetcher: &self.search,
            query: query.to_string(),
            tag,
        };
        let walker = PaginationWalker::new(source, target, MAX_HITS_PER_PAGE);
        let items = walker.collect_items().await?;

        let mut records = RecordSet::new();
        records.extend(normalize_page(&items, normalize));
        info!("Hacker News search returned {} {} hits", records.len(), tag);
        Ok(records.into_vec())
    }

    /// Front-page style listing; items are fetched one at a time in list order.
    pub async fn stories(
        &self,
        list: StoryList,
        limit: u32,
    ) -> Result<Vec<NormalizedRecord>, HarvestError> {
        let endpoint = list.endpoint();
        let ids = self.items.fetch(&endpoint, &[]).await?;
        let ids = ids.as_array().ok_or_else(|| {
            HarvestError::malformed(PLATFORM, "story list", "expected an array of ids")
        })?;

        let mut records = RecordSet::new();
        for id in ids.iter().take(limit as usize) {
            let Some(item) = self.item(id).await? else {
                continue;
            };
            if flag(&item, "deleted") || flag(&item, "dead") {
                continue;
            }
            records.extend(normalize_page(std::slice::from_ref(&item), story_from_item));
        }
        info!("Fetched {} {} stories", records.len(), list.as_str());
        Ok(records.into_vec())
    }

    /// A story and up to `max_comments` of its live top-level comments.
    pub async fn thread(&self, story_id: u64, max_comments: u32) -> Result<Thread, HarvestError> {
        let story = self
            .item(&Value::from(story_id))
            .await?
            .ok_or_else(|| not_found(PLATFORM, &format!("item/{story_id}.json"), "story"))?;

        let root = story_post(&story)?;

        let kids = story
            .get("kids")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut comments = Vec::new();
        for kid in kids.iter().take(max_comments as usize) {
            let Some(item) = self.item(kid).await? else {
                continue;
            };
            let live = !flag(&item, "deleted") && !flag(&item, "dead");
            if str_or_empty(&item, "type") != "comment" || !live {
                continue;
            }
            for record in normalize_page(std::slice::from_ref(&item), comment_from_item) {
                if let NormalizedRecord::Comment(comment) = record {
                    comments.push(comment);
                }
            }
        }

        info!("Thread {} has {} live comments", story_id, comments.len());
        Ok(Thread { root, comments })
    }

    pub async fn user(&self, username: &str) -> Result<UserProfile, HarvestError> {
        let endpoint = format!("user/{username}.json");
        let raw = self.items.fetch(&endpoint, &[]).await?;
        if raw.is_null() {
            return Err(not_found(PLATFORM, &endpoint, "user"));
        }
        user_profile(&raw)
    }

    /// `None` when Firebase answers `null` for the id.
    async fn item(&self, id: &Value) -> Result<Option<Value>, HarvestError> {
        let id = match id {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            other => {
                debug!("Ignoring non-id entry {}", other);
                return Ok(None);
            }
        };
        let item = self.items.fetch(&format!("item/{id}.json"), &[]).await?;
        Ok((!item.is_null()).then_some(item))
    }
}

struct AlgoliaSource<'a> {
    fetcher: &'a Fetcher,
    query: String,
    tag: &'static str,
}

impl PageSource for AlgoliaSource<'_> {
    async fn fetch_page(
        &self,
        cursor: Option<&PageCursor>,
        page_size: u32,
    ) -> Result<RawPage, HarvestError> {
        let page = match cursor {
            Some(PageCursor::Offset(n)) => *n,
            _ => 0,
        };
        let body = self
            .fetcher
            .fetch(
                "search",
                &[
                    ("query", self.query.clone()),
                    ("tags", self.tag.to_string()),
                    ("hitsPerPage", page_size.to_string()),
                    ("page", page.to_string()),
                ],
            )
            .await?;

        let hits = body
            .get("hits")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| HarvestError::malformed(PLATFORM, "search page", "missing 'hits'"))?;
        let total_pages = count(&body, "nbPages") as u32;

        Ok(RawPage {
            items: hits,
            next: (page + 1 < total_pages).then_some(PageCursor::Offset(page + 1)),
            includes: None,
        })
    }
}

fn item_url(id: &str) -> String {
    format!("{ITEM_URL}{id}")
}

/// Algolia hit with `tags=story`.
pub fn story_from_hit(raw: &Value) -> Result<NormalizedRecord, HarvestError> {
    let id = required_id(raw, "objectID", PLATFORM, "story hit")?;
    let author = required_str(raw, "author", PLATFORM, "story hit")?;

    Ok(NormalizedRecord::Post(Post {
        platform: PLATFORM,
        permalink: item_url(&id),
        id,
        author,
        title: str_or_empty(raw, "title"),
        body: clean_html(&str_or_empty(raw, "story_text")),
        score: signed(raw, "points"),
        comment_count: count(raw, "num_comments"),
        upvote_ratio: None,
        community: None,
        flair: None,
        link_url: opt_str(raw, "url"),
        created_at: rfc3339_timestamp(raw, "created_at").or_else(|| unix_timestamp(raw, "created_at_i")),
    }))
}

/// Algolia hit with `tags=comment`.
pub fn comment_from_hit(raw: &Value) -> Result<NormalizedRecord, HarvestError> {
    let id = required_id(raw, "objectID", PLATFORM, "comment hit")?;
    let author = required_str(raw, "author", PLATFORM, "comment hit")?;

    Ok(NormalizedRecord::Comment(Comment {
        platform: PLATFORM,
        permalink: item_url(&id),
        id,
        author,
        body: clean_html(&str_or_empty(raw, "comment_text")),
        score: signed(raw, "points"),
        reply_count: 0,
        depth: 0,
        parent_id: required_id(raw, "story_id", PLATFORM, "comment hit").ok(),
        parent_title: opt_str(raw, "story_title"),
        created_at: rfc3339_timestamp(raw, "created_at").or_else(|| unix_timestamp(raw, "created_at_i")),
        signals: BTreeSet::new(),
    }))
}

/// Firebase item of type `story` (or `job`/`poll`, which share the shape).
pub fn story_from_item(raw: &Value) -> Result<NormalizedRecord, HarvestError> {
    story_post(raw).map(NormalizedRecord::Post)
}

fn story_post(raw: &Value) -> Result<Post, HarvestError> {
    let id = required_id(raw, "id", PLATFORM, "item")?;
    let author = required_str(raw, "by", PLATFORM, "item")?;

    Ok(Post {
        platform: PLATFORM,
        permalink: item_url(&id),
        id,
        author,
        title: str_or_empty(raw, "title"),
        body: clean_html(&str_or_empty(raw, "text")),
        score: signed(raw, "score"),
        comment_count: count(raw, "descendants"),
        upvote_ratio: None,
        community: None,
        flair: None,
        link_url: opt_str(raw, "url"),
        created_at: unix_timestamp(raw, "time"),
    })
}

/// Firebase item of type `comment`.
pub fn comment_from_item(raw: &Value) -> Result<NormalizedRecord, HarvestError> {
    let id = required_id(raw, "id", PLATFORM, "comment")?;
    let author = required_str(raw, "by", PLATFORM, "comment")?;
    let replies = raw
        .get("kids")
        .and_then(Value::as_array)
        .map_or(0, |kids| kids.len() as u64);

    Ok(NormalizedRecord::Comment(Comment {
        platform: PLATFORM,
        permalink: item_url(&id),
        id,
        author,
        body: clean_html(&str_or_empty(raw, "text")),
        // Firebase hides comment scores
        score: 0,
        reply_count: replies,
        depth: 0,
        parent_id: required_id(raw, "parent", PLATFORM, "comment").ok(),
        parent_title: None,
        created_at: unix_timestamp(raw, "time"),
        signals: BTreeSet::new(),
    }))
}

pub fn user_from_item(raw: &Value) -> Result<NormalizedRecord, HarvestError> {
    user_profile(raw).map(NormalizedRecord::User)
}

fn user_profile(raw: &Value) -> Result<UserProfile, HarvestError> {
    let handle = required_id(raw, "id", PLATFORM, "user")?;
    let submitted: Vec<String> = raw
        .get("submitted")
        .and_then(Value::as_array)
        .map(|ids| ids.iter().map(|id| id.to_string()).collect())
        .unwrap_or_default();

    Ok(UserProfile {
        platform: PLATFORM,
        id: handle.clone(),
        profile_url: format!("{USER_URL}{handle}"),
        handle,
        display_name: None,
        bio: clean_html(&str_or_empty(raw, "about")),
        location: None,
        website: None,
        followers: 0,
        following: 0,
        post_count: submitted.len() as u64,
        karma: signed(raw, "karma"),
        verified: false,
        recent_submissions: submitted.into_iter().take(MAX_RECENT_SUBMISSIONS).collect(),
        created_at: unix_timestamp(raw, "created"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_story_from_hit() {
        let raw = json!({
            "objectID": "38000001",
            "title": "Show HN: A thing",
            "url": "https://example.com",
            "author": "pg",
            "points": 120,
            "num_comments": null,
            "created_at": "2024-01-02T03:04:05.000Z"
        });

        let NormalizedRecord::Post(post) = story_from_hit(&raw).unwrap() else {
            panic!("expected a post");
        };
        assert_eq!(post.id, "38000001");
        assert_eq!(post.score, 120);
        assert_eq!(post.comment_count, 0);
        assert_eq!(post.permalink, "https://news.ycombinator.com/item?id=38000001");
        assert!(post.created_at.is_some());
    }

    #[test]
    fn test_comment_hit_without_author_is_malformed() {
        let raw = json!({"objectID": "1", "comment_text": "orphan"});
        assert!(matches!(
            comment_from_hit(&raw),
            Err(HarvestError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_comment_from_item_cleans_html() {
        let raw = json!({
            "id": 42,
            "by": "dang",
            "parent": 41,
            "text": "Please don&#x27;t<p>Thanks",
            "kids": [43, 44],
            "time": 1700000000,
            "type": "comment"
        });

        let NormalizedRecord::Comment(comment) = comment_from_item(&raw).unwrap() else {
            panic!("expected a comment");
        };
        assert_eq!(comment.body, "Please don't\n\nThanks");
        assert_eq!(comment.reply_count, 2);
        assert_eq!(comment.parent_id.as_deref(), Some("41"));
    }

    #[test]
    fn test_user_from_item_limits_submissions() {
        let submitted: Vec<u64> = (1..=50).collect();
        let raw = json!({"id": "tptacek", "karma": 400000, "created": 1190000000, "submitted": submitted});

        let NormalizedRecord::User(user) = user_from_item(&raw).unwrap() else {
            panic!("expected a user");
        };
        assert_eq!(user.karma, 400000);
        assert_eq!(user.post_count, 50);
        assert_eq!(user.recent_submissions.len(), 20);
        assert_eq!(user.recent_submissions[0], "1");
    }

    #[test]
    fn test_story_list_and_id_parsing() {
        assert_eq!("best".parse::<StoryList>().unwrap(), StoryList::Best);
        assert!("worst".parse::<StoryList>().is_err());
        assert_eq!(parse_item_id(" 8863 ").unwrap(), 8863);
        assert!(matches!(parse_item_id("abc"), Err(HarvestError::Usage { .. })));
    }
}
