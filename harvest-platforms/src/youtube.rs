//! YouTube Data API v3: video search, comment threads and signal analysis.

use crate::build_fetcher;
use harvest_client::{Credential, Fetcher, PageCursor, PageSource, PaginationWalker, RawPage};
use harvest_core::normalize::{
    count, normalize_page, opt_str, required_id, required_str, rfc3339_timestamp, signed,
    str_or_empty, RecordSet,
};
use harvest_core::{
    Comment, HarvestConfig, HarvestError, NormalizedRecord, Platform, SignalClassifier, SignalTag,
    Video,
};
use serde_json::Value;
use std::collections::BTreeSet;
use std::str::FromStr;
use tracing::{info, warn};

pub const YOUTUBE_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

const WATCH_URL: &str = "https://youtube.com/watch?v=";
const MAX_SEARCH_PAGE: u32 = 50;
const MAX_THREAD_PAGE: u32 = 100;

const PLATFORM: Platform = Platform::YouTube;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOrder {
    Relevance,
    Date,
    ViewCount,
}

impl SearchOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchOrder::Relevance => "relevance",
            SearchOrder::Date => "date",
            SearchOrder::ViewCount => "viewCount",
        }
    }
}

impl FromStr for SearchOrder {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relevance" => Ok(SearchOrder::Relevance),
            "date" => Ok(SearchOrder::Date),
            "viewCount" => Ok(SearchOrder::ViewCount),
            other => Err(HarvestError::usage(format!(
                "unknown order '{other}' (expected relevance, date or viewCount)"
            ))),
        }
    }
}

/// Comments grouped by the signals they carry.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalAnalysis {
    pub video_id: String,
    pub total_comments: usize,
    /// One entry per requested tag, in request order.
    pub groups: Vec<(SignalTag, Vec<Comment>)>,
}

impl SignalAnalysis {
    pub fn video_url(&self) -> String {
        format!("{WATCH_URL}{}", self.video_id)
    }

    pub fn signal_total(&self) -> usize {
        self.groups.iter().map(|(_, comments)| comments.len()).sum()
    }
}

#[derive(Debug)]
pub struct YouTubeClient {
    fetcher: Fetcher,
}

impl YouTubeClient {
    pub fn new(config: &HarvestConfig, api_key: String) -> Result<Self, HarvestError> {
        let credential = Credential::ApiKey {
            param: "key",
            value: api_key,
        };
        Ok(Self {
            fetcher: build_fetcher(PLATFORM, YOUTUBE_BASE_URL, config, credential)?,
        })
    }

    pub async fn search(
        &self,
        query: &str,
        max_results: u32,
        order: SearchOrder,
    ) -> Result<Vec<NormalizedRecord>, HarvestError> {
        let source = TokenSource {
            fetcher: &self.fetcher,
            endpoint: "search",
            params: vec![
                ("part", "snippet".to_string()),
                ("q", query.to_string()),
                ("type", "video".to_string()),
                ("order", order.as_str().to_string()),
            ],
        };
        let items = PaginationWalker::new(source, max_results, MAX_SEARCH_PAGE)
            .collect_items()
            .await?;

        let mut videos = RecordSet::new();
        videos.extend(normalize_page(&items, video_from_search));
        info!("YouTube search returned {} videos", videos.len());
        Ok(videos.into_vec())
    }

    /// Up to `max_threads` comment threads, each followed by its replies.
    pub async fn comments(&self, video_id: &str, max_threads: u32) -> Result<Vec<Comment>, HarvestError> {
        let source = TokenSource {
            fetcher: &self.fetcher,
            endpoint: "commentThreads",
            params: vec![
                ("part", "snippet,replies".to_string()),
                ("videoId", video_id.to_string()),
                ("order", "relevance".to_string()),
                ("textFormat", "plainText".to_string()),
            ],
        };
        let threads = PaginationWalker::new(source, max_threads, MAX_THREAD_PAGE)
            .collect_items()
            .await?;

        let mut comments = Vec::new();
        for thread in &threads {
            match comments_from_thread(thread, video_id) {
                Ok(mut flattened) => comments.append(&mut flattened),
                Err(error) => warn!("Skipping comment thread: {}", error),
            }
        }
        info!(
            "Video {} yielded {} comments from {} threads",
            video_id,
            comments.len(),
            threads.len()
        );
        Ok(comments)
    }

    /// Classifies every comment and groups them by the requested tags.
    /// An empty `requested` list means the four signal categories.
    pub async fn analyze<C>(
        &self,
        video_id: &str,
        requested: &[SignalTag],
        max_threads: u32,
        classifier: &C,
    ) -> Result<SignalAnalysis, HarvestError>
    where
        C: SignalClassifier + ?Sized,
    {
        let comments = self.comments(video_id, max_threads).await?;
        Ok(group_by_signal(video_id, comments, requested, classifier))
    }
}

/// Pure grouping step of [`YouTubeClient::analyze`].
pub fn group_by_signal<C>(
    video_id: &str,
    comments: Vec<Comment>,
    requested: &[SignalTag],
    classifier: &C,
) -> SignalAnalysis
where
    C: SignalClassifier + ?Sized,
{
    let tags: Vec<SignalTag> = if requested.is_empty() {
        SignalTag::categories().to_vec()
    } else {
        let mut seen = BTreeSet::new();
        requested.iter().copied().filter(|tag| seen.insert(*tag)).collect()
    };

    let mut groups: Vec<(SignalTag, Vec<Comment>)> =
        tags.iter().map(|tag| (*tag, Vec::new())).collect();
    let total_comments = comments.len();

    for comment in comments {
        let signals = classifier.classify(&comment.body);
        let comment = comment.with_signals(signals);
        for (tag, members) in groups.iter_mut() {
            if comment.signals.contains(tag) {
                members.push(comment.clone());
            }
        }
    }

    SignalAnalysis {
        video_id: video_id.to_string(),
        total_comments,
        groups,
    }
}

struct TokenSource<'a> {
    fetcher: &'a Fetcher,
    endpoint: &'static str,
    params: Vec<(&'static str, String)>,
}

impl PageSource for TokenSource<'_> {
    async fn fetch_page(
        &self,
        cursor: Option<&PageCursor>,
        page_size: u32,
    ) -> Result<RawPage, HarvestError> {
        let mut params = self.params.clone();
        params.push(("maxResults", page_size.to_string()));
        if let Some(PageCursor::Token(token)) = cursor {
            params.push(("pageToken", token.clone()));
        }

        let body = self.fetcher.fetch(self.endpoint, &params).await?;
        Ok(RawPage {
            items: body
                .get("items")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            next: opt_str(&body, "nextPageToken").map(PageCursor::Token),
            includes: None,
        })
    }
}

/// `search` result item of kind `youtube#searchResult`.
pub fn video_from_search(raw: &Value) -> Result<NormalizedRecord, HarvestError> {
    let id_block = raw.get("id").cloned().unwrap_or(Value::Null);
    let id = required_id(&id_block, "videoId", PLATFORM, "video")?;
    let snippet = raw.get("snippet").cloned().unwrap_or(Value::Null);

    Ok(NormalizedRecord::Video(Video {
        url: format!("{WATCH_URL}{id}"),
        id,
        channel: required_str(&snippet, "channelTitle", PLATFORM, "video")?,
        title: str_or_empty(&snippet, "title"),
        description: str_or_empty(&snippet, "description"),
        created_at: rfc3339_timestamp(&snippet, "publishedAt"),
    }))
}

/// The top-level comment of a thread followed by its inline replies.
pub fn comments_from_thread(thread: &Value, video_id: &str) -> Result<Vec<Comment>, HarvestError> {
    let thread_id = required_id(thread, "id", PLATFORM, "comment thread")?;
    let top = thread
        .pointer("/snippet/topLevelComment")
        .ok_or_else(|| HarvestError::malformed(PLATFORM, "comment thread", "missing topLevelComment"))?;
    let reply_total = thread
        .get("snippet")
        .map_or(0, |snippet| count(snippet, "totalReplyCount"));

    let mut comments = vec![comment(top, video_id, 0, None, reply_total)?];

    let replies = thread
        .pointer("/replies/comments")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for reply in replies {
        match comment(reply, video_id, 1, Some(&thread_id), 0) {
            Ok(reply) => comments.push(reply),
            Err(error) => warn!("Skipping reply: {}", error),
        }
    }
    Ok(comments)
}

fn comment(
    raw: &Value,
    video_id: &str,
    depth: u32,
    parent_id: Option<&str>,
    reply_count: u64,
) -> Result<Comment, HarvestError> {
    let id = required_id(raw, "id", PLATFORM, "comment")?;
    let snippet = raw.get("snippet").cloned().unwrap_or(Value::Null);

    Ok(Comment {
        platform: PLATFORM,
        permalink: format!("{WATCH_URL}{video_id}&lc={id}"),
        id,
        author: required_str(&snippet, "authorDisplayName", PLATFORM, "comment")?,
        body: str_or_empty(&snippet, "textDisplay"),
        score: signed(&snippet, "likeCount"),
        reply_count,
        depth,
        parent_id: parent_id.map(str::to_string),
        parent_title: None,
        created_at: rfc3339_timestamp(&snippet, "publishedAt"),
        signals: BTreeSet::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_core::KeywordClassifier;
    use serde_json::json;

    fn thread() -> Value {
        json!({
            "id": "thread1",
            "snippet": {
                "totalReplyCount": 2,
                "topLevelComment": {
                    "id": "c1",
                    "snippet": {
                        "authorDisplayName": "Alice",
                        "textDisplay": "This is broken on Windows",
                        "likeCount": 12,
                        "publishedAt": "2024-03-01T10:00:00Z"
                    }
                }
            },
            "replies": {
                "comments": [
                    {"id": "c1.r1", "snippet": {"authorDisplayName": "Bob", "textDisplay": "Would love a fix", "likeCount": 1}},
                    {"id": "c1.r2", "snippet": {"textDisplay": "no author"}}
                ]
            }
        })
    }

    fn plain_comment(id: &str, body: &str) -> Comment {
        Comment {
            platform: PLATFORM,
            id: id.to_string(),
            author: "a".to_string(),
            body: body.to_string(),
            score: 0,
            reply_count: 0,
            depth: 0,
            parent_id: None,
            parent_title: None,
            permalink: String::new(),
            created_at: None,
            signals: BTreeSet::new(),
        }
    }

    #[test]
    fn test_thread_flattens_replies_after_parent() {
        let comments = comments_from_thread(&thread(), "vid").unwrap();

        let ids: Vec<&str> = comments.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c1.r1"]);
        assert_eq!(comments[0].reply_count, 2);
        assert_eq!(comments[0].score, 12);
        assert_eq!(comments[1].parent_id.as_deref(), Some("thread1"));
        assert!(comments[1].is_reply());
        assert_eq!(comments[1].permalink, "https://youtube.com/watch?v=vid&lc=c1.r1");
    }

    #[test]
    fn test_video_from_search() {
        let raw = json!({
            "id": {"kind": "youtube#video", "videoId": "dQw4w9WgXcQ"},
            "snippet": {"title": "Rust in 100 seconds", "channelTitle": "Fireship", "publishedAt": "2021-09-01T00:00:00Z"}
        });
        let NormalizedRecord::Video(video) = video_from_search(&raw).unwrap() else {
            panic!("expected video");
        };
        assert_eq!(video.url, "https://youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(video.channel, "Fireship");

        let channel_hit = json!({"id": {"kind": "youtube#channel", "channelId": "UC1"}, "snippet": {}});
        assert!(video_from_search(&channel_hit).is_err());
    }

    #[test]
    fn test_group_by_signal_defaults_to_all_categories() {
        let comments = vec![
            plain_comment("1", "It keeps crashing, so I switched to Vim"),
            plain_comment("2", "Nice video"),
        ];
        let analysis = group_by_signal("v", comments, &[], &KeywordClassifier::default());

        assert_eq!(analysis.total_comments, 2);
        assert_eq!(analysis.groups.len(), 4);
        let count_of = |tag| {
            analysis
                .groups
                .iter()
                .find(|(t, _)| *t == tag)
                .map(|(_, c)| c.len())
                .unwrap()
        };
        assert_eq!(count_of(SignalTag::PainPoint), 1);
        assert_eq!(count_of(SignalTag::CompetitorMention), 1);
        assert_eq!(count_of(SignalTag::FeatureRequest), 0);
        assert_eq!(analysis.signal_total(), 2);
    }

    #[test]
    fn test_group_by_signal_none_filter_selects_unclassified() {
        let comments = vec![
            plain_comment("1", "How much does it cost?"),
            plain_comment("2", "First!"),
        ];
        let analysis = group_by_signal(
            "v",
            comments,
            &[SignalTag::Unclassified, SignalTag::Unclassified],
            &KeywordClassifier::default(),
        );

        assert_eq!(analysis.groups.len(), 1);
        let (tag, members) = &analysis.groups[0];
        assert_eq!(*tag, SignalTag::Unclassified);
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, "2");
        assert!(members[0].signals.contains(&SignalTag::Unclassified));
    }
}
