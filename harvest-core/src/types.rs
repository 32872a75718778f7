use crate::error::HarvestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Upper bound for any per-invocation result count.
pub const MAX_RESULT_COUNT: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "hn")]
    HackerNews,
    #[serde(rename = "reddit")]
    Reddit,
    #[serde(rename = "x")]
    X,
    #[serde(rename = "youtube")]
    YouTube,
}

impl Platform {
    /// Short name used in report filenames and config sections.
    pub fn slug(&self) -> &'static str {
        match self {
            Platform::HackerNews => "hn",
            Platform::Reddit => "reddit",
            Platform::X => "x",
            Platform::YouTube => "youtube",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::HackerNews => "Hacker News",
            Platform::Reddit => "Reddit",
            Platform::X => "X",
            Platform::YouTube => "YouTube",
        }
    }

    pub fn all() -> &'static [Platform] {
        &[
            Platform::HackerNews,
            Platform::Reddit,
            Platform::X,
            Platform::YouTube,
        ]
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// The verb a single invocation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Search,
    Top,
    Thread,
    User,
    Drill,
    Subreddits,
    Info,
    Popular,
    Posts,
    Comments,
    Analyze,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Search => "search",
            CommandKind::Top => "top",
            CommandKind::Thread => "thread",
            CommandKind::User => "user",
            CommandKind::Drill => "drill",
            CommandKind::Subreddits => "subreddits",
            CommandKind::Info => "info",
            CommandKind::Popular => "popular",
            CommandKind::Posts => "posts",
            CommandKind::Comments => "comments",
            CommandKind::Analyze => "analyze",
        }
    }

    /// Whether the verb needs a query or identifier to run at all.
    pub fn requires_subject(&self) -> bool {
        !matches!(self, CommandKind::Top | CommandKind::Popular)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse market-research category attached to comment text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalTag {
    PainPoint,
    FeatureRequest,
    CompetitorMention,
    PurchaseIntent,
    /// No category matched.
    #[serde(rename = "none")]
    Unclassified,
}

impl SignalTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalTag::PainPoint => "pain_point",
            SignalTag::FeatureRequest => "feature_request",
            SignalTag::CompetitorMention => "competitor_mention",
            SignalTag::PurchaseIntent => "purchase_intent",
            SignalTag::Unclassified => "none",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            SignalTag::PainPoint => "Pain Point",
            SignalTag::FeatureRequest => "Feature Request",
            SignalTag::CompetitorMention => "Competitor Mention",
            SignalTag::PurchaseIntent => "Purchase Intent",
            SignalTag::Unclassified => "No Signal",
        }
    }

    /// The four real categories, in report order.
    pub fn categories() -> &'static [SignalTag] {
        &[
            SignalTag::PainPoint,
            SignalTag::FeatureRequest,
            SignalTag::CompetitorMention,
            SignalTag::PurchaseIntent,
        ]
    }
}

impl fmt::Display for SignalTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalTag {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pain_point" | "pain" => Ok(SignalTag::PainPoint),
            "feature_request" | "feature" => Ok(SignalTag::FeatureRequest),
            "competitor_mention" | "competitor" => Ok(SignalTag::CompetitorMention),
            "purchase_intent" | "purchase" => Ok(SignalTag::PurchaseIntent),
            "none" => Ok(SignalTag::Unclassified),
            other => Err(HarvestError::usage(format!(
                "unknown signal type '{other}' (expected pain_point, feature_request, competitor_mention, purchase_intent or none)"
            ))),
        }
    }
}

/// Optional filters narrowing a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryScope {
    pub subreddits: Vec<String>,
    pub sort: Option<String>,
    pub time_window: Option<String>,
    pub listing: Option<String>,
    pub signals: Vec<SignalTag>,
}

/// One invocation's request: built once, read everywhere, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    platform: Platform,
    command: CommandKind,
    subject: Option<String>,
    scope: QueryScope,
    count: u32,
    output_dir: PathBuf,
}

impl Query {
    pub fn builder(platform: Platform, command: CommandKind) -> QueryBuilder {
        QueryBuilder {
            platform,
            command,
            subject: None,
            subject_flag: "query",
            scope: QueryScope::default(),
            count: None,
            output_dir: None,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn command(&self) -> CommandKind {
        self.command
    }

    /// Search terms or the identifier the verb operates on.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn scope(&self) -> &QueryScope {
        &self.scope
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[derive(Debug)]
pub struct QueryBuilder {
    platform: Platform,
    command: CommandKind,
    subject: Option<String>,
    subject_flag: &'static str,
    scope: QueryScope,
    count: Option<u32>,
    output_dir: Option<PathBuf>,
}

impl QueryBuilder {
    /// Sets the subject and the flag name used when it is missing.
    pub fn subject(mut self, flag: &'static str, value: Option<String>) -> Self {
        self.subject_flag = flag;
        self.subject = value;
        self
    }

    pub fn scope(mut self, scope: QueryScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> Result<Query, HarvestError> {
        let subject = self
            .subject
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        if self.command.requires_subject() && subject.is_none() {
            return Err(HarvestError::usage(format!(
                "{} {} requires a non-empty --{}",
                self.platform.slug(),
                self.command,
                self.subject_flag
            )));
        }

        let count = self.count.unwrap_or(1);
        if count == 0 || count > MAX_RESULT_COUNT {
            return Err(HarvestError::usage(format!(
                "result count must be between 1 and {MAX_RESULT_COUNT}, got {count}"
            )));
        }

        let output_dir = self
            .output_dir
            .unwrap_or_else(|| PathBuf::from(format!("./{}_research", self.platform.slug())));

        Ok(Query {
            platform: self.platform,
            command: self.command,
            subject,
            scope: self.scope,
            count,
            output_dir,
        })
    }
}

/// Platform-scoped identity of a record; unique within one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub platform: Platform,
    pub kind: &'static str,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub platform: Platform,
    pub id: String,
    pub author: String,
    pub title: String,
    pub body: String,
    pub score: i64,
    pub comment_count: u64,
    pub upvote_ratio: Option<f64>,
    pub community: Option<String>,
    pub flair: Option<String>,
    pub link_url: Option<String>,
    pub permalink: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub platform: Platform,
    pub id: String,
    pub author: String,
    pub body: String,
    pub score: i64,
    pub reply_count: u64,
    pub depth: u32,
    pub parent_id: Option<String>,
    pub parent_title: Option<String>,
    pub permalink: String,
    pub created_at: Option<DateTime<Utc>>,
    pub signals: BTreeSet<SignalTag>,
}

impl Comment {
    /// Returns the comment carrying the given signal tags.
    pub fn with_signals(mut self, signals: BTreeSet<SignalTag>) -> Self {
        self.signals = signals;
        self
    }

    pub fn is_reply(&self) -> bool {
        self.depth > 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub platform: Platform,
    pub id: String,
    pub handle: String,
    pub display_name: Option<String>,
    pub bio: String,
    pub location: Option<String>,
    pub website: Option<String>,
    pub followers: u64,
    pub following: u64,
    pub post_count: u64,
    pub karma: i64,
    pub verified: bool,
    pub recent_submissions: Vec<String>,
    pub profile_url: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tweet {
    pub id: String,
    pub author: String,
    pub author_name: String,
    pub author_followers: u64,
    pub author_verified: bool,
    pub text: String,
    pub likes: u64,
    pub retweets: u64,
    pub replies: u64,
    pub quotes: u64,
    pub conversation_id: Option<String>,
    pub url: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Video {
    pub id: String,
    pub channel: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// A subreddit or similar grouping.
#[derive(Debug, Clone, PartialEq)]
pub struct Community {
    pub platform: Platform,
    pub name: String,
    pub subscribers: u64,
    pub active_users: u64,
    pub description: String,
    pub full_description: String,
    pub nsfw: bool,
    pub related: Vec<String>,
    pub url: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Platform-agnostic harvested item.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedRecord {
    Post(Post),
    Comment(Comment),
    User(UserProfile),
    Tweet(Tweet),
    Video(Video),
    Community(Community),
}

impl NormalizedRecord {
    pub fn platform(&self) -> Platform {
        match self {
            NormalizedRecord::Post(p) => p.platform,
            NormalizedRecord::Comment(c) => c.platform,
            NormalizedRecord::User(u) => u.platform,
            NormalizedRecord::Tweet(_) => Platform::X,
            NormalizedRecord::Video(_) => Platform::YouTube,
            NormalizedRecord::Community(c) => c.platform,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NormalizedRecord::Post(_) => "post",
            NormalizedRecord::Comment(_) => "comment",
            NormalizedRecord::User(_) => "user",
            NormalizedRecord::Tweet(_) => "tweet",
            NormalizedRecord::Video(_) => "video",
            NormalizedRecord::Community(_) => "community",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            NormalizedRecord::Post(p) => &p.id,
            NormalizedRecord::Comment(c) => &c.id,
            NormalizedRecord::User(u) => &u.id,
            NormalizedRecord::Tweet(t) => &t.id,
            NormalizedRecord::Video(v) => &v.id,
            NormalizedRecord::Community(c) => &c.name,
        }
    }

    pub fn author(&self) -> &str {
        match self {
            NormalizedRecord::Post(p) => &p.author,
            NormalizedRecord::Comment(c) => &c.author,
            NormalizedRecord::User(u) => &u.handle,
            NormalizedRecord::Tweet(t) => &t.author,
            NormalizedRecord::Video(v) => &v.channel,
            NormalizedRecord::Community(c) => &c.name,
        }
    }

    pub fn body(&self) -> &str {
        match self {
            NormalizedRecord::Post(p) => &p.body,
            NormalizedRecord::Comment(c) => &c.body,
            NormalizedRecord::User(u) => &u.bio,
            NormalizedRecord::Tweet(t) => &t.text,
            NormalizedRecord::Video(v) => &v.description,
            NormalizedRecord::Community(c) => &c.description,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            NormalizedRecord::Post(p) => &p.permalink,
            NormalizedRecord::Comment(c) => &c.permalink,
            NormalizedRecord::User(u) => &u.profile_url,
            NormalizedRecord::Tweet(t) => &t.url,
            NormalizedRecord::Video(v) => &v.url,
            NormalizedRecord::Community(c) => &c.url,
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        match self {
            NormalizedRecord::Post(p) => p.created_at,
            NormalizedRecord::Comment(c) => c.created_at,
            NormalizedRecord::User(u) => u.created_at,
            NormalizedRecord::Tweet(t) => t.created_at,
            NormalizedRecord::Video(v) => v.created_at,
            NormalizedRecord::Community(c) => c.created_at,
        }
    }

    /// Follower-style reach used for drill-down ordering.
    pub fn reach(&self) -> u64 {
        match self {
            NormalizedRecord::User(u) => u.followers,
            NormalizedRecord::Tweet(t) => t.author_followers,
            NormalizedRecord::Community(c) => c.subscribers,
            NormalizedRecord::Post(p) => p.score.max(0) as u64,
            NormalizedRecord::Comment(c) => c.score.max(0) as u64,
            NormalizedRecord::Video(_) => 0,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            platform: self.platform(),
            kind: self.kind(),
            id: self.id().to_string(),
        }
    }
}
