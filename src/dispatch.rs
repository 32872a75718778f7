//! Turns a parsed command line into one report on disk.
//!
//! Every invocation follows the same path: load config, build and validate the
//! `Query`, read credentials, run the platform operation, assemble a `Report`
//! and hand it to the writer. Nothing touches the network before the query and
//! credentials are known to be usable.

use crate::cli::{Cli, HnCommand, OutputArgs, PlatformCommand, RedditCommand, XCommand, YouTubeCommand};
use harvest_core::{
    credential_env_var, load_credential, CommandKind, ConfigError, HarvestConfig, HarvestError,
    KeywordClassifier, NormalizedRecord, Platform, Query, QueryBuilder, QueryScope, SignalTag,
    MAX_RESULT_COUNT,
};
use harvest_platforms::hackernews::{parse_item_id, SearchResults, StoryList};
use harvest_platforms::reddit::{PostSearch, PostSort, SearchSort, SubredditListing, TimeWindow};
use harvest_platforms::x::Drilldown;
use harvest_platforms::youtube::SearchOrder;
use harvest_platforms::{HackerNewsClient, RedditClient, Thread, XClient, YouTubeClient};
use report_writer::{Report, ReportWriter, Section};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

pub const EXIT_OK: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_USAGE: u8 = 2;
pub const EXIT_PARTIAL: u8 = 3;
pub const EXIT_INTERRUPTED: u8 = 130;

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub path: PathBuf,
    pub records: usize,
    /// Headings of sections that could not be fetched.
    pub failed_sections: Vec<String>,
}

impl RunOutcome {
    pub fn exit_code(&self) -> u8 {
        if self.failed_sections.is_empty() {
            EXIT_OK
        } else {
            EXIT_PARTIAL
        }
    }
}

pub fn error_exit_code(error: &HarvestError) -> u8 {
    match error {
        HarvestError::Usage { .. } => EXIT_USAGE,
        HarvestError::Interrupted => EXIT_INTERRUPTED,
        _ => EXIT_FAILURE,
    }
}

pub async fn run(cli: &Cli) -> Result<RunOutcome, HarvestError> {
    let config = HarvestConfig::load(cli.config.as_deref())?;

    let (query, report) = match &cli.platform {
        PlatformCommand::Hn { command } => hacker_news(command, &config).await?,
        PlatformCommand::Reddit { command } => reddit(command, &config).await?,
        PlatformCommand::X { command } => x(command, &config).await?,
        PlatformCommand::Youtube { command } => youtube(command, &config).await?,
    };

    let failed_sections: Vec<String> = report
        .failed_sections()
        .map(|section| section.heading.clone())
        .collect();
    for heading in &failed_sections {
        warn!("Section '{}' failed and is annotated in the report", heading);
    }

    let path = ReportWriter::new(query.output_dir()).write(&report)?;
    Ok(RunOutcome {
        path,
        records: report.record_count(),
        failed_sections,
    })
}

/// Starts a query, taking the output directory from `-o`, then the config file.
fn query(
    platform: Platform,
    command: CommandKind,
    output: &OutputArgs,
    config: &HarvestConfig,
) -> QueryBuilder {
    let builder = Query::builder(platform, command);
    match output.output_dir.clone().or_else(|| config.output_dir.clone()) {
        Some(dir) => builder.output_dir(dir),
        None => builder,
    }
}

/// Range check for count flags beyond the query's primary count.
fn check_count(flag: &str, value: u32) -> Result<u32, HarvestError> {
    if (1..=MAX_RESULT_COUNT).contains(&value) {
        Ok(value)
    } else {
        Err(HarvestError::usage(format!(
            "--{flag} must be between 1 and {MAX_RESULT_COUNT}, got {value}"
        )))
    }
}

fn credential(platform: Platform) -> Result<String, HarvestError> {
    load_credential(platform)?.ok_or_else(|| {
        HarvestError::from(ConfigError::MissingEnvironmentVariable {
            var_name: credential_env_var(platform).unwrap_or_default().to_string(),
        })
    })
}

fn subject(query: &Query) -> &str {
    query.subject().unwrap_or_default()
}

fn thread_sections(report: Report, thread: Thread) -> Report {
    let comments: Vec<NormalizedRecord> = thread
        .comments
        .into_iter()
        .map(NormalizedRecord::Comment)
        .collect();
    report
        .with_meta("Comments", comments.len())
        .with_section(Section::records("Post", vec![NormalizedRecord::Post(thread.root)]))
        .with_section(Section::records("Comments", comments).with_empty_note("No comments found."))
}

async fn hacker_news(
    command: &HnCommand,
    config: &HarvestConfig,
) -> Result<(Query, Report), HarvestError> {
    const PLATFORM: Platform = Platform::HackerNews;

    match command {
        HnCommand::Search {
            query: terms,
            max_stories,
            max_comments,
            output,
        } => {
            let query = query(PLATFORM, CommandKind::Search, output, config)
                .subject("query", terms.clone())
                .count(*max_stories)
                .build()?;
            let max_comments = check_count("max-comments", *max_comments)?;

            let client = HackerNewsClient::new(config)?;
            let SearchResults { stories, comments } =
                client.search(subject(&query), query.count(), max_comments).await;
            let (stories, comments) = match (stories, comments) {
                (Err(error), Err(_)) => return Err(error),
                views => views,
            };

            let report = Report::new(
                PLATFORM,
                CommandKind::Search,
                format!("Hacker News Search: {}", subject(&query)),
            )
            .with_meta("Query", subject(&query))
            .with_section(Section::from_result("Stories", &stories))
            .with_section(Section::from_result("Comments", &comments));
            Ok((query, report))
        }
        HnCommand::Top {
            list,
            count,
            output,
        } => {
            let query = query(PLATFORM, CommandKind::Top, output, config)
                .scope(QueryScope {
                    listing: Some(list.clone()),
                    ..QueryScope::default()
                })
                .count(*count)
                .build()?;
            let list: StoryList = list.parse()?;

            let client = HackerNewsClient::new(config)?;
            let stories = client.stories(list, query.count()).await?;

            let report = Report::new(
                PLATFORM,
                CommandKind::Top,
                format!("Hacker News {} Stories", capitalize(list.as_str())),
            )
            .with_meta("Requested", query.count())
            .with_section(Section::records("Stories", stories));
            Ok((query, report))
        }
        HnCommand::Thread {
            id,
            max_comments,
            output,
        } => {
            let query = query(PLATFORM, CommandKind::Thread, output, config)
                .subject("id", id.clone())
                .count(*max_comments)
                .build()?;
            let story_id = parse_item_id(subject(&query))?;

            let client = HackerNewsClient::new(config)?;
            let thread = client.thread(story_id, query.count()).await?;

            let report = Report::new(
                PLATFORM,
                CommandKind::Thread,
                format!("Hacker News Thread: {}", thread.root.title),
            );
            Ok((query, thread_sections(report, thread)))
        }
        HnCommand::User { username, output } => {
            let query = query(PLATFORM, CommandKind::User, output, config)
                .subject("username", username.clone())
                .build()?;

            let client = HackerNewsClient::new(config)?;
            let user = client.user(subject(&query)).await?;

            let report = Report::new(
                PLATFORM,
                CommandKind::User,
                format!("Hacker News User: {}", user.handle),
            )
            .with_section(Section::records("Profile", vec![NormalizedRecord::User(user)]));
            Ok((query, report))
        }
    }
}

async fn reddit(
    command: &RedditCommand,
    config: &HarvestConfig,
) -> Result<(Query, Report), HarvestError> {
    const PLATFORM: Platform = Platform::Reddit;

    match command {
        RedditCommand::Subreddits {
            query: terms,
            limit,
            output,
        } => {
            let query = query(PLATFORM, CommandKind::Subreddits, output, config)
                .subject("query", terms.clone())
                .count(*limit)
                .build()?;

            let client = RedditClient::new(config)?;
            let communities = client.search_subreddits(subject(&query), query.count()).await?;

            let report = Report::new(
                PLATFORM,
                CommandKind::Subreddits,
                format!("Reddit Subreddit Search: {}", subject(&query)),
            )
            .with_meta("Results", communities.len())
            .with_section(Section::records("Subreddits", communities));
            Ok((query, report))
        }
        RedditCommand::Info { subreddit, output } => {
            let query = query(PLATFORM, CommandKind::Info, output, config)
                .subject("subreddit", subreddit.clone())
                .build()?;

            let client = RedditClient::new(config)?;
            let community = client.subreddit_info(subject(&query)).await?;

            let report = Report::new(
                PLATFORM,
                CommandKind::Info,
                format!("Reddit Subreddit: r/{}", community.name),
            )
            .with_section(Section::records(
                "About",
                vec![NormalizedRecord::Community(community)],
            ));
            Ok((query, report))
        }
        RedditCommand::Popular {
            listing,
            limit,
            output,
        } => {
            let query = query(PLATFORM, CommandKind::Popular, output, config)
                .scope(QueryScope {
                    listing: Some(listing.clone()),
                    ..QueryScope::default()
                })
                .count(*limit)
                .build()?;
            let listing: SubredditListing = listing.parse()?;

            let client = RedditClient::new(config)?;
            let communities = client.popular_subreddits(listing, query.count()).await?;

            let report = Report::new(
                PLATFORM,
                CommandKind::Popular,
                format!("Reddit {} Subreddits", capitalize(listing.as_str())),
            )
            .with_meta("Results", communities.len())
            .with_section(Section::records("Subreddits", communities));
            Ok((query, report))
        }
        RedditCommand::Posts {
            subreddit,
            sort,
            time,
            limit,
            output,
        } => {
            let query = query(PLATFORM, CommandKind::Posts, output, config)
                .subject("subreddit", subreddit.clone())
                .scope(QueryScope {
                    sort: Some(sort.clone()),
                    time_window: Some(time.clone()),
                    ..QueryScope::default()
                })
                .count(*limit)
                .build()?;
            let sort: PostSort = sort.parse()?;
            let time: TimeWindow = time.parse()?;

            let client = RedditClient::new(config)?;
            let posts = client
                .subreddit_posts(subject(&query), sort, time, query.count())
                .await?;

            let mut report = Report::new(
                PLATFORM,
                CommandKind::Posts,
                format!("Reddit Posts: r/{}", subject(&query).trim_start_matches("r/")),
            )
            .with_meta("Sort", sort.as_str());
            if sort == PostSort::Top {
                report = report.with_meta("Time", time.as_str());
            }
            let report = report
                .with_meta("Results", posts.len())
                .with_section(Section::records("Posts", posts));
            Ok((query, report))
        }
        RedditCommand::Search {
            query: terms,
            subreddits,
            sort,
            time,
            limit,
            output,
        } => {
            let subreddits: Vec<String> = subreddits
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            let query = query(PLATFORM, CommandKind::Search, output, config)
                .subject("query", terms.clone())
                .scope(QueryScope {
                    subreddits,
                    sort: Some(sort.clone()),
                    time_window: Some(time.clone()),
                    ..QueryScope::default()
                })
                .count(*limit)
                .build()?;
            let sort: SearchSort = sort.parse()?;
            let time: TimeWindow = time.parse()?;
            let scope = query.scope();

            let client = RedditClient::new(config)?;
            let PostSearch { posts, failed } = client
                .search_posts(subject(&query), &scope.subreddits, sort, time, query.count())
                .await?;

            let searched = if scope.subreddits.is_empty() {
                "all".to_string()
            } else {
                scope
                    .subreddits
                    .iter()
                    .map(|s| format!("r/{s}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let mut report = Report::new(
                PLATFORM,
                CommandKind::Search,
                format!("Reddit Search: {}", subject(&query)),
            )
            .with_meta("Subreddits", searched)
            .with_meta("Sort", sort.as_str())
            .with_meta("Time", time.as_str())
            .with_meta("Results", posts.len());
            if posts.is_empty() {
                report.push_section(Section::records("Results", Vec::new()));
            }
            for (subreddit, group) in group_by_subreddit(posts) {
                report.push_section(Section::records(format!("r/{subreddit}"), group));
            }
            for (subreddit, error) in &failed {
                report.push_section(Section::failed(format!("r/{subreddit}"), error));
            }
            Ok((query, report))
        }
        RedditCommand::Comments {
            post_id,
            limit,
            output,
        } => {
            let query = query(PLATFORM, CommandKind::Comments, output, config)
                .subject("post-id", post_id.clone())
                .count(*limit)
                .build()?;

            let client = RedditClient::new(config)?;
            let thread = client.post_comments(subject(&query), query.count()).await?;

            let mut report = Report::new(PLATFORM, CommandKind::Comments, thread.root.title.clone());
            if let Some(community) = &thread.root.community {
                report = report.with_meta("Subreddit", format!("r/{community}"));
            }
            Ok((query, thread_sections(report, thread)))
        }
    }
}

/// Posts grouped by subreddit, largest group first; order within a group is kept.
fn group_by_subreddit(posts: Vec<NormalizedRecord>) -> Vec<(String, Vec<NormalizedRecord>)> {
    let mut groups: BTreeMap<String, Vec<NormalizedRecord>> = BTreeMap::new();
    for record in posts {
        let subreddit = match &record {
            NormalizedRecord::Post(post) => post.community.clone(),
            _ => None,
        }
        .unwrap_or_else(|| "unknown".to_string());
        groups.entry(subreddit).or_default().push(record);
    }

    let mut groups: Vec<_> = groups.into_iter().collect();
    groups.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
    groups
}

async fn x(command: &XCommand, config: &HarvestConfig) -> Result<(Query, Report), HarvestError> {
    const PLATFORM: Platform = Platform::X;

    match command {
        XCommand::Search {
            query: terms,
            max_results,
            output,
        } => {
            let query = query(PLATFORM, CommandKind::Search, output, config)
                .subject("query", terms.clone())
                .count(*max_results)
                .build()?;

            let client = XClient::new(config, credential(PLATFORM)?)?;
            let tweets = client.search(subject(&query), query.count()).await?;

            let report = Report::new(
                PLATFORM,
                CommandKind::Search,
                format!("X Search: {}", subject(&query)),
            )
            .with_meta("Query", subject(&query))
            .with_meta("Results", tweets.len())
            .with_section(Section::records("Tweets", tweets));
            Ok((query, report))
        }
        XCommand::Drill {
            id,
            max_users,
            output,
        } => {
            let query = query(PLATFORM, CommandKind::Drill, output, config)
                .subject("id", id.clone())
                .count(*max_users)
                .build()?;

            let client = XClient::new(config, credential(PLATFORM)?)?;
            let drill = client.drill(subject(&query), query.count()).await;
            Ok((query, drill_report(drill)?))
        }
        XCommand::User { username, output } => {
            let query = query(PLATFORM, CommandKind::User, output, config)
                .subject("username", username.clone())
                .build()?;

            let client = XClient::new(config, credential(PLATFORM)?)?;
            let user = client.user(subject(&query)).await?;

            let report = Report::new(PLATFORM, CommandKind::User, format!("X User: @{}", user.handle))
                .with_section(Section::records("Profile", vec![NormalizedRecord::User(user)]));
            Ok((query, report))
        }
    }
}

/// A report with one section per view; fails only when every view failed.
fn drill_report(drill: Drilldown) -> Result<Report, HarvestError> {
    let tweet_url = drill.tweet_url();
    let Drilldown {
        tweet_id,
        liking_users,
        retweeted_by,
        quote_tweets,
    } = drill;
    let views = match (liking_users, retweeted_by, quote_tweets) {
        (Err(error), Err(_), Err(_)) => return Err(error),
        views => views,
    };

    let mut report = Report::new(
        Platform::X,
        CommandKind::Drill,
        format!("Tweet Drill-Down: {tweet_id}"),
    )
    .with_meta("Tweet URL", tweet_url);

    for (heading, result, empty_note) in [
        ("Liking Users", &views.0, "No liking users found."),
        ("Retweeted By", &views.1, "No retweets found."),
        ("Quote Tweets", &views.2, "No quote tweets found."),
    ] {
        if let Ok(records) = result {
            report = report.with_summary_row(heading, records.len() as u64);
        }
        report.push_section(Section::from_result(heading, result).with_empty_note(empty_note));
    }
    Ok(report)
}

async fn youtube(
    command: &YouTubeCommand,
    config: &HarvestConfig,
) -> Result<(Query, Report), HarvestError> {
    const PLATFORM: Platform = Platform::YouTube;

    match command {
        YouTubeCommand::Search {
            query: terms,
            max_results,
            order,
            output,
        } => {
            let query = query(PLATFORM, CommandKind::Search, output, config)
                .subject("query", terms.clone())
                .scope(QueryScope {
                    sort: Some(order.clone()),
                    ..QueryScope::default()
                })
                .count(*max_results)
                .build()?;
            let order: SearchOrder = order.parse()?;

            let client = YouTubeClient::new(config, credential(PLATFORM)?)?;
            let videos = client.search(subject(&query), query.count(), order).await?;

            let report = Report::new(
                PLATFORM,
                CommandKind::Search,
                format!("YouTube Search: {}", subject(&query)),
            )
            .with_meta("Order", order.as_str())
            .with_meta("Results", videos.len())
            .with_section(Section::records("Videos", videos));
            Ok((query, report))
        }
        YouTubeCommand::Comments {
            video_id,
            max_results,
            output,
        } => {
            let query = query(PLATFORM, CommandKind::Comments, output, config)
                .subject("video-id", video_id.clone())
                .count(*max_results)
                .build()?;

            let client = YouTubeClient::new(config, credential(PLATFORM)?)?;
            let comments: Vec<NormalizedRecord> = client
                .comments(subject(&query), query.count())
                .await?
                .into_iter()
                .map(NormalizedRecord::Comment)
                .collect();

            let report = Report::new(
                PLATFORM,
                CommandKind::Comments,
                format!("YouTube Comments: {}", subject(&query)),
            )
            .with_meta("Comments", comments.len())
            .with_section(Section::records("Comments", comments).with_empty_note("No comments found."));
            Ok((query, report))
        }
        YouTubeCommand::Analyze {
            video_id,
            signals,
            max_results,
            output,
        } => {
            let signals = signals
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(str::parse)
                .collect::<Result<Vec<SignalTag>, _>>()?;
            let query = query(PLATFORM, CommandKind::Analyze, output, config)
                .subject("video-id", video_id.clone())
                .scope(QueryScope {
                    signals,
                    ..QueryScope::default()
                })
                .count(*max_results)
                .build()?;

            let client = YouTubeClient::new(config, credential(PLATFORM)?)?;
            let analysis = client
                .analyze(
                    subject(&query),
                    &query.scope().signals,
                    query.count(),
                    KeywordClassifier::builtin(),
                )
                .await?;
            info!(
                "Classified {} comments, {} signal matches",
                analysis.total_comments,
                analysis.signal_total()
            );

            let mut report = Report::new(
                PLATFORM,
                CommandKind::Analyze,
                format!("Signal Analysis: {}", analysis.video_id),
            )
            .with_meta("Video URL", analysis.video_url())
            .with_summary_row("Total Comments", analysis.total_comments as u64);
            for (tag, comments) in &analysis.groups {
                report = report.with_summary_row(tag.title(), comments.len() as u64);
            }
            for (tag, comments) in analysis.groups {
                let records = comments.into_iter().map(NormalizedRecord::Comment).collect();
                report.push_section(
                    Section::records(tag.title(), records)
                        .with_empty_note("No comments matched this signal."),
                );
            }
            Ok((query, report))
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
