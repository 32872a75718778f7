//! Markdown layout for reports. Every record becomes a `###` block so runs
//! can be searched with grep across the output directory.

use crate::report::{Report, Section, SectionBody};
use chrono::{DateTime, SecondsFormat, Utc};
use harvest_core::normalize::truncate;
use harvest_core::{
    Comment, Community, NormalizedRecord, Platform, Post, SignalTag, Tweet, UserProfile, Video,
};
use std::fmt::Write as _;

const MAX_POST_BODY_CHARS: usize = 500;
const MAX_COMMENT_CHARS: usize = 1_000;
const MAX_VIDEO_DESCRIPTION_CHARS: usize = 200;
const MAX_BIO_CHARS: usize = 200;

/// `1234` as `1.2K`, `2500000` as `2.5M`.
pub fn format_number(n: i64) -> String {
    let magnitude = n.unsigned_abs();
    let sign = if n < 0 { "-" } else { "" };
    if magnitude >= 1_000_000 {
        format!("{sign}{:.1}M", magnitude as f64 / 1_000_000.0)
    } else if magnitude >= 1_000 {
        format!("{sign}{:.1}K", magnitude as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

fn count(n: u64) -> String {
    format_number(i64::try_from(n).unwrap_or(i64::MAX))
}

pub fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map_or_else(|| "Unknown".to_string(), |ts| ts.format("%Y-%m-%d %H:%M UTC").to_string())
}

/// Prefixes every line with `> ` so multi-line bodies stay quoted.
fn quote(text: &str) -> String {
    text.lines()
        .map(|line| if line.is_empty() { ">".to_string() } else { format!("> {line}") })
        .collect::<Vec<_>>()
        .join("\n")
}

fn verified_mark(verified: bool) -> &'static str {
    if verified {
        " ✓"
    } else {
        ""
    }
}

pub fn render(report: &Report) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# {}\n", report.title);
    let _ = writeln!(
        out,
        "**Date:** {}",
        report.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    for (key, value) in &report.metadata {
        let _ = writeln!(out, "**{key}:** {value}");
    }
    out.push('\n');

    if !report.summary.is_empty() {
        out.push_str("## Summary\n\n| Metric | Count |\n|--------|-------|\n");
        for (label, value) in &report.summary {
            let _ = writeln!(out, "| {label} | {value} |");
        }
        out.push('\n');
    }

    out.push_str("---\n\n");
    for section in &report.sections {
        render_section(&mut out, section);
    }
    out
}

fn render_section(out: &mut String, section: &Section) {
    match &section.body {
        SectionBody::Records {
            records,
            empty_note,
        } => {
            let _ = writeln!(out, "## {} ({})\n", section.heading, records.len());
            if records.is_empty() {
                let _ = writeln!(out, "_{empty_note}_\n");
            }
            for (index, record) in records.iter().enumerate() {
                render_record(out, index + 1, record);
            }
        }
        SectionBody::Failed { reason } => {
            let _ = writeln!(out, "## {}\n\n_Section failed: {}_\n", section.heading, reason);
        }
    }
    out.push_str("---\n\n");
}

fn render_record(out: &mut String, index: usize, record: &NormalizedRecord) {
    match record {
        NormalizedRecord::Post(post) => render_post(out, index, post),
        NormalizedRecord::Comment(comment) => render_comment(out, index, comment),
        NormalizedRecord::User(user) => render_user(out, user),
        NormalizedRecord::Tweet(tweet) => render_tweet(out, index, tweet),
        NormalizedRecord::Video(video) => render_video(out, index, video),
        NormalizedRecord::Community(community) => render_community(out, index, community),
    }
}

fn render_post(out: &mut String, index: usize, post: &Post) {
    let title = if post.title.is_empty() { "(untitled)" } else { post.title.as_str() };
    let _ = writeln!(out, "### {index}. {title}\n");
    let _ = writeln!(out, "- **ID:** `{}`", post.id);
    let author_prefix = if post.platform == Platform::Reddit { "u/" } else { "" };
    let _ = writeln!(out, "- **Author:** {author_prefix}{}", post.author);
    if let Some(community) = &post.community {
        let _ = writeln!(out, "- **Subreddit:** r/{community}");
    }
    if let Some(flair) = &post.flair {
        let _ = writeln!(out, "- **Flair:** {flair}");
    }
    let _ = writeln!(
        out,
        "- **Score:** {} | **Comments:** {}",
        format_number(post.score),
        count(post.comment_count)
    );
    if let Some(ratio) = post.upvote_ratio {
        let _ = writeln!(out, "- **Upvote Ratio:** {:.0}%", ratio * 100.0);
    }
    if let Some(url) = post.link_url.as_deref().filter(|url| *url != post.permalink) {
        let _ = writeln!(out, "- **URL:** {url}");
    }
    let _ = writeln!(out, "- **Link:** {}", post.permalink);
    let _ = writeln!(out, "- **Posted:** {}\n", format_timestamp(post.created_at));
    if !post.body.is_empty() {
        let _ = writeln!(out, "{}\n", quote(&truncate(&post.body, MAX_POST_BODY_CHARS)));
    }
}

fn render_comment(out: &mut String, index: usize, comment: &Comment) {
    let reply = if comment.is_reply() {
        format!(" [reply, depth {}]", comment.depth)
    } else {
        String::new()
    };
    let _ = writeln!(
        out,
        "### {index}. {} ({} points){reply}\n",
        comment.author,
        format_number(comment.score)
    );
    let _ = writeln!(out, "- **ID:** `{}`", comment.id);
    match (&comment.parent_title, &comment.parent_id) {
        (Some(title), _) => {
            let _ = writeln!(out, "- **On:** {}", truncate(title, 60));
        }
        (None, Some(parent)) => {
            let _ = writeln!(out, "- **Parent:** `{parent}`");
        }
        (None, None) => {}
    }
    if comment.reply_count > 0 {
        let _ = writeln!(out, "- **Replies:** {}", count(comment.reply_count));
    }
    let signals: Vec<&str> = comment
        .signals
        .iter()
        .filter(|tag| **tag != SignalTag::Unclassified)
        .map(SignalTag::as_str)
        .collect();
    if !signals.is_empty() {
        let _ = writeln!(out, "- **Signals:** {}", signals.join(", "));
    }
    let _ = writeln!(out, "- **Posted:** {}", format_timestamp(comment.created_at));
    let _ = writeln!(out, "- **Link:** {}\n", comment.permalink);
    if !comment.body.is_empty() {
        let _ = writeln!(out, "{}\n", quote(&truncate(&comment.body, MAX_COMMENT_CHARS)));
    }
}

fn render_user(out: &mut String, user: &UserProfile) {
    let _ = writeln!(
        out,
        "### @{}{} ({} followers)\n",
        user.handle,
        verified_mark(user.verified),
        count(user.followers)
    );
    if let Some(name) = &user.display_name {
        let _ = writeln!(out, "**{name}**\n");
    }
    let _ = writeln!(out, "- **ID:** `{}`", user.id);
    if user.platform == Platform::HackerNews {
        let _ = writeln!(out, "- **Karma:** {}", format_number(user.karma));
    } else {
        let _ = writeln!(out, "- **Following:** {}", count(user.following));
    }
    if user.post_count > 0 {
        let _ = writeln!(out, "- **Posts:** {}", count(user.post_count));
    }
    if let Some(location) = &user.location {
        let _ = writeln!(out, "- **Location:** {location}");
    }
    if let Some(website) = &user.website {
        let _ = writeln!(out, "- **Website:** {website}");
    }
    let _ = writeln!(out, "- **Joined:** {}", format_timestamp(user.created_at));
    let _ = writeln!(out, "- **Profile:** {}\n", user.profile_url);
    if !user.bio.is_empty() {
        let _ = writeln!(out, "{}\n", quote(&truncate(&user.bio, MAX_BIO_CHARS)));
    }
    if !user.recent_submissions.is_empty() {
        let _ = writeln!(
            out,
            "**Recent submissions:**\n\n```\n{}\n```\n",
            user.recent_submissions.join(", ")
        );
    }
}

fn render_tweet(out: &mut String, index: usize, tweet: &Tweet) {
    let _ = writeln!(
        out,
        "### {index}. @{}{} ({} followers)\n",
        tweet.author,
        verified_mark(tweet.author_verified),
        count(tweet.author_followers)
    );
    let _ = writeln!(
        out,
        "**{}** · {}\n",
        tweet.author_name,
        format_timestamp(tweet.created_at)
    );
    if !tweet.text.is_empty() {
        let _ = writeln!(out, "{}\n", quote(&tweet.text));
    }
    let _ = writeln!(
        out,
        "- **Likes:** {} | **Retweets:** {} | **Replies:** {} | **Quotes:** {}",
        count(tweet.likes),
        count(tweet.retweets),
        count(tweet.replies),
        count(tweet.quotes)
    );
    let _ = writeln!(out, "- **Tweet ID:** `{}`", tweet.id);
    let _ = writeln!(out, "- **URL:** {}\n", tweet.url);
}

fn render_video(out: &mut String, index: usize, video: &Video) {
    let _ = writeln!(out, "### {index}. {}\n", video.title);
    let _ = writeln!(out, "- **Video ID:** `{}`", video.id);
    let _ = writeln!(out, "- **Channel:** {}", video.channel);
    let _ = writeln!(out, "- **Published:** {}", format_timestamp(video.created_at));
    let _ = writeln!(out, "- **URL:** {}\n", video.url);
    if !video.description.is_empty() {
        let _ = writeln!(
            out,
            "{}\n",
            quote(&truncate(&video.description, MAX_VIDEO_DESCRIPTION_CHARS))
        );
    }
}

fn render_community(out: &mut String, index: usize, community: &Community) {
    let nsfw = if community.nsfw { " (NSFW)" } else { "" };
    let _ = writeln!(out, "### {index}. r/{}{nsfw}\n", community.name);
    let _ = writeln!(out, "- **Subscribers:** {}", count(community.subscribers));
    if community.active_users > 0 {
        let _ = writeln!(out, "- **Active Users:** {}", count(community.active_users));
    }
    let _ = writeln!(out, "- **Created:** {}", format_timestamp(community.created_at));
    let _ = writeln!(out, "- **URL:** {}\n", community.url);
    if !community.description.is_empty() {
        let _ = writeln!(out, "{}\n", quote(&community.description));
    }
    if !community.related.is_empty() {
        let related: Vec<String> = community.related.iter().take(20).map(|r| format!("r/{r}")).collect();
        let _ = writeln!(out, "**Related:** {}\n", related.join(", "));
    }
    if community.full_description.len() > community.description.len() {
        let _ = writeln!(out, "**Full description:**\n\n{}\n", community.full_description);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Section;
    use chrono::TimeZone;
    use harvest_core::{CommandKind, HarvestError};
    use std::collections::BTreeSet;

    fn tweet(id: &str, author: &str, followers: u64) -> NormalizedRecord {
        NormalizedRecord::Tweet(Tweet {
            id: id.to_string(),
            author: author.to_string(),
            author_name: author.to_uppercase(),
            author_followers: followers,
            author_verified: false,
            text: "line one\nline two".to_string(),
            likes: 1500,
            retweets: 3,
            replies: 0,
            quotes: 0,
            conversation_id: None,
            url: format!("https://x.com/{author}/status/{id}"),
            created_at: None,
        })
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_234), "1.2K");
        assert_eq!(format_number(2_500_000), "2.5M");
        assert_eq!(format_number(-1_500), "-1.5K");
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(None), "Unknown");
        let ts = Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap();
        assert_eq!(format_timestamp(Some(ts)), "2024-02-03 04:05 UTC");
    }

    #[test]
    fn test_render_header_summary_and_failed_section() {
        let mut report = Report::new(Platform::X, CommandKind::Drill, "Tweet Drill-Down: 99")
            .with_meta("Tweet URL", "https://x.com/i/status/99")
            .with_summary_row("Liking Users", 1)
            .with_section(Section::records("Liking Users", vec![tweet("1", "alice", 2_000)]));
        report.push_section(Section::failed(
            "Retweeted By",
            &HarvestError::ClientRequest {
                platform: Platform::X,
                endpoint: "tweets/99/retweeted_by".to_string(),
                status: 403,
                body: "forbidden".to_string(),
            },
        ));

        let text = render(&report);

        assert!(text.starts_with("# Tweet Drill-Down: 99\n\n**Date:** "));
        assert!(text.contains("**Tweet URL:** https://x.com/i/status/99"));
        assert!(text.contains("| Metric | Count |\n|--------|-------|\n| Liking Users | 1 |"));
        assert!(text.contains("## Liking Users (1)"));
        assert!(text.contains("### 1. @alice (2.0K followers)"));
        assert!(text.contains("> line one\n> line two"));
        assert!(text.contains("**Likes:** 1.5K"));
        assert!(text.contains("## Retweeted By\n\n_Section failed: X rejected request"));
    }

    #[test]
    fn test_empty_section_renders_note() {
        let report = Report::new(Platform::YouTube, CommandKind::Analyze, "Signal Analysis: v")
            .with_section(Section::records("Pain Point", Vec::new()).with_empty_note("No comments matched this signal."));

        let text = render(&report);
        assert!(text.contains("## Pain Point (0)\n\n_No comments matched this signal._"));
    }

    #[test]
    fn test_comment_rendering_shows_signals_and_depth() {
        let comment = Comment {
            platform: Platform::Reddit,
            id: "c9".to_string(),
            author: "ferris".to_string(),
            body: "Would love async closures".to_string(),
            score: 42,
            reply_count: 0,
            depth: 2,
            parent_id: Some("t1_c8".to_string()),
            parent_title: None,
            permalink: "https://reddit.com/r/rust/comments/x/y/c9/".to_string(),
            created_at: None,
            signals: BTreeSet::from([SignalTag::FeatureRequest]),
        };
        let report = Report::new(Platform::Reddit, CommandKind::Comments, "Thread")
            .with_section(Section::records("Comments", vec![NormalizedRecord::Comment(comment)]));

        let text = render(&report);
        assert!(text.contains("### 1. ferris (42 points) [reply, depth 2]"));
        assert!(text.contains("- **Signals:** feature_request"));
        assert!(text.contains("- **Parent:** `t1_c8`"));
        assert!(text.contains("- **Posted:** Unknown"));
    }
}
