//! Command-line surface: `harvest [--config PATH] [-v] <platform> <verb> [flags]`.

use clap::{Args, Parser, Subcommand};
use harvest_core::{CommandKind, Platform};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "harvest",
    version,
    about = "Harvest research data from Hacker News, Reddit, X and YouTube into markdown reports"
)]
pub struct Cli {
    /// TOML configuration file (defaults to $HARVEST_CONFIG, then ./harvest.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Debug-level logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub platform: PlatformCommand,
}

impl Cli {
    pub fn platform(&self) -> Platform {
        self.platform.platform()
    }

    pub fn command_kind(&self) -> CommandKind {
        self.platform.command_kind()
    }
}

#[derive(Debug, Args, Clone, Default)]
pub struct OutputArgs {
    /// Report directory (default: ./<platform>_research)
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum PlatformCommand {
    /// Hacker News (Algolia search and Firebase items)
    Hn {
        #[command(subcommand)]
        command: HnCommand,
    },
    /// Reddit public JSON listings
    Reddit {
        #[command(subcommand)]
        command: RedditCommand,
    },
    /// X API v2 (needs X_BEARER_TOKEN)
    X {
        #[command(subcommand)]
        command: XCommand,
    },
    /// YouTube Data API v3 (needs YOUTUBE_API_KEY)
    Youtube {
        #[command(subcommand)]
        command: YouTubeCommand,
    },
}

impl PlatformCommand {
    pub fn platform(&self) -> Platform {
        match self {
            PlatformCommand::Hn { .. } => Platform::HackerNews,
            PlatformCommand::Reddit { .. } => Platform::Reddit,
            PlatformCommand::X { .. } => Platform::X,
            PlatformCommand::Youtube { .. } => Platform::YouTube,
        }
    }

    pub fn command_kind(&self) -> CommandKind {
        match self {
            PlatformCommand::Hn { command } => match command {
                HnCommand::Search { .. } => CommandKind::Search,
                HnCommand::Top { .. } => CommandKind::Top,
                HnCommand::Thread { .. } => CommandKind::Thread,
                HnCommand::User { .. } => CommandKind::User,
            },
            PlatformCommand::Reddit { command } => match command {
                RedditCommand::Subreddits { .. } => CommandKind::Subreddits,
                RedditCommand::Info { .. } => CommandKind::Info,
                RedditCommand::Popular { .. } => CommandKind::Popular,
                RedditCommand::Posts { .. } => CommandKind::Posts,
                RedditCommand::Search { .. } => CommandKind::Search,
                RedditCommand::Comments { .. } => CommandKind::Comments,
            },
            PlatformCommand::X { command } => match command {
                XCommand::Search { .. } => CommandKind::Search,
                XCommand::Drill { .. } => CommandKind::Drill,
                XCommand::User { .. } => CommandKind::User,
            },
            PlatformCommand::Youtube { command } => match command {
                YouTubeCommand::Search { .. } => CommandKind::Search,
                YouTubeCommand::Comments { .. } => CommandKind::Comments,
                YouTubeCommand::Analyze { .. } => CommandKind::Analyze,
            },
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum HnCommand {
    /// Search stories and comments
    Search {
        #[arg(short, long)]
        query: Option<String>,
        #[arg(short = 's', long, default_value_t = 20)]
        max_stories: u32,
        #[arg(short = 'c', long, default_value_t = 30)]
        max_comments: u32,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Front-page story listings
    Top {
        #[arg(short = 't', long = "type", default_value = "top", value_parser = ["top", "new", "best"])]
        list: String,
        #[arg(short = 'n', long, default_value_t = 30)]
        count: u32,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// A story and its top-level comments
    Thread {
        #[arg(short, long)]
        id: Option<String>,
        #[arg(short = 'n', long, default_value_t = 100)]
        max_comments: u32,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// A user profile
    User {
        #[arg(short, long)]
        username: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
}

const TIME_WINDOWS: [&str; 6] = ["hour", "day", "week", "month", "year", "all"];

#[derive(Debug, Subcommand)]
pub enum RedditCommand {
    /// Find subreddits by name or topic
    Subreddits {
        #[arg(short, long)]
        query: Option<String>,
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: u32,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Details of one subreddit
    Info {
        #[arg(short = 'r', long)]
        subreddit: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Popular or newly created subreddits
    Popular {
        #[arg(short = 't', long = "type", default_value = "popular", value_parser = ["popular", "new"])]
        listing: String,
        #[arg(short = 'n', long, default_value_t = 25)]
        limit: u32,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Posts from one subreddit
    Posts {
        #[arg(short = 'r', long)]
        subreddit: Option<String>,
        #[arg(short, long, default_value = "hot", value_parser = ["hot", "new", "top", "rising"])]
        sort: String,
        #[arg(short, long, default_value = "day", value_parser = TIME_WINDOWS)]
        time: String,
        #[arg(short = 'n', long, default_value_t = 25)]
        limit: u32,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Search posts site-wide or within subreddits
    Search {
        #[arg(short, long)]
        query: Option<String>,
        /// Comma-separated subreddit names
        #[arg(short, long, value_delimiter = ',')]
        subreddits: Vec<String>,
        #[arg(long, default_value = "relevance", value_parser = ["relevance", "top", "new", "comments"])]
        sort: String,
        #[arg(short, long, default_value = "all", value_parser = TIME_WINDOWS)]
        time: String,
        #[arg(short = 'n', long, default_value_t = 50)]
        limit: u32,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// A post and its comment tree
    Comments {
        /// Post id, t3_ fullname or URL
        #[arg(short, long)]
        post_id: Option<String>,
        #[arg(short = 'n', long, default_value_t = 100)]
        limit: u32,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Debug, Subcommand)]
pub enum XCommand {
    /// Recent tweets matching a query
    Search {
        #[arg(short, long)]
        query: Option<String>,
        #[arg(short = 'n', long, default_value_t = 50)]
        max_results: u32,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Likers, retweeters and quotes of one tweet
    Drill {
        #[arg(short, long)]
        id: Option<String>,
        #[arg(short = 'n', long, default_value_t = 50)]
        max_users: u32,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// A user profile
    User {
        #[arg(short, long)]
        username: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Debug, Subcommand)]
pub enum YouTubeCommand {
    /// Videos matching a query
    Search {
        #[arg(short, long)]
        query: Option<String>,
        #[arg(short = 'n', long, default_value_t = 10)]
        max_results: u32,
        #[arg(long, default_value = "relevance", value_parser = ["relevance", "date", "viewCount"])]
        order: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Comment threads of a video
    Comments {
        #[arg(short = 'i', long)]
        video_id: Option<String>,
        #[arg(short = 'n', long, default_value_t = 50)]
        max_results: u32,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Group a video's comments by market-research signal
    Analyze {
        #[arg(short = 'i', long)]
        video_id: Option<String>,
        /// Comma-separated: pain_point,feature_request,competitor_mention,purchase_intent,none
        #[arg(short, long, value_delimiter = ',')]
        signals: Vec<String>,
        #[arg(short = 'n', long, default_value_t = 100)]
        max_results: u32,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_reddit_search_with_subreddit_list() {
        let cli = Cli::try_parse_from([
            "harvest", "reddit", "search", "-q", "async", "--subreddits", "rust,golang", "-n", "40",
            "-o", "/tmp/out",
        ])
        .unwrap();

        assert_eq!(cli.platform(), Platform::Reddit);
        assert_eq!(cli.command_kind(), CommandKind::Search);
        let PlatformCommand::Reddit {
            command:
                RedditCommand::Search {
                    subreddits,
                    limit,
                    time,
                    output,
                    ..
                },
        } = cli.platform
        else {
            panic!("expected reddit search");
        };
        assert_eq!(subreddits, vec!["rust", "golang"]);
        assert_eq!(limit, 40);
        assert_eq!(time, "all");
        assert_eq!(output.output_dir, Some(PathBuf::from("/tmp/out")));
    }

    #[test]
    fn test_global_flags_after_verb() {
        let cli = Cli::try_parse_from(["harvest", "hn", "top", "--config", "h.toml", "-v"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("h.toml")));
        assert_eq!(cli.command_kind(), CommandKind::Top);
    }

    #[test]
    fn test_rejects_unknown_choice() {
        let result = Cli::try_parse_from(["harvest", "youtube", "search", "-q", "x", "--order", "rating"]);
        assert!(result.is_err());
    }
}
