//! Text cleanup and identifier parsing shared by the platform modules.

use regex::Regex;
use scraper::Html;
use std::collections::BTreeSet;
use std::sync::OnceLock;

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern is valid"))
}

/// Converts an HTML fragment to plain text, keeping paragraph breaks.
pub fn clean_html(html: &str) -> String {
    static LINE_BREAK: OnceLock<Regex> = OnceLock::new();
    static PARAGRAPH: OnceLock<Regex> = OnceLock::new();

    if html.trim().is_empty() {
        return String::new();
    }

    let text = regex(&LINE_BREAK, r"(?i)<br\s*/?>").replace_all(html, "\n");
    let text = regex(&PARAGRAPH, r"(?i)</p>\s*<p>|<p>").replace_all(&text, "\n\n");

    let fragment = Html::parse_fragment(&text);
    let plain: String = fragment.root_element().text().collect();
    plain.trim().to_string()
}

/// Accepts a bare Reddit post id or a full permalink.
pub fn reddit_post_id(input: &str) -> String {
    static COMMENTS_PATH: OnceLock<Regex> = OnceLock::new();

    let input = input.trim();
    if input.starts_with("http") {
        if let Some(caps) = regex(&COMMENTS_PATH, r"(?i)comments/([a-z0-9]+)").captures(input) {
            return caps[1].to_string();
        }
    }
    input.trim_start_matches("t3_").to_string()
}

/// `r/Rust`, `/r/rust/` and `rust` all become `rust`.
pub fn normalize_subreddit(name: &str) -> String {
    name.trim()
        .trim_matches('/')
        .trim_start_matches("r/")
        .trim()
        .to_lowercase()
}

/// Distinct `/r/name` mentions, sorted.
pub fn subreddit_mentions(text: &str) -> Vec<String> {
    static MENTION: OnceLock<Regex> = OnceLock::new();

    regex(&MENTION, r"/r/([A-Za-z0-9_-]+)")
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn strip_handle(username: &str) -> &str {
    username.trim().trim_start_matches('@')
}
