//! Platform clients against mock servers, through to a written report.

mod common;

use common::mock_config;
use harvest_core::{CommandKind, HarvestError, KeywordClassifier, NormalizedRecord, Platform};
use harvest_platforms::{HackerNewsClient, XClient, YouTubeClient};
use report_writer::{Report, ReportWriter, Section};
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn story_hits(page: u32, size: u32) -> Vec<Value> {
    (0..size)
        .map(|i| {
            json!({
                "objectID": format!("{}", page * 100 + i),
                "author": "dang",
                "title": format!("Story {page}-{i}"),
                "points": 10 + i,
                "num_comments": i,
                "created_at_i": 1_700_000_000 + i,
            })
        })
        .collect()
}

async fn requests_with(server: &MockServer, key: &str, value: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| {
            request
                .url
                .query_pairs()
                .any(|(k, v)| k == key && v == value)
        })
        .count()
}

#[tokio::test]
async fn test_hn_search_walks_exactly_enough_pages() {
    let server = MockServer::start().await;
    for (page, size) in [(0u32, 20u32), (1, 20), (2, 15)] {
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("tags", "story"))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": story_hits(page, size),
                "nbPages": 3,
            })))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("tags", "comment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hits": [], "nbPages": 0})))
        .mount(&server)
        .await;

    let client = HackerNewsClient::new(&mock_config(&server)).unwrap();
    let results = client.search("rust", 50, 10).await;

    let stories = results.stories.unwrap();
    assert_eq!(stories.len(), 50);
    assert!(results.comments.unwrap().is_empty());
    assert_eq!(requests_with(&server, "tags", "story").await, 3);

    let temp = TempDir::new().unwrap();
    let report = Report::new(Platform::HackerNews, CommandKind::Search, "HN Search: rust")
        .with_section(Section::records("Stories", stories));
    let written = ReportWriter::new(temp.path()).write(&report).unwrap();

    let contents = fs::read_to_string(&written).unwrap();
    assert_eq!(contents.matches("\n### ").count(), 50);
    assert!(contents.contains("### 1. Story 0-0"));
    assert!(!contents.contains("Story 2-14"));
    assert!(written
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("hn_search_"));
}

#[tokio::test]
async fn test_x_drill_keeps_successful_views_when_one_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tweets/99/liking_users"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": "1", "username": "small", "name": "Small", "public_metrics": {"followers_count": 10}},
                {"id": "2", "username": "big", "name": "Big", "public_metrics": {"followers_count": 5000}}
            ],
            "meta": {"result_count": 2}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tweets/99/retweeted_by"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "title": "Forbidden",
            "detail": "Your plan does not include this endpoint"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tweets/99/quote_tweets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "500", "text": "Great thread", "author_id": "2"}],
            "includes": {"users": [{"id": "2", "username": "big", "name": "Big"}]},
            "meta": {"result_count": 1}
        })))
        .mount(&server)
        .await;

    let client = XClient::new(&mock_config(&server), "test-token".to_string()).unwrap();
    let drill = client.drill("99", 20).await;

    let likers = drill.liking_users.as_ref().unwrap();
    assert_eq!(likers.len(), 2);
    assert_eq!(likers[0].author(), "big");
    assert!(matches!(
        drill.retweeted_by,
        Err(HarvestError::ClientRequest { status: 403, .. })
    ));

    let report = Report::new(Platform::X, CommandKind::Drill, "Tweet Drill-Down: 99")
        .with_meta("Tweet URL", drill.tweet_url())
        .with_section(Section::from_result("Liking Users", &drill.liking_users))
        .with_section(Section::from_result("Retweeted By", &drill.retweeted_by))
        .with_section(Section::from_result("Quote Tweets", &drill.quote_tweets));
    assert!(report.is_partial());
    assert_eq!(report.record_count(), 3);

    let temp = TempDir::new().unwrap();
    let written = ReportWriter::new(temp.path()).write(&report).unwrap();
    let contents = fs::read_to_string(written).unwrap();
    assert!(contents.contains("## Liking Users (2)"));
    assert!(contents.contains("## Quote Tweets (1)"));
    assert!(contents.contains("## Retweeted By\n\n_Section failed: X rejected request"));
    assert!(contents.contains("https://x.com/big/status/500"));
}

#[tokio::test]
async fn test_youtube_quota_exhaustion_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/commentThreads"))
        .and(query_param("key", "yt-key"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": 403, "errors": [{"reason": "quotaExceeded"}]}
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = YouTubeClient::new(&mock_config(&server), "yt-key".to_string()).unwrap();
    let err = client
        .analyze("vid1", &[], 20, &KeywordClassifier::default())
        .await
        .unwrap_err();

    assert!(matches!(err, HarvestError::RateLimited { attempts: 2, .. }));
}

#[tokio::test]
async fn test_youtube_analyze_groups_replies_with_threads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/commentThreads"))
        .and(query_param("videoId", "vid1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{
                "id": "t1",
                "snippet": {
                    "totalReplyCount": 1,
                    "topLevelComment": {"id": "c1", "snippet": {
                        "authorDisplayName": "Ana",
                        "textDisplay": "The export is broken and frustrating",
                        "likeCount": 4
                    }}
                },
                "replies": {"comments": [{"id": "c2", "snippet": {
                    "authorDisplayName": "Ben",
                    "textDisplay": "Would love a dark mode",
                    "likeCount": 1
                }}]}
            }]
        })))
        .mount(&server)
        .await;

    let client = YouTubeClient::new(&mock_config(&server), "yt-key".to_string()).unwrap();
    let analysis = client
        .analyze("vid1", &[], 20, &KeywordClassifier::default())
        .await
        .unwrap();

    assert_eq!(analysis.total_comments, 2);
    let mut report = Report::new(Platform::YouTube, CommandKind::Analyze, "Signal Analysis: vid1");
    for (tag, comments) in &analysis.groups {
        let records = comments.iter().cloned().map(NormalizedRecord::Comment).collect();
        report.push_section(Section::records(tag.title(), records));
    }
    let text = report_writer::render(&report);
    assert!(text.contains("## Pain Point (1)"));
    assert!(text.contains("## Feature Request (1)"));
    assert!(text.contains("[reply, depth 1]"));
}
