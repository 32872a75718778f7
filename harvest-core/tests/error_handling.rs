use harvest_core::{CommandKind, ConfigError, ErrorExt, ErrorReporter, HarvestError, Platform};
use std::time::Duration;

#[test]
fn test_error_codes() {
    let usage = HarvestError::usage("missing --query");
    assert_eq!(usage.error_code(), "USAGE");

    let client = HarvestError::ClientRequest {
        platform: Platform::X,
        endpoint: "tweets/1/retweeted_by".to_string(),
        status: 403,
        body: "{}".to_string(),
    };
    assert_eq!(client.error_code(), "CLIENT_REQUEST");

    let config_error = HarvestError::Config(ConfigError::MissingEnvironmentVariable {
        var_name: "X_BEARER_TOKEN".to_string(),
    });
    assert_eq!(config_error.error_code(), "CONFIG_MISSING_ENV_VAR");
}

#[test]
fn test_retryable_errors() {
    let rate_limited = HarvestError::RateLimited {
        platform: Platform::Reddit,
        retry_after: Some(Duration::from_secs(60)),
        attempts: 1,
    };
    assert!(rate_limited.is_retryable());

    let transient = HarvestError::TransientNetwork {
        platform: Platform::HackerNews,
        reason: "timed out".to_string(),
        status: None,
    };
    assert!(transient.is_retryable());

    let not_found = HarvestError::ClientRequest {
        platform: Platform::Reddit,
        endpoint: "/r/nosuchsub/about".to_string(),
        status: 404,
        body: String::new(),
    };
    assert!(!not_found.is_retryable());
    assert!(!HarvestError::usage("bad").is_retryable());
}

#[test]
fn test_retry_after() {
    let rate_limited = HarvestError::RateLimited {
        platform: Platform::X,
        retry_after: Some(Duration::from_secs(15)),
        attempts: 1,
    };
    assert_eq!(rate_limited.retry_after(), Some(Duration::from_secs(15)));

    let transient = HarvestError::TransientNetwork {
        platform: Platform::X,
        reason: "reset".to_string(),
        status: None,
    };
    assert_eq!(transient.retry_after(), None);
}

#[test]
fn test_user_friendly_messages() {
    let auth = HarvestError::ClientRequest {
        platform: Platform::X,
        endpoint: "tweets/search/recent".to_string(),
        status: 401,
        body: "Unauthorized".to_string(),
    };
    assert!(auth.user_friendly_message().contains("credentials"));

    let config_error = HarvestError::Config(ConfigError::MissingEnvironmentVariable {
        var_name: "YOUTUBE_API_KEY".to_string(),
    });
    assert!(config_error.user_friendly_message().contains("YOUTUBE_API_KEY"));
}

#[test]
fn test_failure_description_names_platform_verb_and_cause() {
    let reporter = ErrorReporter::new();
    let error = HarvestError::RateLimited {
        platform: Platform::Reddit,
        retry_after: None,
        attempts: 5,
    };

    let line = reporter.describe_failure(Platform::Reddit, CommandKind::Search, &error);
    assert!(line.starts_with("reddit search failed"));
    assert!(line.contains("RATE_LIMITED"));
    assert!(line.contains("5 attempts"));
}

#[test]
fn test_error_reporter() {
    let error = HarvestError::usage("count out of range");

    // Both settings only change logging; neither may panic
    ErrorReporter::new()
        .with_error_reporting(true)
        .report_error(Platform::HackerNews, CommandKind::Top, &error);
    ErrorReporter::new()
        .with_error_reporting(false)
        .report_error(Platform::HackerNews, CommandKind::Top, &error);
}
