//! Field access helpers shared by every platform's record mappers.
//!
//! Identity fields go through the `required_*` helpers and fail with
//! `MalformedResponse`. Numeric fields go through `count`/`signed` and fall back
//! to zero, so renderers never see a missing number.

use crate::error::HarvestError;
use crate::types::{NormalizedRecord, Platform, RecordKey};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;

/// Reads an identifier that may be encoded as a string or a number.
pub fn required_id(
    raw: &Value,
    field: &str,
    platform: Platform,
    entity: &str,
) -> Result<String, HarvestError> {
    match raw.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(HarvestError::malformed(
            platform,
            entity,
            format!("missing identifying field '{field}'"),
        )),
    }
}

/// Reads a non-empty string field that identifies the record's author.
pub fn required_str(
    raw: &Value,
    field: &str,
    platform: Platform,
    entity: &str,
) -> Result<String, HarvestError> {
    match raw.get(field).and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => Ok(s.to_string()),
        _ => Err(HarvestError::malformed(
            platform,
            entity,
            format!("missing required field '{field}'"),
        )),
    }
}

pub fn opt_str(raw: &Value, field: &str) -> Option<String> {
    raw.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn str_or_empty(raw: &Value, field: &str) -> String {
    opt_str(raw, field).unwrap_or_default()
}

/// Non-negative counter; absent, null or negative values become zero.
pub fn count(raw: &Value, field: &str) -> u64 {
    match raw.get(field) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

/// Signed metric such as a vote score; absent values become zero.
pub fn signed(raw: &Value, field: &str) -> i64 {
    match raw.get(field) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

pub fn flag(raw: &Value, field: &str) -> bool {
    raw.get(field).and_then(Value::as_bool).unwrap_or(false)
}

/// Unix seconds (integer or float) to a UTC timestamp.
pub fn unix_timestamp(raw: &Value, field: &str) -> Option<DateTime<Utc>> {
    let secs = raw.get(field).and_then(Value::as_f64)?;
    if secs <= 0.0 {
        return None;
    }
    Utc.timestamp_opt(secs as i64, 0).single()
}

/// RFC 3339 string to a UTC timestamp.
pub fn rfc3339_timestamp(raw: &Value, field: &str) -> Option<DateTime<Utc>> {
    raw.get(field)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Truncates on a char boundary, appending an ellipsis when shortened.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

/// Maps every raw item, dropping the ones that cannot establish identity.
pub fn normalize_page<F>(items: &[Value], mut normalize: F) -> Vec<NormalizedRecord>
where
    F: FnMut(&Value) -> Result<NormalizedRecord, HarvestError>,
{
    let mut records = Vec::with_capacity(items.len());
    for raw in items {
        match normalize(raw) {
            Ok(record) => records.push(record),
            Err(error) => {
                warn!("Skipping record: {}", error);
            }
        }
    }
    records
}

/// Ordered record list that rejects repeats of the same platform identity.
#[derive(Debug, Default)]
pub struct RecordSet {
    seen: HashSet<RecordKey>,
    records: Vec<NormalizedRecord>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the record was already present.
    pub fn insert(&mut self, record: NormalizedRecord) -> bool {
        if self.seen.insert(record.key()) {
            self.records.push(record);
            true
        } else {
            false
        }
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = NormalizedRecord>) {
        for record in records {
            self.insert(record);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_vec(self) -> Vec<NormalizedRecord> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Video;
    use serde_json::json;

    fn video(id: &str) -> NormalizedRecord {
        NormalizedRecord::Video(Video {
            id: id.to_string(),
            channel: "c".to_string(),
            title: "t".to_string(),
            description: String::new(),
            url: String::new(),
            created_at: None,
        })
    }

    #[test]
    fn test_required_id_accepts_numbers_and_strings() {
        let raw = json!({"id": 8863, "objectID": "8864"});
        assert_eq!(
            required_id(&raw, "id", Platform::HackerNews, "item").unwrap(),
            "8863"
        );
        assert_eq!(
            required_id(&raw, "objectID", Platform::HackerNews, "hit").unwrap(),
            "8864"
        );
    }

    #[test]
    fn test_required_fields_fail_as_malformed() {
        let raw = json!({"id": "", "author": "   "});
        let err = required_id(&raw, "id", Platform::Reddit, "post").unwrap_err();
        assert!(matches!(err, HarvestError::MalformedResponse { .. }));

        let err = required_str(&raw, "author", Platform::Reddit, "post").unwrap_err();
        assert!(err.to_string().contains("author"));
    }

    #[test]
    fn test_missing_numbers_become_zero() {
        let raw = json!({"score": null, "likes": -3, "views": "1200", "ratio": 2.7});
        assert_eq!(count(&raw, "score"), 0);
        assert_eq!(count(&raw, "likes"), 0);
        assert_eq!(count(&raw, "views"), 1200);
        assert_eq!(count(&raw, "ratio"), 2);
        assert_eq!(count(&raw, "absent"), 0);
        assert_eq!(signed(&raw, "likes"), -3);
        assert_eq!(signed(&raw, "absent"), 0);
    }

    #[test]
    fn test_timestamps() {
        let raw = json!({"created_utc": 1640995200.0, "published": "2024-01-02T03:04:05Z", "zero": 0});
        let ts = unix_timestamp(&raw, "created_utc").unwrap();
        assert_eq!(ts.to_rfc3339(), "2022-01-01T00:00:00+00:00");
        assert!(rfc3339_timestamp(&raw, "published").is_some());
        assert!(unix_timestamp(&raw, "zero").is_none());
        assert!(rfc3339_timestamp(&raw, "missing").is_none());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 10), "héllo");
        assert_eq!(truncate("héllo wörld", 5), "héllo...");
    }

    #[test]
    fn test_normalize_page_skips_unidentifiable_items() {
        let items = vec![json!({"id": "a"}), json!({"title": "no id"}), json!({"id": "c"})];
        let records = normalize_page(&items, |raw| {
            let id = required_id(raw, "id", Platform::YouTube, "video")?;
            Ok(video(&id))
        });

        let ids: Vec<&str> = records.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_record_set_rejects_duplicates() {
        let mut set = RecordSet::new();
        assert!(set.insert(video("a")));
        assert!(!set.insert(video("a")));
        set.extend(vec![video("b"), video("a")]);

        assert_eq!(set.len(), 2);
        let ids: Vec<String> = set.into_vec().iter().map(|r| r.id().to_string()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
