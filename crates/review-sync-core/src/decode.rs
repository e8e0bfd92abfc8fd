//! Decoding of the review document into an ordered review list, and the
//! record encodings used when writing back.

use futures::future::join_all;
use review_sync_models::{CanonicalInstant, FieldValue, Fields, RemoteDocument, Review};
use review_sync_sources::AvatarResolver;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, warn};
use crate::time::TimeNormalizer;

pub const FIELD_AUTHOR_ID: &str = "id";
pub const FIELD_DISPLAY_NAME: &str = "username";
pub const FIELD_BODY: &str = "review";
pub const FIELD_CREATED_AT: &str = "createdAt";
pub const FIELD_EDITED: &str = "isEdited";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeFailure {
    #[error("record is not a map")]
    NotAMap,
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("field `{0}` has the wrong type")]
    WrongType(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("review record {record_id} dropped: {reason}")]
pub struct DecodeError {
    pub record_id: String,
    pub reason: DecodeFailure,
}

/// One record decoded from the document, before avatar resolution
#[derive(Debug, Clone, PartialEq)]
pub struct RawReview {
    pub review_id: String,
    pub author_id: String,
    pub author_display_name: String,
    pub body: String,
    pub created_at: Option<CanonicalInstant>,
    pub edited: bool,
}

impl RawReview {
    fn into_review(self, avatar_url: Option<String>) -> Review {
        Review {
            review_id: self.review_id,
            author_id: self.author_id,
            author_display_name: self.author_display_name,
            body: self.body,
            created_at: self.created_at,
            edited: self.edited,
            avatar_url,
        }
    }
}

fn required_str<'a>(fields: &'a Fields, name: &'static str) -> Result<&'a str, DecodeFailure> {
    match fields.get(name) {
        None => Err(DecodeFailure::MissingField(name)),
        Some(value) if value.is_null() => Err(DecodeFailure::MissingField(name)),
        Some(value) => value.as_str().ok_or(DecodeFailure::WrongType(name)),
    }
}

/// Turns the raw review document into typed, ordered reviews
#[derive(Debug, Clone, Copy)]
pub struct SnapshotDecoder {
    normalizer: TimeNormalizer,
}

impl SnapshotDecoder {
    pub fn new(normalizer: TimeNormalizer) -> Self {
        Self { normalizer }
    }

    pub fn normalizer(&self) -> &TimeNormalizer {
        &self.normalizer
    }

    pub fn decode_entry(&self, key: &str, value: &FieldValue) -> Result<RawReview, DecodeError> {
        let fail = |reason: DecodeFailure| DecodeError {
            record_id: key.to_string(),
            reason,
        };
        let fields = value.as_map().ok_or_else(|| fail(DecodeFailure::NotAMap))?;
        let author_id = required_str(fields, FIELD_AUTHOR_ID).map_err(fail)?;
        let body = required_str(fields, FIELD_BODY).map_err(fail)?;

        let display_name = fields
            .get(FIELD_DISPLAY_NAME)
            .and_then(FieldValue::as_str)
            .unwrap_or_default();
        // Older records stored the creation time as a plain string
        let created_at = fields
            .get(FIELD_CREATED_AT)
            .and_then(|v| v.as_timestamp().or_else(|| v.as_str()));
        let edited = fields
            .get(FIELD_EDITED)
            .and_then(FieldValue::as_bool)
            .unwrap_or(false);

        Ok(RawReview {
            review_id: key.to_string(),
            author_id: author_id.to_string(),
            author_display_name: display_name.to_string(),
            body: body.to_string(),
            created_at: self.normalizer.normalize(created_at),
            edited,
        })
    }

    /// Decode every well-formed record in raw-key order. Malformed records
    /// are logged and dropped; a repeated key keeps its first occurrence.
    pub fn decode_entries(&self, document: &RemoteDocument) -> Vec<RawReview> {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(document.fields.len());
        for (key, value) in document.fields.iter() {
            if !seen.insert(key) {
                debug!("Ignoring repeated review key {}", key);
                continue;
            }
            match self.decode_entry(key, value) {
                Ok(raw) => entries.push(raw),
                Err(e) => warn!("{}", e),
            }
        }
        entries
    }

    /// Full decode pass: records, avatars, then ordering
    pub async fn decode(&self, document: &RemoteDocument, avatars: &dyn AvatarResolver) -> Vec<Review> {
        let entries = self.decode_entries(document);
        let avatar_urls = resolve_avatars(&entries, avatars).await;

        let mut reviews: Vec<Review> = entries
            .into_iter()
            .map(|raw| {
                let avatar = avatar_urls.get(&raw.author_id).cloned().flatten();
                raw.into_review(avatar)
            })
            .collect();
        sort_reviews(&mut reviews);

        debug!(
            "Decoded {} review(s) from {} record(s)",
            reviews.len(),
            document.fields.len()
        );
        reviews
    }
}

/// One avatar lookup per distinct author, all concurrently
async fn resolve_avatars(entries: &[RawReview], avatars: &dyn AvatarResolver) -> HashMap<String, Option<String>> {
    let mut seen = HashSet::new();
    let authors: Vec<&str> = entries
        .iter()
        .map(|raw| raw.author_id.as_str())
        .filter(|author| seen.insert(*author))
        .collect();

    let lookups = authors.iter().map(|author| async move {
        let url = match avatars.resolve_avatar(author).await {
            Ok(url) => url,
            Err(e) => {
                warn!("Avatar lookup for {} failed: {}", author, e);
                None
            }
        };
        (author.to_string(), url)
    });
    join_all(lookups).await.into_iter().collect()
}

/// Ordering of creation times: newest first, undated last
pub fn newest_first(a: &Option<CanonicalInstant>, b: &Option<CanonicalInstant>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Stable sort by [`newest_first`]; undated records keep their raw-key order
pub fn sort_reviews(reviews: &mut [Review]) {
    reviews.sort_by(|a, b| newest_first(&a.created_at, &b.created_at));
}

/// Record written by `append` for a new review
pub fn encode_new_review(author_id: &str, display_name: &str, body: &str, created_at: &CanonicalInstant) -> Fields {
    Fields::from_iter([
        (FIELD_AUTHOR_ID, FieldValue::string(author_id)),
        (FIELD_DISPLAY_NAME, FieldValue::string(display_name)),
        (FIELD_BODY, FieldValue::string(body)),
        (FIELD_CREATED_AT, FieldValue::timestamp(created_at.utc.to_rfc3339())),
        (FIELD_EDITED, FieldValue::BooleanValue(false)),
    ])
}

/// Partial record merged by `update` when a review is edited
pub fn encode_edit(body: &str) -> FieldValue {
    FieldValue::map(Fields::from_iter([
        (FIELD_BODY, FieldValue::string(body)),
        (FIELD_EDITED, FieldValue::BooleanValue(true)),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::review_record;
    use chrono::FixedOffset;
    use review_sync_sources::{InMemoryBlobStore, ProfileImageResolver};

    fn decoder() -> SnapshotDecoder {
        SnapshotDecoder::new(TimeNormalizer::new(FixedOffset::east_opt(8 * 3600).unwrap()))
    }

    fn document(records: Vec<(&str, FieldValue)>) -> RemoteDocument {
        RemoteDocument::new(Fields::from_iter(records))
    }

    #[test]
    fn test_decode_entry_defaults_optional_fields() {
        let value = FieldValue::map(Fields::from_iter([
            ("id", FieldValue::string("u1")),
            ("review", FieldValue::string("great")),
        ]));
        let raw = decoder().decode_entry("r1", &value).unwrap();
        assert_eq!(raw.author_display_name, "");
        assert!(!raw.edited);
        assert!(raw.created_at.is_none());
    }

    #[test]
    fn test_decode_entry_rejects_malformed_records() {
        let decoder = decoder();
        let no_body = FieldValue::map(Fields::from_iter([("id", FieldValue::string("u1"))]));
        assert_eq!(
            decoder.decode_entry("r1", &no_body).unwrap_err().reason,
            DecodeFailure::MissingField("review")
        );

        let wrong_author = FieldValue::map(Fields::from_iter([
            ("id", FieldValue::BooleanValue(true)),
            ("review", FieldValue::string("x")),
        ]));
        assert_eq!(
            decoder.decode_entry("r2", &wrong_author).unwrap_err().reason,
            DecodeFailure::WrongType("id")
        );

        let scalar = FieldValue::string("not a record");
        assert_eq!(decoder.decode_entry("r3", &scalar).unwrap_err().reason, DecodeFailure::NotAMap);
    }

    #[tokio::test]
    async fn test_decode_sorts_newest_first_and_undated_last() {
        let doc = document(vec![
            ("undated-1", review_record("u1", "a", None)),
            ("old", review_record("u2", "b", Some("2023-01-01T00:00:00Z"))),
            ("broken", FieldValue::map(Fields::new())),
            ("new", review_record("u3", "c", Some("2023-06-01 08:00:00"))),
            ("undated-2", review_record("u4", "d", Some("garbage"))),
        ]);
        let reviews = decoder().decode(&doc, &ProfileImageResolver::new(InMemoryBlobStore::new())).await;

        let ids: Vec<&str> = reviews.iter().map(|r| r.review_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old", "undated-1", "undated-2"]);
    }

    #[tokio::test]
    async fn test_repeated_key_keeps_first_occurrence() {
        let doc = document(vec![
            ("r1", review_record("u1", "first", None)),
            ("r1", review_record("u1", "second", None)),
        ]);
        let reviews = decoder().decode(&doc, &ProfileImageResolver::new(InMemoryBlobStore::new())).await;
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].body, "first");
    }

    #[tokio::test]
    async fn test_avatars_resolved_once_per_author() {
        let blobs = InMemoryBlobStore::new();
        blobs.put("u1/profileImage/me.png", "https://cdn/u1.png");
        blobs.fail_prefix("u2/profileImage/");
        let resolver = ProfileImageResolver::new(blobs.clone());

        let doc = document(vec![
            ("r1", review_record("u1", "a", Some("2023-01-01T00:00:00Z"))),
            ("r2", review_record("u1", "b", Some("2023-01-02T00:00:00Z"))),
            ("r3", review_record("u2", "c", Some("2023-01-03T00:00:00Z"))),
        ]);
        let reviews = decoder().decode(&doc, &resolver).await;

        assert_eq!(blobs.list_calls(), 2);
        assert_eq!(reviews[0].avatar_url, None);
        assert_eq!(reviews[1].avatar_url.as_deref(), Some("https://cdn/u1.png"));
        assert_eq!(reviews[2].avatar_url.as_deref(), Some("https://cdn/u1.png"));
    }

    #[tokio::test]
    async fn test_decode_wire_document() {
        let wire = r#"{
            "fields": {
                "b7Kq": {"mapValue": {"fields": {
                    "id": {"stringValue": "u1"},
                    "username": {"stringValue": "Ann"},
                    "review": {"stringValue": "Loved it"},
                    "createdAt": {"timestampValue": "2023-09-01T04:00:00Z"},
                    "isEdited": {"booleanValue": true}
                }}},
                "x9Zp": {"mapValue": {"fields": {
                    "id": {"stringValue": "u2"},
                    "review": {"nullValue": null}
                }}}
            }
        }"#;
        let doc: RemoteDocument = serde_json::from_str(wire).unwrap();
        let reviews = decoder().decode(&doc, &ProfileImageResolver::new(InMemoryBlobStore::new())).await;

        assert_eq!(reviews.len(), 1);
        let review = &reviews[0];
        assert_eq!(review.review_id, "b7Kq");
        assert_eq!(review.author_display_name, "Ann");
        assert!(review.edited);
        assert_eq!(
            review.created_at.map(|c| c.local.to_rfc3339()).as_deref(),
            Some("2023-09-01T12:00:00+08:00")
        );
    }

    #[test]
    fn test_new_review_round_trips_through_decoder() {
        let decoder = decoder();
        let now = decoder.normalizer().now();
        let record = FieldValue::map(encode_new_review("u1", "Ann", "hello", &now));
        let raw = decoder.decode_entry("r9", &record).unwrap();
        assert_eq!(raw.body, "hello");
        assert_eq!(raw.author_display_name, "Ann");
        assert_eq!(raw.created_at.map(|c| c.utc.timestamp()), Some(now.utc.timestamp()));
    }
}
