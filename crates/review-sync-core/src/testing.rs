//! Fakes shared by the unit tests of this crate.

use async_trait::async_trait;
use review_sync_models::{DocumentPath, FieldValue, Fields, MediaType, MetadataRecord};
use review_sync_sources::{DocumentStore, InMemoryDocumentStore, MetadataLookup, SourceError, Subscription};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Scripted catalog: every id resolves except those listed as failing
pub struct ScriptedLookup {
    pub failing: HashSet<String>,
    pub calls: AtomicUsize,
    /// Time every lookup takes
    pub delay: Duration,
}

impl ScriptedLookup {
    pub fn failing(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|id| id.to_string()).collect(),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl MetadataLookup for ScriptedLookup {
    async fn fetch(&self, media_type: MediaType, content_id: &str) -> Result<MetadataRecord, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.contains(content_id) {
            return Err(SourceError::NotFound(content_id.to_string()));
        }
        Ok(MetadataRecord {
            id: content_id.to_string(),
            title: format!("Title {}", content_id),
            poster_path: None,
            rating: 7.5,
            release_date: None,
            first_air_date: None,
            media_type,
        })
    }
}

/// In-memory store whose updates take `delay` to reach it
pub struct SlowUpdates {
    pub inner: InMemoryDocumentStore,
    pub delay: Duration,
    pub updates_started: AtomicUsize,
}

impl SlowUpdates {
    pub fn new(inner: InMemoryDocumentStore, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            updates_started: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DocumentStore for SlowUpdates {
    fn store_name(&self) -> &str {
        "slow"
    }

    async fn subscribe(&self, path: &DocumentPath) -> Result<Subscription, SourceError> {
        self.inner.subscribe(path).await
    }

    async fn append(&self, path: &DocumentPath, record: Fields) -> Result<String, SourceError> {
        self.inner.append(path, record).await
    }

    async fn update(&self, path: &DocumentPath, record_id: &str, value: FieldValue) -> Result<(), SourceError> {
        self.updates_started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.inner.update(path, record_id, value).await
    }

    async fn remove(&self, path: &DocumentPath, record_id: &str) -> Result<(), SourceError> {
        self.inner.remove(path, record_id).await
    }
}

/// A review record the way the store encodes it
pub fn review_record(author: &str, body: &str, created_at: Option<&str>) -> FieldValue {
    let mut fields = Fields::from_iter([
        ("id", FieldValue::string(author)),
        ("username", FieldValue::string(format!("{}-name", author))),
        ("review", FieldValue::string(body)),
    ]);
    if let Some(created_at) = created_at {
        fields.insert("createdAt", FieldValue::timestamp(created_at));
    }
    FieldValue::map(fields)
}
