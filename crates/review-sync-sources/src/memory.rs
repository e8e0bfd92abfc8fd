//! InMemoryDocumentStore - process-local document store for tests and embedding.

use async_trait::async_trait;
use review_sync_models::{DocumentPath, FieldValue, Fields, RemoteDocument};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, trace};
use crate::error::SourceError;
use crate::subscription::{Revision, Subscription};
use crate::traits::DocumentStore;

/// A write accepted while delivery is paused
#[derive(Debug, Clone)]
enum DeferredWrite {
    Append { path: DocumentPath, record_id: String, record: Fields },
    Update { path: DocumentPath, record_id: String, value: FieldValue },
    Remove { path: DocumentPath, record_id: String },
}

#[derive(Default)]
struct StoreState {
    documents: HashMap<DocumentPath, RemoteDocument>,
    subscribers: HashMap<DocumentPath, Vec<(u64, mpsc::UnboundedSender<Revision>)>>,
    next_subscriber: u64,
    next_record: u64,
    /// Number of upcoming writes to reject
    failing_writes: usize,
    /// `Some` while writes are acknowledged but not yet applied
    deferred: Option<Vec<DeferredWrite>>,
}

impl StoreState {
    fn broadcast(&mut self, path: &DocumentPath) {
        let snapshot = Arc::new(self.documents.get(path).cloned().unwrap_or_default());
        if let Some(senders) = self.subscribers.get_mut(path) {
            senders.retain(|(_, tx)| tx.send(Ok(snapshot.clone())).is_ok());
            trace!("Delivered revision of {} to {} subscriber(s)", path, senders.len());
        }
    }

    fn apply(&mut self, write: DeferredWrite) {
        let path = match write {
            DeferredWrite::Append { path, record_id, record } => {
                let doc = self.documents.entry(path.clone()).or_default();
                doc.fields.insert(record_id, FieldValue::map(record));
                path
            }
            DeferredWrite::Update { path, record_id, value } => {
                let doc = self.documents.entry(path.clone()).or_default();
                match doc.fields.get_mut(&record_id) {
                    Some(existing) => existing.merge(value),
                    None => doc.fields.insert(record_id, value),
                }
                path
            }
            DeferredWrite::Remove { path, record_id } => {
                if let Some(doc) = self.documents.get_mut(&path) {
                    doc.fields.remove(&record_id);
                }
                path
            }
        };
        self.broadcast(&path);
    }

    fn submit(&mut self, write: DeferredWrite) -> Result<(), SourceError> {
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            debug!("Rejecting write by request: {:?}", write);
            return Err(SourceError::new("write rejected by store"));
        }
        match self.deferred.as_mut() {
            Some(queue) => queue.push(write),
            None => self.apply(write),
        }
        Ok(())
    }
}

/// In-memory document store backed by a HashMap.
///
/// Every subscriber gets the full document after each write, in write order.
/// Clone-friendly via Arc.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, SourceError> {
        self.state
            .lock()
            .map_err(|_| SourceError::new("lock poisoned"))
    }

    /// Replace a whole document and push it to subscribers
    pub fn put_document(&self, path: &DocumentPath, document: RemoteDocument) {
        if let Ok(mut state) = self.state.lock() {
            state.documents.insert(path.clone(), document);
            state.broadcast(path);
        }
    }

    pub fn document(&self, path: &DocumentPath) -> Option<RemoteDocument> {
        self.state.lock().ok()?.documents.get(path).cloned()
    }

    pub fn subscriber_count(&self, path: &DocumentPath) -> usize {
        self.state
            .lock()
            .map(|state| state.subscribers.get(path).map(|s| s.len()).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Reject the next `count` writes
    pub fn fail_next_writes(&self, count: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_writes = count;
        }
    }

    /// Acknowledge writes without applying them until [`Self::resume_delivery`]
    pub fn pause_delivery(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.deferred.get_or_insert_with(Vec::new);
        }
    }

    /// Apply every write accepted while paused, in order
    pub fn resume_delivery(&self) {
        if let Ok(mut state) = self.state.lock() {
            for write in state.deferred.take().unwrap_or_default() {
                state.apply(write);
            }
        }
    }

    /// Push the current document again without changing it
    pub fn redeliver(&self, path: &DocumentPath) {
        if let Ok(mut state) = self.state.lock() {
            state.broadcast(path);
        }
    }

    /// Fail every live subscription on `path` with a transport error
    pub fn fail_subscriptions(&self, path: &DocumentPath, message: &str) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(senders) = state.subscribers.remove(path) {
                for (_, tx) in senders {
                    let _ = tx.send(Err(SourceError::Closed(message.to_string())));
                }
            }
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn store_name(&self) -> &str {
        "memory"
    }

    async fn subscribe(&self, path: &DocumentPath) -> Result<Subscription, SourceError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriber_id = {
            let mut state = self.lock()?;
            let id = state.next_subscriber;
            state.next_subscriber += 1;
            // Each subscription starts from the current state
            let current = Arc::new(state.documents.get(path).cloned().unwrap_or_default());
            let _ = tx.send(Ok(current));
            state.subscribers.entry(path.clone()).or_default().push((id, tx));
            id
        };
        debug!("Subscriber {} registered on {}", subscriber_id, path);

        let state = Arc::downgrade(&self.state);
        let key = path.clone();
        Ok(Subscription::new(path.clone(), rx, move || {
            if let Some(state) = state.upgrade() {
                if let Ok(mut state) = state.lock() {
                    if let Some(senders) = state.subscribers.get_mut(&key) {
                        senders.retain(|(id, _)| *id != subscriber_id);
                    }
                }
            }
        }))
    }

    async fn append(&self, path: &DocumentPath, record: Fields) -> Result<String, SourceError> {
        let mut state = self.lock()?;
        state.next_record += 1;
        let record_id = format!("rec{:06}", state.next_record);
        state.submit(DeferredWrite::Append {
            path: path.clone(),
            record_id: record_id.clone(),
            record,
        })?;
        Ok(record_id)
    }

    async fn update(&self, path: &DocumentPath, record_id: &str, value: FieldValue) -> Result<(), SourceError> {
        self.lock()?.submit(DeferredWrite::Update {
            path: path.clone(),
            record_id: record_id.to_string(),
            value,
        })
    }

    async fn remove(&self, path: &DocumentPath, record_id: &str) -> Result<(), SourceError> {
        self.lock()?.submit(DeferredWrite::Remove {
            path: path.clone(),
            record_id: record_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review_record(body: &str) -> Fields {
        Fields::from_iter([
            ("id", FieldValue::string("user-1")),
            ("review", FieldValue::string(body)),
        ])
    }

    #[tokio::test]
    async fn test_subscribe_delivers_current_state_first() {
        let store = InMemoryDocumentStore::new();
        let path = DocumentPath::reviews("c1");
        store.append(&path, review_record("hello")).await.unwrap();

        let mut sub = store.subscribe(&path).await.unwrap();
        let first = sub.next_revision().await.unwrap().unwrap();
        assert_eq!(first.fields.len(), 1);
    }

    #[tokio::test]
    async fn test_writes_are_pushed_in_order() {
        let store = InMemoryDocumentStore::new();
        let path = DocumentPath::reviews("c1");
        let mut sub = store.subscribe(&path).await.unwrap();
        assert!(sub.next_revision().await.unwrap().unwrap().fields.is_empty());

        let id = store.append(&path, review_record("a")).await.unwrap();
        store
            .update(&path, &id, FieldValue::map(Fields::from_iter([("review", FieldValue::string("b"))])))
            .await
            .unwrap();
        store.remove(&path, &id).await.unwrap();

        let after_append = sub.next_revision().await.unwrap().unwrap();
        let body = after_append.fields.get(&id).and_then(|r| r.as_map()).and_then(|r| r.get("review")).cloned();
        assert_eq!(body, Some(FieldValue::string("a")));

        let after_update = sub.next_revision().await.unwrap().unwrap();
        let record = after_update.fields.get(&id).and_then(|r| r.as_map()).unwrap();
        assert_eq!(record.get("review"), Some(&FieldValue::string("b")));
        assert_eq!(record.get("id"), Some(&FieldValue::string("user-1")));

        let after_remove = sub.next_revision().await.unwrap().unwrap();
        assert!(after_remove.fields.is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_subscriber() {
        let store = InMemoryDocumentStore::new();
        let path = DocumentPath::reviews("c1");
        let sub = store.subscribe(&path).await.unwrap();
        assert_eq!(store.subscriber_count(&path), 1);
        sub.unsubscribe();
        assert_eq!(store.subscriber_count(&path), 0);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_document_untouched() {
        let store = InMemoryDocumentStore::new();
        let path = DocumentPath::reviews("c1");
        store.fail_next_writes(1);
        assert!(store.append(&path, review_record("a")).await.is_err());
        assert!(store.document(&path).is_none());
        assert!(store.append(&path, review_record("a")).await.is_ok());
    }

    #[tokio::test]
    async fn test_paused_writes_apply_on_resume() {
        let store = InMemoryDocumentStore::new();
        let path = DocumentPath::reviews("c1");
        store.pause_delivery();
        store.append(&path, review_record("a")).await.unwrap();
        assert!(store.document(&path).is_none());
        store.resume_delivery();
        assert_eq!(store.document(&path).map(|d| d.fields.len()), Some(1));
    }
}
