//! Watch history and library sequences stored on the user document.

use review_sync_config::HistoryConfig;
use review_sync_models::{
    ContentKind, DocumentPath, FieldValue, Fields, HistoryCategory, HistorySet, MetadataRecord, RemoteDocument,
    WriteStatus,
};
use review_sync_sources::{DocumentStore, MetadataLookup, SourceError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use crate::enrich::MetadataEnricher;
use crate::error::SyncError;
use crate::session::SessionStatus;

pub const FIELD_STORE_HISTORY: &str = "storeHistory";

/// Read one `(category, kind)` sequence out of the user document.
/// Non-string entries are skipped; repeated ids keep their first position.
pub fn decode_history(
    document: &RemoteDocument,
    user_id: &str,
    category: HistoryCategory,
    kind: ContentKind,
) -> HistorySet {
    let values = document
        .fields
        .get(category.field_name())
        .and_then(FieldValue::as_map)
        .and_then(|kinds| kinds.get(kind.field_name()))
        .and_then(FieldValue::as_array)
        .unwrap_or_default();

    let ids = values.iter().filter_map(|value| {
        let id = value.as_str();
        if id.is_none() {
            debug!("Skipping non-string {} entry in {}", kind.field_name(), category.field_name());
        }
        id
    });
    HistorySet::new(user_id, category, kind).with_ids(ids)
}

/// The user's "store history" preference, `default` when never set
pub fn decode_store_history(document: &RemoteDocument, default: bool) -> bool {
    document
        .fields
        .get(FIELD_STORE_HISTORY)
        .and_then(FieldValue::as_bool)
        .unwrap_or(default)
}

/// `set` without `id`, or `None` when `id` is not in it
pub fn remove_id(set: &HistorySet, id: &str) -> Option<HistorySet> {
    let mut updated = set.clone();
    if updated.remove(id) {
        Some(updated)
    } else {
        info!(
            "{} is not in {} {} of {}, nothing to remove",
            id,
            set.category.field_name(),
            set.kind.field_name(),
            set.user_id
        );
        None
    }
}

/// Value merged into the category map to replace one kind's sequence
pub fn encode_sequence(kind: ContentKind, ids: &[String]) -> FieldValue {
    FieldValue::map(Fields::from_iter([(kind.field_name(), FieldValue::string_array(ids))]))
}

/// Collaborators shared by every history session
#[derive(Clone)]
pub struct HistoryServices {
    pub store: Arc<dyn DocumentStore>,
    pub enricher: MetadataEnricher,
    pub record_delay: Duration,
    pub max_entries: Option<usize>,
    pub store_history_default: bool,
}

impl HistoryServices {
    pub fn from_config(
        store: Arc<dyn DocumentStore>,
        lookup: Arc<dyn MetadataLookup>,
        config: &HistoryConfig,
    ) -> Self {
        Self {
            store,
            enricher: MetadataEnricher::new(lookup),
            record_delay: Duration::from_millis(config.record_delay_ms),
            max_entries: config.max_entries,
            store_history_default: config.store_history_default,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryItem {
    pub id: String,
    /// `None` while loading or when the catalog lookup failed
    pub metadata: Option<MetadataRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryView {
    pub status: SessionStatus,
    pub set: HistorySet,
    pub items: Vec<HistoryItem>,
    pub store_history: bool,
    pub revision: u64,
}

impl HistoryView {
    pub fn ids(&self) -> &[String] {
        &self.set.ids
    }
}

struct HistoryState {
    server: HistorySet,
    /// Local removals no snapshot has reflected yet
    pending_removals: HashMap<String, WriteStatus>,
    pending_appends: Vec<(String, WriteStatus)>,
    pending_flag: Option<(bool, WriteStatus)>,
    max_entries: Option<usize>,
    metadata: HashMap<String, Option<MetadataRecord>>,
    /// Ids the current metadata was fetched for
    enriched: Vec<String>,
    /// Ids a running lookup was started for
    enriching: Option<Vec<String>>,
    store_history: bool,
    status: SessionStatus,
    revision: u64,
    closed: bool,
}

impl HistoryState {
    /// Server sequence with local writes that no snapshot has reflected yet
    fn current(&self) -> HistorySet {
        let mut set = self.server.clone();
        set.ids.retain(|id| !self.pending_removals.contains_key(id));
        for (id, _) in &self.pending_appends {
            set.append_if_absent(id, self.max_entries);
        }
        set
    }

    /// Take a new server state. Local writes it reflects are done; failed
    /// writes it does not reflect are dropped.
    fn apply_snapshot(&mut self, server: HistorySet, store_history: bool) {
        self.pending_removals
            .retain(|id, write| server.contains(id) && *write != WriteStatus::Failed);
        self.pending_appends
            .retain(|(id, write)| !server.contains(id) && *write != WriteStatus::Failed);
        if let Some((flag, write)) = self.pending_flag {
            if flag == store_history || write == WriteStatus::Failed {
                self.pending_flag = None;
            }
        }
        self.store_history = self.pending_flag.map(|(flag, _)| flag).unwrap_or(store_history);
        self.server = server;
        self.status = SessionStatus::Live;
        self.revision += 1;
    }

    fn view(&self) -> HistoryView {
        let set = self.current();
        let items = set
            .ids
            .iter()
            .map(|id| HistoryItem {
                id: id.clone(),
                metadata: self.metadata.get(id).cloned().flatten(),
            })
            .collect();
        HistoryView {
            status: self.status.clone(),
            set,
            items,
            store_history: self.store_history,
            revision: self.revision,
        }
    }
}

fn lock(state: &Mutex<HistoryState>) -> MutexGuard<'_, HistoryState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sends field updates of the user document and records their outcome
#[derive(Clone)]
struct FieldWriter {
    state: Arc<Mutex<HistoryState>>,
    view_tx: Arc<watch::Sender<HistoryView>>,
    store: Arc<dyn DocumentStore>,
    path: DocumentPath,
}

impl FieldWriter {
    /// Spawn the write. `mark` sees the outcome under the state lock; the
    /// local change stays until a snapshot settles it.
    fn spawn<F>(&self, op: &'static str, field: &'static str, value: FieldValue, mark: F)
    where
        F: FnOnce(&mut HistoryState, WriteStatus) + Send + 'static,
    {
        let writer = self.clone();
        tokio::spawn(async move {
            let status = match writer.store.update(&writer.path, field, value).await {
                Ok(()) => WriteStatus::Acknowledged,
                Err(source) => {
                    let target = format!("{}/{}", writer.path, field);
                    warn!("{}", SyncError::RemoteWrite { op, target, source });
                    WriteStatus::Failed
                }
            };
            let mut state = lock(&writer.state);
            if !state.closed {
                mark(&mut state, status);
                writer.view_tx.send_replace(state.view());
            }
        });
    }
}

/// A live `(category, kind)` sequence of one user, joined against the catalog.
///
/// Removals and recorded watches are applied locally first and written as the
/// whole new sequence. Dropping the session tears down its subscription.
pub struct HistorySession {
    user_id: String,
    category: HistoryCategory,
    kind: ContentKind,
    services: HistoryServices,
    state: Arc<Mutex<HistoryState>>,
    view_tx: Arc<watch::Sender<HistoryView>>,
    writer: FieldWriter,
    driver: Option<JoinHandle<()>>,
    pending_watch: Mutex<Option<JoinHandle<()>>>,
}

impl HistorySession {
    /// Must be called inside a tokio runtime
    pub fn open(user_id: &str, category: HistoryCategory, kind: ContentKind, services: HistoryServices) -> Self {
        let path = DocumentPath::user(user_id);
        let state = HistoryState {
            server: HistorySet::new(user_id, category, kind),
            pending_removals: HashMap::new(),
            pending_appends: Vec::new(),
            pending_flag: None,
            max_entries: services.max_entries,
            metadata: HashMap::new(),
            enriched: Vec::new(),
            enriching: None,
            store_history: services.store_history_default,
            status: SessionStatus::Loading,
            revision: 0,
            closed: false,
        };
        let (view_tx, _) = watch::channel(state.view());
        let state = Arc::new(Mutex::new(state));
        let view_tx = Arc::new(view_tx);
        let writer = FieldWriter {
            state: Arc::clone(&state),
            view_tx: Arc::clone(&view_tx),
            store: Arc::clone(&services.store),
            path: path.clone(),
        };

        let driver = tokio::spawn(drive(
            path,
            services.clone(),
            Arc::clone(&state),
            Arc::clone(&view_tx),
        ));
        info!(
            "Opened {} {} session for {}",
            category.field_name(),
            kind.field_name(),
            user_id
        );

        Self {
            user_id: user_id.to_string(),
            category,
            kind,
            services,
            state,
            view_tx,
            writer,
            driver: Some(driver),
            pending_watch: Mutex::new(None),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn category(&self) -> HistoryCategory {
        self.category
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    pub fn view(&self) -> HistoryView {
        self.view_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<HistoryView> {
        self.view_tx.subscribe()
    }

    /// Remove `id` from the sequence. Returns false when it was not there.
    pub fn remove(&self, id: &str) -> bool {
        let ids = {
            let mut state = lock(&self.state);
            if state.closed {
                return false;
            }
            let Some(updated) = remove_id(&state.current(), id) else {
                return false;
            };
            state.pending_appends.retain(|(pending, _)| pending != id);
            if state.server.contains(id) {
                state.pending_removals.insert(id.to_string(), WriteStatus::InFlight);
            }
            state.enriched.retain(|enriched| enriched != id);
            self.view_tx.send_replace(state.view());
            updated.ids
        };

        let id = id.to_string();
        self.writer.spawn(
            "remove",
            self.category.field_name(),
            encode_sequence(self.kind, &ids),
            move |state, status| {
                if let Some(write) = state.pending_removals.get_mut(&id) {
                    *write = status;
                }
            },
        );
        true
    }

    /// Record that `id` was opened. After the configured delay it is appended
    /// unless already present, provided the user keeps history. A newer call
    /// replaces one still waiting; a write already sent is left to finish.
    pub fn record_watch(&self, id: &str) -> bool {
        let store_history = {
            let state = lock(&self.state);
            !state.closed && state.store_history
        };
        if !store_history {
            debug!("Not recording {}: history is off", id);
            return false;
        }

        let writer = self.writer.clone();
        let field = self.category.field_name();
        let kind = self.kind;
        let delay = self.services.record_delay;
        let id = id.to_string();

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // No await past this point, so aborting can only cancel the wait
            let ids = {
                let mut state = lock(&writer.state);
                if state.closed || !state.store_history {
                    return;
                }
                let mut updated = state.current();
                if !updated.append_if_absent(&id, state.max_entries) {
                    debug!("{} already recorded", id);
                    return;
                }
                state.pending_appends.push((id.clone(), WriteStatus::InFlight));
                writer.view_tx.send_replace(state.view());
                updated.ids
            };

            writer.spawn("record watch", field, encode_sequence(kind, &ids), move |state, status| {
                if let Some((_, write)) = state.pending_appends.iter_mut().find(|(pending, _)| pending == &id) {
                    *write = status;
                }
            });
        });

        let mut pending = self
            .pending_watch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = pending.replace(task) {
            previous.abort();
        }
        true
    }

    /// Turn history recording on or off for the user
    pub fn set_store_history(&self, enabled: bool) {
        {
            let mut state = lock(&self.state);
            if state.closed {
                return;
            }
            state.store_history = enabled;
            state.pending_flag = Some((enabled, WriteStatus::InFlight));
            self.view_tx.send_replace(state.view());
        }

        self.writer.spawn(
            "update",
            FIELD_STORE_HISTORY,
            FieldValue::BooleanValue(enabled),
            move |state, status| {
                if let Some((flag, write)) = state.pending_flag.as_mut() {
                    if *flag == enabled {
                        *write = status;
                    }
                }
            },
        );
    }

    /// Stop following the user document. Idempotent.
    pub fn close(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
            if let Some(task) = self
                .pending_watch
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take()
            {
                task.abort();
            }
            let mut state = lock(&self.state);
            state.closed = true;
            state.status = SessionStatus::Closed;
            self.view_tx.send_replace(state.view());
            info!(
                "Closed {} {} session for {}",
                self.category.field_name(),
                self.kind.field_name(),
                self.user_id
            );
        }
    }
}

impl Drop for HistorySession {
    fn drop(&mut self) {
        self.close();
    }
}

async fn drive(
    path: DocumentPath,
    services: HistoryServices,
    state: Arc<Mutex<HistoryState>>,
    view_tx: Arc<watch::Sender<HistoryView>>,
) {
    let mark_unavailable = |error: SyncError| {
        warn!("{}", error);
        let mut state = lock(&state);
        if !state.closed {
            state.status = SessionStatus::Unavailable(error.to_string());
            view_tx.send_replace(state.view());
        }
    };

    let mut subscription = match services.store.subscribe(&path).await {
        Ok(subscription) => subscription,
        Err(source) => {
            mark_unavailable(SyncError::Subscription { path: path.to_string(), source });
            return;
        }
    };

    let mut enrichment: Option<JoinHandle<()>> = None;
    while let Some(revision) = subscription.next_revision().await {
        let document = match revision {
            Ok(document) => document,
            Err(source) => {
                mark_unavailable(SyncError::Subscription { path: path.to_string(), source });
                return;
            }
        };

        let (kind, stale) = {
            let mut state = lock(&state);
            if state.closed {
                return;
            }
            let server = decode_history(&document, &state.server.user_id, state.server.category, state.server.kind);
            let store_history = decode_store_history(&document, services.store_history_default);
            state.apply_snapshot(server, store_history);
            view_tx.send_replace(state.view());

            let ids = state.current().ids;
            if ids == state.enriched || state.enriching.as_ref() == Some(&ids) {
                (state.server.kind, None)
            } else {
                state.enriching = Some(ids.clone());
                (state.server.kind, Some(ids))
            }
        };

        if let Some(ids) = stale {
            if let Some(previous) = enrichment.take() {
                previous.abort();
            }
            enrichment = Some(tokio::spawn(enrich_current(
                path.clone(),
                services.enricher.clone(),
                kind,
                ids,
                Arc::clone(&state),
                Arc::clone(&view_tx),
            )));
        }
    }

    mark_unavailable(SyncError::Subscription {
        path: path.to_string(),
        source: SourceError::Closed("store ended the subscription".to_string()),
    });
}

/// Look up `ids` and publish the result if they are still the shown ids
async fn enrich_current(
    path: DocumentPath,
    enricher: MetadataEnricher,
    kind: ContentKind,
    ids: Vec<String>,
    state: Arc<Mutex<HistoryState>>,
    view_tx: Arc<watch::Sender<HistoryView>>,
) {
    let metadata = enricher.enrich(kind.media_type(), &ids).await;
    let mut state = lock(&state);
    if state.enriching.as_ref() == Some(&ids) {
        state.enriching = None;
    }
    if state.closed {
        return;
    }
    if state.current().ids != ids {
        debug!("Dropping metadata for {} superseded id(s) of {}", ids.len(), path);
        return;
    }
    debug!("Enriched {} id(s) for {}", ids.len(), path);
    state.metadata = metadata;
    state.enriched = ids;
    view_tx.send_replace(state.view());
}

/// Holds the history session for whichever user and sequence is shown.
///
/// Showing another user, category, or kind closes the previous session
/// before the next one opens.
pub struct HistoryPane {
    services: HistoryServices,
    current: Option<HistorySession>,
}

impl HistoryPane {
    pub fn new(services: HistoryServices) -> Self {
        Self {
            services,
            current: None,
        }
    }

    pub fn show(&mut self, user_id: &str, category: HistoryCategory, kind: ContentKind) -> &HistorySession {
        let unchanged = matches!(
            &self.current,
            Some(session) if session.user_id() == user_id && session.category() == category && session.kind() == kind
        );
        if !unchanged {
            if let Some(mut previous) = self.current.take() {
                previous.close();
            }
        }
        let services = &self.services;
        self.current
            .get_or_insert_with(|| HistorySession::open(user_id, category, kind, services.clone()))
    }

    pub fn current(&self) -> Option<&HistorySession> {
        self.current.as_ref()
    }

    pub fn hide(&mut self) {
        if let Some(mut session) = self.current.take() {
            session.close();
        }
    }
}
