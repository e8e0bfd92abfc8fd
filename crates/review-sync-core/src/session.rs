//! Live review list for one content item.

use review_sync_config::ReviewsConfig;
use review_sync_models::{DocumentPath, Fields, FieldValue, MutationId, Review};
use review_sync_sources::{AvatarResolver, DocumentStore, SourceError};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use crate::decode::{encode_edit, encode_new_review, SnapshotDecoder};
use crate::error::SyncError;
use crate::interaction::InteractionState;
use crate::mutation::MutationQueue;
use crate::reconcile::{reconcile, ReviewEntry};
use crate::time::TimeNormalizer;
use crate::window::{visible, WindowSize, WindowedView};

/// Lifecycle of a live view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Waiting for the first revision
    Loading,
    Live,
    /// The subscription failed; the last rendered state is kept
    Unavailable(String),
    Closed,
}

/// The signed-in user writing reviews
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub user_id: String,
    pub display_name: String,
}

impl Author {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Collaborators shared by every review session
#[derive(Clone)]
pub struct ReviewServices {
    pub store: Arc<dyn DocumentStore>,
    pub avatars: Arc<dyn AvatarResolver>,
    pub normalizer: TimeNormalizer,
    pub page_size: usize,
}

impl ReviewServices {
    pub fn from_config(
        store: Arc<dyn DocumentStore>,
        avatars: Arc<dyn AvatarResolver>,
        config: &ReviewsConfig,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            store,
            avatars,
            normalizer: TimeNormalizer::from_config(config)?,
            page_size: config.page_size,
        })
    }
}

/// Everything a renderer needs, published after every change
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewView {
    pub content_id: String,
    pub status: SessionStatus,
    /// Full reconciled list; [`ReviewView::visible_entries`] applies the window
    pub entries: Vec<ReviewEntry>,
    pub window: WindowSize,
    pub has_more: bool,
    pub interaction: InteractionState,
    /// Number of snapshots applied so far
    pub revision: u64,
}

impl ReviewView {
    pub fn visible_entries(&self) -> &[ReviewEntry] {
        visible(&self.entries, self.window)
    }

    pub fn review_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, key: &str) -> Option<&ReviewEntry> {
        self.entries.iter().find(|e| e.key() == key)
    }
}

/// Remote write to run once local state has been updated
enum WriteRequest {
    Append { id: MutationId, record: Fields },
    Update { id: MutationId, record_id: String, value: FieldValue },
    Remove { id: MutationId, record_id: String },
}

struct SessionState {
    content_id: String,
    server: Vec<Review>,
    entries: Vec<ReviewEntry>,
    queue: MutationQueue,
    window: WindowedView,
    interaction: InteractionState,
    status: SessionStatus,
    revision: u64,
    closed: bool,
}

impl SessionState {
    fn new(content_id: &str, page_size: usize) -> Self {
        Self {
            content_id: content_id.to_string(),
            server: Vec::new(),
            entries: Vec::new(),
            queue: MutationQueue::new(),
            window: WindowedView::new(page_size),
            interaction: InteractionState::new(),
            status: SessionStatus::Loading,
            revision: 0,
            closed: false,
        }
    }

    fn rerender(&mut self) {
        self.entries = reconcile(&self.entries, &self.server, &self.queue);
        self.interaction.forget_missing(self.entries.iter().map(|e| e.key()));
    }

    fn apply_snapshot(&mut self, reviews: Vec<Review>) {
        self.server = reviews;
        self.queue.settle(&self.server);
        self.status = SessionStatus::Live;
        self.revision += 1;
        self.rerender();
    }

    fn view(&self) -> ReviewView {
        ReviewView {
            content_id: self.content_id.clone(),
            status: self.status.clone(),
            entries: self.entries.clone(),
            window: self.window.size(),
            has_more: self.window.has_more(self.entries.len()),
            interaction: self.interaction.clone(),
            revision: self.revision,
        }
    }

    fn owned_server_review(&self, author: &Author, review_id: &str) -> Option<&Review> {
        self.server
            .iter()
            .find(|r| r.review_id == review_id && r.author_id == author.user_id)
    }

    fn create(&mut self, author: &Author, body: &str, normalizer: &TimeNormalizer) -> Option<WriteRequest> {
        let body = body.trim();
        if body.is_empty() {
            return None;
        }
        let issued_at = normalizer.now();
        let known_ids: HashSet<String> = self.server.iter().map(|r| r.review_id.clone()).collect();
        let id = self
            .queue
            .create(&author.user_id, &author.display_name, body, issued_at, known_ids);
        Some(WriteRequest::Append {
            id,
            record: encode_new_review(&author.user_id, &author.display_name, body, &issued_at),
        })
    }

    fn edit(&mut self, author: &Author, review_id: &str, body: &str) -> Option<WriteRequest> {
        let body = body.trim();
        if body.is_empty() || self.owned_server_review(author, review_id).is_none() {
            return None;
        }
        let id = self.queue.edit(review_id, body)?;
        Some(WriteRequest::Update {
            id,
            record_id: review_id.to_string(),
            value: encode_edit(body),
        })
    }

    fn delete(&mut self, author: &Author, review_id: &str) -> Option<WriteRequest> {
        self.owned_server_review(author, review_id)?;
        let id = self.queue.delete(review_id)?;
        if self.interaction.active_id() == Some(review_id) {
            self.interaction.cancel();
        }
        Some(WriteRequest::Remove {
            id,
            record_id: review_id.to_string(),
        })
    }

    fn complete_write(&mut self, id: MutationId, outcome: Result<Option<String>, SyncError>) {
        match outcome {
            Ok(assigned) => {
                if self.queue.acknowledge(id, assigned) {
                    debug!("Write for mutation {} acknowledged", id);
                }
            }
            Err(e) => {
                warn!("{}", e);
                // Stays on screen until the next snapshot settles it
                if self.queue.fail(id) {
                    debug!("Write for mutation {} failed", id);
                }
            }
        }
        self.rerender();
    }
}

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A live, reconciled review list bound to one content item and one author.
///
/// Local mutations show up in the published view immediately and are
/// replaced by server state once a snapshot confirms or refutes them.
/// Dropping the session tears down its subscription.
pub struct ReviewSession {
    content_id: String,
    path: DocumentPath,
    author: Option<Author>,
    services: ReviewServices,
    state: Arc<Mutex<SessionState>>,
    view_tx: Arc<watch::Sender<ReviewView>>,
    driver: Option<JoinHandle<()>>,
}

impl ReviewSession {
    /// Start following the reviews of `content_id`. Without an author the
    /// session is read-only. Must be called inside a tokio runtime.
    pub fn open(content_id: &str, author: Option<Author>, services: ReviewServices) -> Self {
        let path = DocumentPath::reviews(content_id);
        let state = SessionState::new(content_id, services.page_size);
        let (view_tx, _) = watch::channel(state.view());
        let state = Arc::new(Mutex::new(state));
        let view_tx = Arc::new(view_tx);

        let driver = tokio::spawn(drive(
            path.clone(),
            services.clone(),
            Arc::clone(&state),
            Arc::clone(&view_tx),
        ));
        info!("Opened review session for {}", content_id);

        Self {
            content_id: content_id.to_string(),
            path,
            author,
            services,
            state,
            view_tx,
            driver: Some(driver),
        }
    }

    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    pub fn author(&self) -> Option<&Author> {
        self.author.as_ref()
    }

    pub fn view(&self) -> ReviewView {
        self.view_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ReviewView> {
        self.view_tx.subscribe()
    }

    /// Run `f` on the live state and publish the result. `None` once closed.
    fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> Option<R> {
        let mut state = lock(&self.state);
        if state.closed {
            return None;
        }
        let result = f(&mut state);
        self.view_tx.send_replace(state.view());
        Some(result)
    }

    /// Post a new review. Blank bodies are ignored.
    pub fn submit_review(&self, body: &str) -> Option<MutationId> {
        let author = self.author.as_ref()?;
        let normalizer = self.services.normalizer;
        let request = self
            .with_state(|state| {
                let request = state.create(author, body, &normalizer);
                state.rerender();
                request
            })
            .flatten()?;
        Some(self.dispatch(request))
    }

    /// Replace the body of one of the author's own reviews
    pub fn edit_review(&self, review_id: &str, body: &str) -> Option<MutationId> {
        let author = self.author.as_ref()?;
        let request = self
            .with_state(|state| {
                let request = state.edit(author, review_id, body);
                state.rerender();
                request
            })
            .flatten()?;
        Some(self.dispatch(request))
    }

    /// Delete one of the author's own reviews
    pub fn delete_review(&self, review_id: &str) -> Option<MutationId> {
        let author = self.author.as_ref()?;
        let request = self
            .with_state(|state| {
                let request = state.delete(author, review_id);
                state.rerender();
                request
            })
            .flatten()?;
        Some(self.dispatch(request))
    }

    /// Drop a pending mutation. The remote write, if already sent, is not undone.
    pub fn cancel(&self, id: MutationId) -> bool {
        self.with_state(|state| {
            let cancelled = state.queue.cancel(id).is_some();
            state.rerender();
            cancelled
        })
        .unwrap_or(false)
    }

    /// Open or close the action menu of one of the author's own reviews
    pub fn toggle_menu(&self, review_id: &str) -> bool {
        let Some(author) = self.author.as_ref() else {
            return false;
        };
        self.with_state(|state| {
            if state.owned_server_review(author, review_id).is_none() {
                return false;
            }
            state.interaction.toggle_menu(review_id);
            true
        })
        .unwrap_or(false)
    }

    /// Open the editor on a review, seeded with the body currently shown
    pub fn begin_edit(&self, review_id: &str) -> bool {
        let Some(author) = self.author.as_ref() else {
            return false;
        };
        self.with_state(|state| {
            if state.owned_server_review(author, review_id).is_none() {
                return false;
            }
            let shown = state
                .entries
                .iter()
                .find(|e| e.key() == review_id)
                .map(|e| e.review.body.clone());
            match shown {
                Some(body) => {
                    state.interaction.begin_edit(review_id, &body);
                    true
                }
                None => false,
            }
        })
        .unwrap_or(false)
    }

    pub fn set_edit_draft(&self, text: &str) -> bool {
        self.with_state(|state| state.interaction.set_draft(text))
            .unwrap_or(false)
    }

    /// Submit the open editor's draft as an edit
    pub fn submit_edit(&self) -> Option<MutationId> {
        let author = self.author.as_ref()?;
        let request = self
            .with_state(|state| {
                let (review_id, draft) = state.interaction.take_edit()?;
                let request = state.edit(author, &review_id, &draft);
                state.rerender();
                request
            })
            .flatten()?;
        Some(self.dispatch(request))
    }

    pub fn cancel_edit(&self) {
        self.with_state(|state| state.interaction.cancel());
    }

    pub fn set_composer(&self, text: &str) {
        self.with_state(|state| state.interaction.set_composer(text));
    }

    /// Discard the composer text without posting it
    pub fn cancel_composer(&self) {
        self.with_state(|state| state.interaction.clear_composer());
    }

    /// Post the composer text as a new review and clear the composer
    pub fn submit_composer(&self) -> Option<MutationId> {
        let author = self.author.as_ref()?;
        let normalizer = self.services.normalizer;
        let request = self
            .with_state(|state| {
                let body = state.interaction.take_composer()?;
                let request = state.create(author, &body, &normalizer);
                state.rerender();
                request
            })
            .flatten()?;
        Some(self.dispatch(request))
    }

    pub fn toggle_window(&self) {
        self.with_state(|state| state.window.toggle());
    }

    /// Spawn the remote write. Its outcome is folded back into the queue.
    fn dispatch(&self, request: WriteRequest) -> MutationId {
        let store = Arc::clone(&self.services.store);
        let path = self.path.clone();
        match request {
            WriteRequest::Append { id, record } => {
                let target = path.to_string();
                self.spawn_write(id, "append", target, async move {
                    store.append(&path, record).await.map(Some)
                });
                id
            }
            WriteRequest::Update { id, record_id, value } => {
                self.spawn_write(id, "update", record_id.clone(), async move {
                    store.update(&path, &record_id, value).await.map(|_| None)
                });
                id
            }
            WriteRequest::Remove { id, record_id } => {
                self.spawn_write(id, "remove", record_id.clone(), async move {
                    store.remove(&path, &record_id).await.map(|_| None)
                });
                id
            }
        }
    }

    fn spawn_write<F>(&self, id: MutationId, op: &'static str, target: String, write: F)
    where
        F: Future<Output = Result<Option<String>, SourceError>> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let view_tx = Arc::clone(&self.view_tx);
        tokio::spawn(async move {
            let outcome = write
                .await
                .map_err(|source| SyncError::RemoteWrite { op, target, source });
            let mut state = lock(&state);
            if state.closed {
                return;
            }
            state.complete_write(id, outcome);
            view_tx.send_replace(state.view());
        });
    }

    /// Stop following the document. Idempotent.
    pub fn close(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
            let mut state = lock(&self.state);
            state.closed = true;
            state.status = SessionStatus::Closed;
            self.view_tx.send_replace(state.view());
            info!("Closed review session for {}", self.content_id);
        }
    }
}

impl Drop for ReviewSession {
    fn drop(&mut self) {
        self.close();
    }
}

async fn drive(
    path: DocumentPath,
    services: ReviewServices,
    state: Arc<Mutex<SessionState>>,
    view_tx: Arc<watch::Sender<ReviewView>>,
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
            mark_unavailable(SyncError::Subscription {
                path: path.to_string(),
                source,
            });
            return;
        }
    };

    let decoder = SnapshotDecoder::new(services.normalizer);
    while let Some(revision) = subscription.next_revision().await {
        match revision {
            Ok(document) => {
                let reviews = decoder.decode(&document, services.avatars.as_ref()).await;
                let mut state = lock(&state);
                if state.closed {
                    break;
                }
                state.apply_snapshot(reviews);
                debug!(
                    "Applied revision {} of {}: {} row(s), {} pending",
                    state.revision,
                    path,
                    state.entries.len(),
                    state.queue.len()
                );
                view_tx.send_replace(state.view());
            }
            Err(source) => {
                mark_unavailable(SyncError::Subscription {
                    path: path.to_string(),
                    source,
                });
                return;
            }
        }
    }

    mark_unavailable(SyncError::Subscription {
        path: path.to_string(),
        source: SourceError::Closed("store ended the subscription".to_string()),
    });
}

/// Holds the review session for whatever content is currently shown.
///
/// Showing a different content item, or the same one for a different author,
/// closes the previous session before the next one opens.
pub struct ReviewPane {
    services: ReviewServices,
    current: Option<ReviewSession>,
}

impl ReviewPane {
    pub fn new(services: ReviewServices) -> Self {
        Self {
            services,
            current: None,
        }
    }

    pub fn show(&mut self, content_id: &str, author: Option<Author>) -> &ReviewSession {
        let unchanged = matches!(
            &self.current,
            Some(session) if session.content_id() == content_id && session.author() == author.as_ref()
        );
        if !unchanged {
            if let Some(mut previous) = self.current.take() {
                previous.close();
            }
        }
        let services = &self.services;
        self.current
            .get_or_insert_with(|| ReviewSession::open(content_id, author, services.clone()))
    }

    pub fn current(&self) -> Option<&ReviewSession> {
        self.current.as_ref()
    }

    pub fn hide(&mut self) {
        if let Some(mut session) = self.current.take() {
            session.close();
        }
    }
}
