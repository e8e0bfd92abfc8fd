use futures::Stream;
use review_sync_models::{DocumentPath, RemoteDocument};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::debug;
use crate::error::SourceError;

/// One pushed revision, or a transport-level failure of the subscription
pub type Revision = Result<Arc<RemoteDocument>, SourceError>;

/// Lazy, infinite sequence of full-document revisions for one path.
///
/// The unsubscribe hook handed over by the store runs exactly once: on
/// [`Subscription::unsubscribe`] or when the value is dropped, whichever
/// comes first.
pub struct Subscription {
    path: DocumentPath,
    receiver: mpsc::UnboundedReceiver<Revision>,
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new<F>(path: DocumentPath, receiver: mpsc::UnboundedReceiver<Revision>, unsubscribe: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            path,
            receiver,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    pub fn path(&self) -> &DocumentPath {
        &self.path
    }

    /// Next revision, `None` once the store has closed the feed
    pub async fn next_revision(&mut self) -> Option<Revision> {
        self.receiver.recv().await
    }

    pub fn is_active(&self) -> bool {
        self.unsubscribe.is_some()
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            debug!("Unsubscribing from {}", self.path);
            self.receiver.close();
            unsubscribe();
        }
    }
}

impl Stream for Subscription {
    type Item = Revision;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_unsubscribe_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let counter = calls.clone();
        let mut subscription = Subscription::new(DocumentPath::reviews("c1"), rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tx.send(Ok(Arc::new(RemoteDocument::default()))).unwrap();
        assert!(subscription.next().await.unwrap().is_ok());

        subscription.unsubscribe();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = mpsc::unbounded_channel();
        let counter = calls.clone();
        let subscription = Subscription::new(DocumentPath::reviews("c1"), rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(subscription.is_active());
        drop(subscription);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
