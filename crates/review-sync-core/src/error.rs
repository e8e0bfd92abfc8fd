use review_sync_sources::SourceError;
use thiserror::Error;
use crate::decode::DecodeError;

/// Failure taxonomy of the sync engine.
///
/// Only `Subscription` ever reaches the user-visible layer; the others are
/// logged where they happen and the pass continues with a smaller result.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("metadata lookup for {id} failed: {source}")]
    Enrichment {
        id: String,
        #[source]
        source: SourceError,
    },

    #[error("{op} on {target} failed: {source}")]
    RemoteWrite {
        op: &'static str,
        target: String,
        #[source]
        source: SourceError,
    },

    #[error("subscription to {path} failed: {source}")]
    Subscription {
        path: String,
        #[source]
        source: SourceError,
    },
}
