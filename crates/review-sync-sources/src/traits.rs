use async_trait::async_trait;
use review_sync_models::{DocumentPath, FieldValue, Fields, MediaType, MetadataRecord};
use crate::error::SourceError;
use crate::subscription::Subscription;

/// Remote document store holding review documents and user documents.
///
/// Reads are full-document revisions pushed through a [`Subscription`]; writes
/// are fire-and-forget from the caller's point of view and only become visible
/// locally through a later revision.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn store_name(&self) -> &str;

    /// Start a subscription at the document's current state
    async fn subscribe(&self, path: &DocumentPath) -> Result<Subscription, SourceError>;

    /// Add a record under a store-assigned id and return that id
    async fn append(&self, path: &DocumentPath, record: Fields) -> Result<String, SourceError>;

    /// Merge `value` into the record: maps merge key by key, scalars replace.
    /// A missing record is created.
    async fn update(&self, path: &DocumentPath, record_id: &str, value: FieldValue) -> Result<(), SourceError>;

    async fn remove(&self, path: &DocumentPath, record_id: &str) -> Result<(), SourceError>;
}

/// External catalog lookup, one content identifier per call
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    async fn fetch(&self, media_type: MediaType, content_id: &str) -> Result<MetadataRecord, SourceError>;
}

/// Object storage listing used for profile images
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Object names under `prefix`, in the store's listing order
    async fn list(&self, prefix: &str) -> Result<Vec<String>, SourceError>;

    async fn download_url(&self, object: &str) -> Result<String, SourceError>;
}

#[async_trait]
pub trait AvatarResolver: Send + Sync {
    /// URL of the user's profile image, `None` when they have not uploaded one
    async fn resolve_avatar(&self, user_id: &str) -> Result<Option<String>, SourceError>;
}
