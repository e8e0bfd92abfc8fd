use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tracing::trace;
use crate::error::SourceError;
use crate::traits::{AvatarResolver, BlobStore};

/// Resolves avatars with the "list objects under `{user}/profileImage/`, take
/// the first, turn it into a URL" pattern.
pub struct ProfileImageResolver<B> {
    blobs: B,
}

impl<B: BlobStore> ProfileImageResolver<B> {
    pub fn new(blobs: B) -> Self {
        Self { blobs }
    }

    fn prefix(user_id: &str) -> String {
        format!("{}/profileImage/", user_id)
    }
}

#[async_trait]
impl<B: BlobStore> AvatarResolver for ProfileImageResolver<B> {
    async fn resolve_avatar(&self, user_id: &str) -> Result<Option<String>, SourceError> {
        let objects = self.blobs.list(&Self::prefix(user_id)).await?;
        match objects.first() {
            Some(object) => Ok(Some(self.blobs.download_url(object).await?)),
            None => {
                trace!("No profile image for user {}", user_id);
                Ok(None)
            }
        }
    }
}

/// In-memory object store keyed by object name. Clone-friendly via Arc.
#[derive(Clone, Default)]
pub struct InMemoryBlobStore {
    objects: Arc<RwLock<BTreeMap<String, String>>>,
    failing_prefixes: Arc<RwLock<HashSet<String>>>,
    list_calls: Arc<AtomicUsize>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object and the URL it downloads from
    pub fn put(&self, object: impl Into<String>, url: impl Into<String>) {
        if let Ok(mut objects) = self.objects.write() {
            objects.insert(object.into(), url.into());
        }
    }

    /// Make every listing under `prefix` fail
    pub fn fail_prefix(&self, prefix: impl Into<String>) {
        if let Ok(mut failing) = self.failing_prefixes.write() {
            failing.insert(prefix.into());
        }
    }

    /// Number of `list` calls served so far
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, SourceError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_prefixes
            .read()
            .map_err(|_| SourceError::new("lock poisoned"))?
            .contains(prefix);
        if failing {
            return Err(SourceError::new(format!("listing {} failed", prefix)));
        }
        let objects = self.objects.read().map_err(|_| SourceError::new("lock poisoned"))?;
        Ok(objects
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn download_url(&self, object: &str) -> Result<String, SourceError> {
        let objects = self.objects.read().map_err(|_| SourceError::new("lock poisoned"))?;
        objects
            .get(object)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(object.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolves_first_object_under_prefix() {
        let blobs = InMemoryBlobStore::new();
        blobs.put("u1/profileImage/b.png", "https://cdn/b.png");
        blobs.put("u1/profileImage/a.png", "https://cdn/a.png");
        blobs.put("u2/profileImage/c.png", "https://cdn/c.png");
        let resolver = ProfileImageResolver::new(blobs);

        let url = resolver.resolve_avatar("u1").await.unwrap();
        assert_eq!(url.as_deref(), Some("https://cdn/a.png"));
    }

    #[tokio::test]
    async fn test_missing_avatar_is_none() {
        let resolver = ProfileImageResolver::new(InMemoryBlobStore::new());
        assert_eq!(resolver.resolve_avatar("nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_listing_failure_propagates() {
        let blobs = InMemoryBlobStore::new();
        blobs.fail_prefix("u1/profileImage/");
        let resolver = ProfileImageResolver::new(blobs);
        assert!(resolver.resolve_avatar("u1").await.is_err());
    }
}
