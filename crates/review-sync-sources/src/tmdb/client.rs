use async_trait::async_trait;
use review_sync_config::{CredentialStore, MetadataConfig, PathManager};
use review_sync_models::{MediaType, MetadataRecord};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use crate::error::SourceError;
use crate::tmdb::api;
use crate::traits::MetadataLookup;

/// Catalog client for TMDB-compatible metadata endpoints
#[derive(Clone)]
pub struct TmdbClient {
    client: Arc<Client>,
    base_url: String,
    language: String,
    token: Option<String>,
}

impl TmdbClient {
    pub fn new(config: &MetadataConfig, token: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client: Arc::new(client),
            base_url: config.base_url.clone(),
            language: config.language.clone(),
            token,
        }
    }

    /// Build a client using the bearer token from the credential store
    pub fn from_credentials(config: &MetadataConfig, path_manager: &PathManager) -> Self {
        let mut cred_store = CredentialStore::new(path_manager.credentials_file());
        if let Err(e) = cred_store.load() {
            warn!("Failed to load credentials, metadata requests will be anonymous: {}", e);
        }

        let token = cred_store.metadata_token();
        if token.is_none() {
            warn!("No metadata token configured; catalog requests will likely be rejected");
        } else {
            info!("Using metadata catalog at {}", config.base_url);
        }
        Self::new(config, token)
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }
}

#[async_trait]
impl MetadataLookup for TmdbClient {
    async fn fetch(&self, media_type: MediaType, content_id: &str) -> Result<MetadataRecord, SourceError> {
        api::fetch_details(
            &self.client,
            &self.base_url,
            self.token.as_deref(),
            &self.language,
            media_type,
            content_id,
        )
        .await
    }
}
