use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Environment variable that overrides the stored metadata token
pub const METADATA_TOKEN_ENV: &str = "REVIEWSYNC_METADATA_TOKEN";

#[derive(Debug, Serialize, Deserialize, Default)]
struct CredentialsData {
    #[serde(flatten)]
    data: HashMap<String, String>,
}

pub struct CredentialStore {
    path: PathBuf,
    credentials: HashMap<String, String>,
}

impl CredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            credentials: HashMap::new(),
        }
    }

    pub fn load(&mut self) -> Result<()> {
        if self.path.exists() {
            let content = std::fs::read_to_string(&self.path)?;
            let creds_data: CredentialsData = toml::from_str(&content)?;
            self.credentials = creds_data.data;
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let creds_data = CredentialsData {
            data: self.credentials.clone(),
        };
        let content = toml::to_string_pretty(&creds_data)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.credentials.get(key)
    }

    pub fn set(&mut self, key: String, value: String) {
        self.credentials.insert(key, value);
    }

    /// Bearer token for the metadata catalog. The environment wins over the file.
    pub fn metadata_token(&self) -> Option<String> {
        std::env::var(METADATA_TOKEN_ENV)
            .ok()
            .filter(|token| !token.is_empty())
            .or_else(|| self.get("metadata_token").cloned())
    }

    pub fn set_metadata_token(&mut self, token: String) {
        self.set("metadata_token".to_string(), token);
        self.set("metadata_token_saved_at".to_string(), Utc::now().to_rfc3339());
    }

    /// Forget the stored token; an environment override still applies
    pub fn clear_metadata_token(&mut self) {
        self.credentials.remove("metadata_token");
        self.credentials.remove("metadata_token_saved_at");
    }

    pub fn metadata_token_saved_at(&self) -> Option<DateTime<Utc>> {
        self.get("metadata_token_saved_at")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_credential_store_load_and_save() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();

        let mut store = CredentialStore::new(path.clone());
        store.set_metadata_token("test_token".to_string());
        store.save().unwrap();

        let mut loaded_store = CredentialStore::new(path);
        loaded_store.load().unwrap();
        assert_eq!(loaded_store.get("metadata_token"), Some(&"test_token".to_string()));
        let saved_at = loaded_store.metadata_token_saved_at().unwrap();
        assert!((Utc::now() - saved_at).num_seconds().abs() < 5);
    }

    #[test]
    fn test_clear_metadata_token() {
        let mut store = CredentialStore::new(PathBuf::from("/tmp/reviewsync-credentials.toml"));
        store.set_metadata_token("abc".to_string());
        store.set("other".to_string(), "kept".to_string());
        assert!(store.metadata_token_saved_at().is_some());

        store.clear_metadata_token();
        assert_eq!(store.get("metadata_token"), None);
        assert_eq!(store.metadata_token_saved_at(), None);
        assert_eq!(store.get("other"), Some(&"kept".to_string()));
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut store = CredentialStore::new(dir.path().join("credentials.toml"));
        store.load().unwrap();
        assert_eq!(store.get("metadata_token"), None);
    }
}
