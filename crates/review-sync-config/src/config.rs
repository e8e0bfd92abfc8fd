use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub reviews: ReviewsConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// External catalog (TMDB-compatible) used to enrich content identifiers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MetadataConfig {
    #[serde(default = "default_metadata_base_url")]
    pub base_url: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReviewsConfig {
    /// Rows shown before "load more"
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Zone the store authors wall-clock timestamps in, as `+HH:MM`
    #[serde(default = "default_source_utc_offset")]
    pub source_utc_offset: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HistoryConfig {
    /// How long a content page must stay open before it is recorded
    #[serde(default = "default_record_delay_ms")]
    pub record_delay_ms: u64,
    #[serde(default)]
    pub max_entries: Option<usize>,
    /// Used when the user document has no `storeHistory` flag yet
    #[serde(default = "default_true")]
    pub store_history_default: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_json_logging")]
    pub json: bool,
    pub file: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_metadata_base_url() -> String {
    "https://api.themoviedb.org".to_string()
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_page_size() -> usize {
    10
}

fn default_source_utc_offset() -> String {
    "+08:00".to_string()  // Asia/Singapore, no DST
}

fn default_record_delay_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json_logging() -> bool {
    use std::io::IsTerminal;
    !std::io::stdout().is_terminal()
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            base_url: default_metadata_base_url(),
            language: default_language(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ReviewsConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            source_utc_offset: default_source_utc_offset(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            record_delay_ms: default_record_delay_ms(),
            max_entries: None,
            store_history_default: default_true(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_json_logging(),
            file: None,
        }
    }
}

impl ReviewsConfig {
    pub fn source_offset(&self) -> anyhow::Result<FixedOffset> {
        parse_utc_offset(&self.source_utc_offset)
    }
}

/// Parse `+HH:MM` / `-HH:MM` (or `Z`) into a fixed offset
pub fn parse_utc_offset(raw: &str) -> anyhow::Result<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(|| anyhow::anyhow!("Invalid UTC offset"));
    }

    let (sign, rest) = match raw.chars().next() {
        Some('+') => (1, &raw[1..]),
        Some('-') => (-1, &raw[1..]),
        _ => return Err(anyhow::anyhow!("UTC offset must start with '+' or '-': {}", raw)),
    };
    let (hours, minutes) = rest
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("UTC offset must look like +HH:MM: {}", raw))?;
    let digits = |part: &str| -> anyhow::Result<i32> {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return Err(anyhow::anyhow!("UTC offset must look like +HH:MM: {}", raw));
        }
        Ok(part.parse()?)
    };
    let hours = digits(hours)?;
    let minutes = digits(minutes)?;
    if hours > 14 || minutes > 59 {
        return Err(anyhow::anyhow!("UTC offset out of range: {}", raw));
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| anyhow::anyhow!("UTC offset out of range: {}", raw))
}

impl Config {
    pub fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load the file when it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &PathBuf) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to_file(&self, path: &PathBuf) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.metadata.base_url.is_empty() {
            return Err(anyhow::anyhow!("metadata.base_url cannot be empty"));
        }
        if !self.metadata.base_url.starts_with("http://") && !self.metadata.base_url.starts_with("https://") {
            return Err(anyhow::anyhow!("metadata.base_url must be an http(s) URL"));
        }
        if self.metadata.timeout_secs == 0 {
            return Err(anyhow::anyhow!("metadata.timeout_secs must be positive"));
        }
        if self.reviews.page_size == 0 {
            return Err(anyhow::anyhow!("reviews.page_size must be positive"));
        }
        self.reviews.source_offset()?;
        if self.history.max_entries == Some(0) {
            return Err(anyhow::anyhow!("history.max_entries must be positive when set"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_load_and_save() {
        let file = NamedTempFile::new().unwrap();
        let mut config = Config::default();
        config.reviews.page_size = 25;
        config.history.max_entries = Some(200);
        config.metadata.language = "de-DE".to_string();

        let path = file.path().to_path_buf();
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.reviews.page_size, 25);
        assert_eq!(loaded.history.max_entries, Some(200));
        assert_eq!(loaded.metadata.language, "de-DE");
        assert_eq!(loaded.metadata.base_url, "https://api.themoviedb.org");
    }

    #[test]
    fn test_config_defaults_from_empty_file() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.reviews.page_size, 10);
        assert_eq!(config.reviews.source_utc_offset, "+08:00");
        assert_eq!(config.history.record_delay_ms, 1000);
        assert!(config.history.store_history_default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("missing.toml");
        let config = Config::load_or_default(&path).unwrap();
        assert_eq!(config.reviews.page_size, 10);
    }

    #[test]
    fn test_config_validate() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.reviews.page_size = 0;
        assert!(config.validate().is_err());
        config.reviews.page_size = 10;

        config.reviews.source_utc_offset = "Asia/Singapore".to_string();
        assert!(config.validate().is_err());
        config.reviews.source_utc_offset = "-05:30".to_string();
        assert!(config.validate().is_ok());

        config.metadata.base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("+08:00").unwrap().local_minus_utc(), 8 * 3600);
        assert_eq!(parse_utc_offset("-05:30").unwrap().local_minus_utc(), -(5 * 3600 + 30 * 60));
        assert_eq!(parse_utc_offset("Z").unwrap().local_minus_utc(), 0);
        assert!(parse_utc_offset("08:00").is_err());
        assert!(parse_utc_offset("+25:00").is_err());
        assert!(parse_utc_offset("+-05:00").is_err());
        assert!(parse_utc_offset("+08:-30").is_err());
        assert!(parse_utc_offset("-+05:00").is_err());
        assert!(parse_utc_offset("+08:").is_err());
    }
}
