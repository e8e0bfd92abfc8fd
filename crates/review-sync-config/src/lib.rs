pub mod config;
pub mod credentials;
pub mod paths;

pub use config::{Config, HistoryConfig, LoggingConfig, MetadataConfig, ReviewsConfig, parse_utc_offset};
pub use credentials::CredentialStore;
pub use paths::{PathManager, container_base_path};
