use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MediaType {
    Movie,
    Tv,
    Video,
}

/// Catalog metadata for one content identifier, fetched for a single render
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetadataRecord {
    pub id: String,
    pub title: String, // Original title for movies, original name for series
    pub poster_path: Option<String>,
    pub rating: f32, // Vote average rounded to one decimal
    pub release_date: Option<String>,
    pub first_air_date: Option<String>,
    pub media_type: MediaType,
}
