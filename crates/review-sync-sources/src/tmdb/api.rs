use review_sync_models::{MediaType, MetadataRecord};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::error::SourceError;

/// Detail payload shared by the movie and tv endpoints.
///
/// Movies fill the `*_title`/`release_date` fields, series fill the
/// `*_name`/`first_air_date` ones.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TmdbDetails {
    id: u64,
    #[serde(default)]
    original_title: Option<String>,
    #[serde(default)]
    original_name: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    first_air_date: Option<String>,
    #[serde(default)]
    vote_average: Option<f64>,
}

/// Round a vote average to one decimal place
fn round_rating(vote_average: f64) -> f32 {
    ((vote_average * 10.0).round() / 10.0) as f32
}

/// Treat empty date strings (the catalog sends `""` for unknown) as absent
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl TmdbDetails {
    pub(crate) fn into_record(self, media_type: MediaType) -> MetadataRecord {
        let title = self
            .original_title
            .or(self.original_name)
            .or(self.title)
            .or(self.name)
            .unwrap_or_default();

        MetadataRecord {
            id: self.id.to_string(),
            title,
            poster_path: non_empty(self.poster_path),
            rating: round_rating(self.vote_average.unwrap_or(0.0)),
            release_date: non_empty(self.release_date),
            first_air_date: non_empty(self.first_air_date),
            media_type,
        }
    }
}

fn endpoint_segment(media_type: MediaType) -> Result<&'static str, SourceError> {
    match media_type {
        MediaType::Movie => Ok("movie"),
        MediaType::Tv => Ok("tv"),
        MediaType::Video => Err(SourceError::Unsupported(
            "video identifiers are not catalog titles".to_string(),
        )),
    }
}

/// Fetch details for one movie or series
pub async fn fetch_details(
    client: &Client,
    base_url: &str,
    token: Option<&str>,
    language: &str,
    media_type: MediaType,
    content_id: &str,
) -> Result<MetadataRecord, SourceError> {
    let segment = endpoint_segment(media_type)?;
    let url = format!("{}/3/{}/{}", base_url.trim_end_matches('/'), segment, content_id);

    let mut request = client
        .get(&url)
        .query(&[("language", language)])
        .header("Accept", "application/json");
    if let Some(token) = token {
        request = request.header("Authorization", format!("Bearer {}", token));
    }

    let response = request.send().await?;
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(SourceError::NotFound(format!("{} {}", segment, content_id)));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SourceError::Status {
            url,
            status: status.as_u16(),
            body,
        });
    }

    let text = response.text().await?;
    let details: TmdbDetails = serde_json::from_str(&text)
        .map_err(|e| SourceError::Decode(format!("{} {}: {}", segment, content_id, e)))?;
    debug!("Fetched metadata for {} {}", segment, content_id);
    Ok(details.into_record(media_type))
}
