use serde::{Deserialize, Serialize};
use crate::instant::CanonicalInstant;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Review {
    pub review_id: String, // Record key inside the review document
    pub author_id: String,
    pub author_display_name: String,
    pub body: String,
    pub created_at: Option<CanonicalInstant>,
    pub edited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>, // Resolved per decode pass, absent when lookup failed
}
