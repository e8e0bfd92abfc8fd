use serde::{Deserialize, Serialize};
use crate::metadata::MediaType;

/// Which per-user sequence a set belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum HistoryCategory {
    History,
    Library,
}

impl HistoryCategory {
    /// Field name of the category map inside the user document
    pub fn field_name(&self) -> &'static str {
        match self {
            HistoryCategory::History => "history",
            HistoryCategory::Library => "library",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Videos,
    Movies,
    Series,
}

impl ContentKind {
    pub fn field_name(&self) -> &'static str {
        match self {
            ContentKind::Videos => "videos",
            ContentKind::Movies => "movies",
            ContentKind::Series => "series",
        }
    }

    pub fn media_type(&self) -> MediaType {
        match self {
            ContentKind::Videos => MediaType::Video,
            ContentKind::Movies => MediaType::Movie,
            ContentKind::Series => MediaType::Tv,
        }
    }
}

/// Ordered, duplicate-free sequence of content identifiers for one user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistorySet {
    pub user_id: String,
    pub category: HistoryCategory,
    pub kind: ContentKind,
    pub ids: Vec<String>,
}

impl HistorySet {
    pub fn new(user_id: impl Into<String>, category: HistoryCategory, kind: ContentKind) -> Self {
        Self {
            user_id: user_id.into(),
            category,
            kind,
            ids: Vec::new(),
        }
    }

    /// Build from raw ids, keeping the first occurrence of each
    pub fn with_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in ids {
            let id = id.into();
            if !self.ids.contains(&id) {
                self.ids.push(id);
            }
        }
        self
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|existing| existing == id)
    }

    /// Remove `id`. Returns false when it was not present.
    pub fn remove(&mut self, id: &str) -> bool {
        match self.ids.iter().position(|existing| existing == id) {
            Some(index) => {
                self.ids.remove(index);
                true
            }
            None => false,
        }
    }

    /// Append `id` unless already present, then drop the oldest entries beyond
    /// `max_entries`. Returns false when the id was already present.
    pub fn append_if_absent(&mut self, id: &str, max_entries: Option<usize>) -> bool {
        if self.contains(id) {
            return false;
        }
        self.ids.push(id.to_string());
        if let Some(max) = max_entries {
            if self.ids.len() > max {
                let excess = self.ids.len() - max;
                self.ids.drain(..excess);
            }
        }
        true
    }
}
