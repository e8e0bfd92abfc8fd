use futures::future::join_all;
use review_sync_models::{MediaType, MetadataRecord};
use review_sync_sources::MetadataLookup;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};
use crate::error::SyncError;

/// Joins content ids against the metadata catalog.
///
/// Lookups run concurrently and fail independently: an id whose lookup
/// fails maps to `None`, and the result is only returned once every lookup
/// has settled.
#[derive(Clone)]
pub struct MetadataEnricher {
    lookup: Arc<dyn MetadataLookup>,
}

impl MetadataEnricher {
    pub fn new(lookup: Arc<dyn MetadataLookup>) -> Self {
        Self { lookup }
    }

    pub async fn enrich(
        &self,
        media_type: MediaType,
        ids: &[String],
    ) -> HashMap<String, Option<MetadataRecord>> {
        let mut seen = HashSet::new();
        let distinct: Vec<&String> = ids.iter().filter(|id| seen.insert(id.as_str())).collect();

        let lookups = distinct.iter().map(|id| {
            let lookup = self.lookup.clone();
            async move {
                let outcome = lookup.fetch(media_type, id).await;
                (id.to_string(), outcome)
            }
        });

        let mut enriched = HashMap::with_capacity(distinct.len());
        let mut failed = 0usize;
        for (id, outcome) in join_all(lookups).await {
            match outcome {
                Ok(record) => {
                    enriched.insert(id, Some(record));
                }
                Err(source) => {
                    failed += 1;
                    let error = SyncError::Enrichment { id: id.clone(), source };
                    warn!("{}", error);
                    enriched.insert(id, None);
                }
            }
        }

        debug!(
            "Enriched {} id(s) via {:?} lookup ({} failed)",
            enriched.len(),
            media_type,
            failed
        );
        enriched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLookup;
    use std::sync::atomic::Ordering;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|id| id.to_string()).collect()
    }

    #[tokio::test]
    async fn test_failure_is_isolated_per_id() {
        let enricher = MetadataEnricher::new(Arc::new(ScriptedLookup::failing(&["B"])));
        let result = enricher.enrich(MediaType::Movie, &ids(&["A", "B", "C"])).await;

        assert_eq!(result.len(), 3);
        assert_eq!(result["A"].as_ref().map(|r| r.title.as_str()), Some("Title A"));
        assert!(result["B"].is_none());
        assert_eq!(result["C"].as_ref().map(|r| r.id.as_str()), Some("C"));
    }

    #[tokio::test]
    async fn test_duplicates_are_looked_up_once() {
        let lookup = Arc::new(ScriptedLookup::failing(&[]));
        let enricher = MetadataEnricher::new(lookup.clone());
        let result = enricher.enrich(MediaType::Tv, &ids(&["A", "A", "B"])).await;

        assert_eq!(result.len(), 2);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let enricher = MetadataEnricher::new(Arc::new(ScriptedLookup::failing(&[])));
        assert!(enricher.enrich(MediaType::Movie, &[]).await.is_empty());
    }
}
