use chrono::{DateTime, Utc};
use review_sync_models::{MutationKind, MutationPayload, Review};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;
use crate::decode::newest_first;
use crate::mutation::MutationQueue;
use crate::time::relative_to;

/// One row of the rendered review list
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewEntry {
    pub review: Arc<Review>,
    /// Kind of the local mutation still waiting on this row
    pub pending: Option<MutationKind>,
}

impl ReviewEntry {
    pub fn key(&self) -> &str {
        &self.review.review_id
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// "posted 3 hours ago", with an "(edited)" marker
    pub fn posted_label(&self, now: DateTime<Utc>) -> String {
        let mut label = match &self.review.created_at {
            Some(instant) => format!("posted {}", relative_to(instant, now)),
            None => "posted".to_string(),
        };
        if self.review.edited {
            label.push_str(" (edited)");
        }
        label
    }
}

/// Merge the latest snapshot with pending local mutations into the rendered list.
///
/// Rows whose content did not change keep the `Arc` they had in `previous`.
pub fn reconcile(previous: &[ReviewEntry], incoming: &[Review], queue: &MutationQueue) -> Vec<ReviewEntry> {
    let mut rows: Vec<(Review, Option<MutationKind>)> = Vec::with_capacity(incoming.len() + queue.len());

    // Optimistic creates go first so they stay on top among equal timestamps
    for mutation in queue.iter() {
        if let MutationPayload::Create {
            author_id,
            author_display_name,
            body,
            issued_at,
            ..
        } = &mutation.payload
        {
            let key = mutation.row_key();
            if incoming.iter().any(|r| r.review_id == key) {
                continue;
            }
            let avatar_url = incoming
                .iter()
                .find(|r| &r.author_id == author_id)
                .and_then(|r| r.avatar_url.clone());
            rows.push((
                Review {
                    review_id: key,
                    author_id: author_id.clone(),
                    author_display_name: author_display_name.clone(),
                    body: body.clone(),
                    created_at: Some(*issued_at),
                    edited: false,
                    avatar_url,
                },
                Some(MutationKind::Create),
            ));
        }
    }

    for review in incoming {
        match queue.pending_for(&review.review_id).map(|m| &m.payload) {
            Some(MutationPayload::Delete) => continue,
            Some(MutationPayload::Edit { body }) => {
                let mut edited = review.clone();
                edited.body = body.clone();
                edited.edited = true;
                rows.push((edited, Some(MutationKind::Edit)));
            }
            _ => rows.push((review.clone(), None)),
        }
    }

    rows.sort_by(|(a, _), (b, _)| newest_first(&a.created_at, &b.created_at));

    let previous: HashMap<&str, &Arc<Review>> = previous.iter().map(|e| (e.key(), &e.review)).collect();
    let mut reused = 0usize;
    let entries: Vec<ReviewEntry> = rows
        .into_iter()
        .map(|(review, pending)| {
            let review = match previous.get(review.review_id.as_str()) {
                Some(existing) if ***existing == review => {
                    reused += 1;
                    Arc::clone(existing)
                }
                _ => Arc::new(review),
            };
            ReviewEntry { review, pending }
        })
        .collect();

    trace!("Reconciled {} row(s), {} reused", entries.len(), reused);
    entries
}
