use review_sync_models::{
    CanonicalInstant, MutationId, MutationKind, MutationPayload, PendingMutation, Review, WriteStatus,
};
use std::collections::HashSet;
use tracing::debug;

/// Prefix of the row key an unacknowledged create is shown under
pub const PLACEHOLDER_PREFIX: &str = "local:";

pub fn is_placeholder(key: &str) -> bool {
    key.starts_with(PLACEHOLDER_PREFIX)
}

/// Outcome of settling the queue against one snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settled {
    pub confirmed: Vec<MutationId>,
    pub refuted: Vec<MutationId>,
}

impl Settled {
    pub fn is_empty(&self) -> bool {
        self.confirmed.is_empty() && self.refuted.is_empty()
    }
}

/// Ordered queue of local mutations not yet seen in a snapshot.
///
/// This is the only place unconfirmed local state lives: a mutation leaves the
/// queue when a snapshot confirms it, when a snapshot refutes it, or when it is
/// cancelled. There is no timeout.
#[derive(Debug, Clone, Default)]
pub struct MutationQueue {
    next_id: u64,
    pending: Vec<PendingMutation>,
}

impl MutationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingMutation> {
        self.pending.iter()
    }

    pub fn get(&self, id: MutationId) -> Option<&PendingMutation> {
        self.pending.iter().find(|m| m.id == id)
    }

    /// The pending mutation shown on `target`, if any
    pub fn pending_for(&self, target: &str) -> Option<&PendingMutation> {
        self.pending.iter().find(|m| m.target.as_deref() == Some(target))
    }

    fn pending_kind_for(&self, target: &str, kind: MutationKind) -> bool {
        self.pending
            .iter()
            .any(|m| m.kind() == kind && m.target.as_deref() == Some(target))
    }

    fn push(&mut self, target: Option<String>, payload: MutationPayload) -> MutationId {
        self.next_id += 1;
        let id = MutationId(self.next_id);
        self.pending.push(PendingMutation {
            id,
            target,
            payload,
            write: WriteStatus::InFlight,
        });
        id
    }

    pub fn create(
        &mut self,
        author_id: &str,
        author_display_name: &str,
        body: &str,
        issued_at: CanonicalInstant,
        known_ids: HashSet<String>,
    ) -> MutationId {
        self.push(
            None,
            MutationPayload::Create {
                author_id: author_id.to_string(),
                author_display_name: author_display_name.to_string(),
                body: body.to_string(),
                issued_at,
                known_ids,
            },
        )
    }

    /// Queue an edit of a server record. A newer edit replaces an older one
    /// on the same target. Refused for placeholders and for records that are
    /// already being deleted.
    pub fn edit(&mut self, target: &str, body: &str) -> Option<MutationId> {
        if is_placeholder(target) || self.pending_kind_for(target, MutationKind::Delete) {
            return None;
        }
        self.pending
            .retain(|m| !(m.kind() == MutationKind::Edit && m.target.as_deref() == Some(target)));
        Some(self.push(
            Some(target.to_string()),
            MutationPayload::Edit { body: body.to_string() },
        ))
    }

    /// Queue a delete of a server record, superseding any pending edit on it
    pub fn delete(&mut self, target: &str) -> Option<MutationId> {
        if is_placeholder(target) || self.pending_kind_for(target, MutationKind::Delete) {
            return None;
        }
        self.pending
            .retain(|m| !(m.kind() == MutationKind::Edit && m.target.as_deref() == Some(target)));
        Some(self.push(Some(target.to_string()), MutationPayload::Delete))
    }

    pub fn cancel(&mut self, id: MutationId) -> Option<PendingMutation> {
        let index = self.pending.iter().position(|m| m.id == id)?;
        Some(self.pending.remove(index))
    }

    /// Record that the store accepted the write. A create learns its record id here.
    pub fn acknowledge(&mut self, id: MutationId, assigned_target: Option<String>) -> bool {
        match self.pending.iter_mut().find(|m| m.id == id) {
            Some(mutation) => {
                mutation.write = WriteStatus::Acknowledged;
                if mutation.target.is_none() {
                    mutation.target = assigned_target;
                }
                true
            }
            None => false,
        }
    }

    pub fn fail(&mut self, id: MutationId) -> bool {
        match self.pending.iter_mut().find(|m| m.id == id) {
            Some(mutation) => {
                mutation.write = WriteStatus::Failed;
                true
            }
            None => false,
        }
    }

    /// Settle every mutation against a snapshot's decoded records. Confirmed
    /// and refuted mutations leave the queue; the rest stay pending.
    pub fn settle(&mut self, incoming: &[Review]) -> Settled {
        let mut settled = Settled::default();
        // A record can confirm at most one create
        let mut claimed: HashSet<&str> = HashSet::new();

        self.pending.retain(|mutation| {
            let confirmed = confirms(mutation, incoming, &mut claimed);
            let refuted = !confirmed
                && (mutation.write == WriteStatus::Failed
                    || (mutation.kind() == MutationKind::Edit && !contains_target(mutation, incoming)));

            if confirmed {
                settled.confirmed.push(mutation.id);
            } else if refuted {
                settled.refuted.push(mutation.id);
            }
            !(confirmed || refuted)
        });

        if !settled.is_empty() {
            debug!(
                "Settled mutations: {} confirmed, {} refuted, {} pending",
                settled.confirmed.len(),
                settled.refuted.len(),
                self.pending.len()
            );
        }
        settled
    }
}

fn contains_target(mutation: &PendingMutation, incoming: &[Review]) -> bool {
    mutation
        .target
        .as_deref()
        .map(|target| incoming.iter().any(|r| r.review_id == target))
        .unwrap_or(false)
}

fn confirms<'a>(mutation: &PendingMutation, incoming: &'a [Review], claimed: &mut HashSet<&'a str>) -> bool {
    match (&mutation.payload, mutation.target.as_deref()) {
        (MutationPayload::Create { .. }, Some(target)) => {
            match incoming.iter().find(|r| r.review_id == target) {
                Some(review) => claimed.insert(review.review_id.as_str()),
                None => false,
            }
        }
        (
            MutationPayload::Create {
                author_id,
                body,
                known_ids,
                ..
            },
            None,
        ) => {
            let matched = incoming.iter().find(|r| {
                &r.author_id == author_id
                    && &r.body == body
                    && !known_ids.contains(&r.review_id)
                    && !claimed.contains(r.review_id.as_str())
            });
            match matched {
                Some(review) => claimed.insert(review.review_id.as_str()),
                None => false,
            }
        }
        (MutationPayload::Edit { body }, Some(target)) => incoming
            .iter()
            .any(|r| r.review_id == target && &r.body == body),
        (MutationPayload::Delete, Some(target)) => !incoming.iter().any(|r| r.review_id == target),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn review(id: &str, author: &str, body: &str) -> Review {
        Review {
            review_id: id.to_string(),
            author_id: author.to_string(),
            author_display_name: String::new(),
            body: body.to_string(),
            created_at: None,
            edited: false,
            avatar_url: None,
        }
    }

    fn now() -> CanonicalInstant {
        CanonicalInstant::new(Utc::now(), FixedOffset::east_opt(8 * 3600).unwrap())
    }

    fn known(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn test_edit_confirmed_when_body_matches() {
        let mut queue = MutationQueue::new();
        let id = queue.edit("r1", "new").unwrap();

        let stale = queue.settle(&[review("r1", "u1", "old")]);
        assert!(stale.is_empty());
        assert_eq!(queue.len(), 1);

        let settled = queue.settle(&[review("r1", "u1", "new")]);
        assert_eq!(settled.confirmed, vec![id]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_edit_refuted_when_target_disappears() {
        let mut queue = MutationQueue::new();
        let id = queue.edit("r1", "new").unwrap();
        let settled = queue.settle(&[review("r2", "u1", "x")]);
        assert_eq!(settled.refuted, vec![id]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_later_edit_overwrites_earlier() {
        let mut queue = MutationQueue::new();
        let first = queue.edit("r1", "one").unwrap();
        let second = queue.edit("r1", "two").unwrap();
        assert_ne!(first, second);
        assert_eq!(queue.len(), 1);
        assert!(queue.get(first).is_none());
        assert_eq!(
            queue.pending_for("r1").map(|m| &m.payload),
            Some(&MutationPayload::Edit { body: "two".to_string() })
        );
    }

    #[test]
    fn test_delete_replaces_edit_and_blocks_further_edits() {
        let mut queue = MutationQueue::new();
        queue.edit("r1", "one").unwrap();
        let delete = queue.delete("r1").unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pending_for("r1").map(|m| m.id), Some(delete));

        assert!(queue.edit("r1", "two").is_none());
        assert!(queue.delete("r1").is_none());

        let settled = queue.settle(&[]);
        assert_eq!(settled.confirmed, vec![delete]);
    }

    #[test]
    fn test_placeholders_cannot_be_edited_or_deleted() {
        let mut queue = MutationQueue::new();
        let create = queue.create("u1", "Ann", "hi", now(), known(&[]));
        let key = queue.get(create).unwrap().placeholder_key();
        assert!(queue.edit(&key, "changed").is_none());
        assert!(queue.delete(&key).is_none());
        assert!(queue.cancel(create).is_some());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_unacknowledged_create_matches_new_record_by_content() {
        let mut queue = MutationQueue::new();
        let id = queue.create("u1", "Ann", "hi", now(), known(&["r1"]));

        // Same content, but the record predates the create
        let settled = queue.settle(&[review("r1", "u1", "hi")]);
        assert!(settled.is_empty());

        let settled = queue.settle(&[review("r1", "u1", "hi"), review("r2", "u1", "hi")]);
        assert_eq!(settled.confirmed, vec![id]);
    }

    #[test]
    fn test_duplicate_creates_claim_distinct_records() {
        let mut queue = MutationQueue::new();
        let first = queue.create("u1", "Ann", "hi", now(), known(&[]));
        let second = queue.create("u1", "Ann", "hi", now(), known(&[]));

        let settled = queue.settle(&[review("r1", "u1", "hi")]);
        assert_eq!(settled.confirmed, vec![first]);
        assert_eq!(queue.get(second).map(|m| m.write), Some(WriteStatus::InFlight));
    }

    #[test]
    fn test_acknowledged_create_matches_by_target() {
        let mut queue = MutationQueue::new();
        let id = queue.create("u1", "Ann", "hi", now(), known(&[]));
        assert!(queue.acknowledge(id, Some("r7".to_string())));
        assert_eq!(queue.get(id).and_then(|m| m.target.clone()).as_deref(), Some("r7"));

        assert!(queue.settle(&[]).is_empty());
        let settled = queue.settle(&[review("r7", "u1", "hi")]);
        assert_eq!(settled.confirmed, vec![id]);
    }

    #[test]
    fn test_failed_write_is_refuted_unless_confirmed() {
        let mut queue = MutationQueue::new();
        let edit = queue.edit("r1", "new").unwrap();
        let delete = queue.delete("r2").unwrap();
        queue.fail(edit);
        queue.fail(delete);

        // r2 vanished anyway, so its delete still counts as confirmed
        let settled = queue.settle(&[review("r1", "u1", "old")]);
        assert_eq!(settled.refuted, vec![edit]);
        assert_eq!(settled.confirmed, vec![delete]);
    }

    #[test]
    fn test_cancel_unknown_id() {
        let mut queue = MutationQueue::new();
        assert!(queue.cancel(MutationId(42)).is_none());
        assert!(!queue.acknowledge(MutationId(42), None));
        assert!(!queue.fail(MutationId(42)));
    }
}
