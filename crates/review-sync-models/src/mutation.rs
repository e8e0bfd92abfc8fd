use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use crate::instant::CanonicalInstant;

/// Local, monotonically assigned mutation handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MutationId(pub u64);

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    Create,
    Edit,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MutationPayload {
    Create {
        author_id: String,
        author_display_name: String,
        body: String,
        issued_at: CanonicalInstant,
        /// Server ids visible when the create was issued. An unacknowledged
        /// create is matched against records outside this set.
        known_ids: HashSet<String>,
    },
    Edit {
        body: String,
    },
    Delete,
}

/// Outcome of the remote write backing a mutation, as far as the client knows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteStatus {
    InFlight,
    Acknowledged,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMutation {
    pub id: MutationId,
    pub target: Option<String>, // None for a create until the store assigns an id
    pub payload: MutationPayload,
    pub write: WriteStatus,
}

impl PendingMutation {
    pub fn kind(&self) -> MutationKind {
        match self.payload {
            MutationPayload::Create { .. } => MutationKind::Create,
            MutationPayload::Edit { .. } => MutationKind::Edit,
            MutationPayload::Delete => MutationKind::Delete,
        }
    }

    /// Key used for the optimistic row of a create before the server id is known
    pub fn placeholder_key(&self) -> String {
        format!("local:{}", self.id)
    }

    /// Row key this mutation is shown under: the target id, or the placeholder
    pub fn row_key(&self) -> String {
        self.target.clone().unwrap_or_else(|| self.placeholder_key())
    }
}
