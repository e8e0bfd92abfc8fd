use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A timezone-independent point in time, carrying the source-zone view
/// alongside it for display.
///
/// Equality and ordering only look at `utc`: two instants parsed from
/// different zones that denote the same moment are equal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CanonicalInstant {
    pub utc: DateTime<Utc>,
    pub local: DateTime<FixedOffset>,
}

impl CanonicalInstant {
    pub fn new(utc: DateTime<Utc>, zone: FixedOffset) -> Self {
        Self {
            utc,
            local: utc.with_timezone(&zone),
        }
    }
}

impl PartialEq for CanonicalInstant {
    fn eq(&self, other: &Self) -> bool {
        self.utc == other.utc
    }
}

impl Eq for CanonicalInstant {}

impl PartialOrd for CanonicalInstant {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CanonicalInstant {
    fn cmp(&self, other: &Self) -> Ordering {
        self.utc.cmp(&other.utc)
    }
}
