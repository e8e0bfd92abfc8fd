pub mod document;
pub mod history;
pub mod instant;
pub mod metadata;
pub mod mutation;
pub mod review;

pub use document::{DocumentPath, FieldValue, Fields, RemoteDocument};
pub use history::{ContentKind, HistoryCategory, HistorySet};
pub use instant::CanonicalInstant;
pub use metadata::{MediaType, MetadataRecord};
pub use mutation::{MutationId, MutationKind, MutationPayload, PendingMutation, WriteStatus};
pub use review::Review;
