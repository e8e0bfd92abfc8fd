pub mod decode;
pub mod enrich;
pub mod error;
pub mod history;
pub mod interaction;
pub mod logging;
pub mod mutation;
pub mod reconcile;
pub mod session;
pub mod time;
pub mod window;

#[cfg(test)]
mod testing;

pub use decode::{DecodeError, DecodeFailure, RawReview, SnapshotDecoder};
pub use enrich::MetadataEnricher;
pub use error::SyncError;
pub use history::{HistoryItem, HistoryPane, HistoryServices, HistorySession, HistoryView};
pub use interaction::{ActiveItem, InteractionState, ItemMode};
pub use logging::init_logging;
pub use mutation::{MutationQueue, Settled};
pub use reconcile::{reconcile, ReviewEntry};
pub use session::{Author, ReviewPane, ReviewServices, ReviewSession, ReviewView, SessionStatus};
pub use time::{relative_to, TimeNormalizer};
pub use window::{visible, WindowSize, WindowedView};
