pub mod blob;
pub mod error;
pub mod memory;
pub mod subscription;
pub mod tmdb;
pub mod traits;

pub use blob::{InMemoryBlobStore, ProfileImageResolver};
pub use error::SourceError;
pub use memory::InMemoryDocumentStore;
pub use subscription::{Revision, Subscription};
pub use tmdb::TmdbClient;
pub use traits::{AvatarResolver, BlobStore, DocumentStore, MetadataLookup};
