//! Cache Module
//!
//! The cache engine with its size-bounded eviction, staleness policies and
//! background refresh hook.

mod builder;
mod entry;
mod lru;
mod refresher;
mod stats;
mod store;
mod timeout;


// Re-export public types
pub use builder::BlobCacheBuilder;
pub use entry::CacheEntry;
pub use lru::{last_used, oldest_first, RecencyFacet};
pub use refresher::Refresher;
pub use stats::CacheStats;
pub use store::{BlobCache, CacheSettings};
pub use timeout::{LastAccessedTimeout, LastModifiedTimeout, NeverTimeout, TimeoutPolicy};
