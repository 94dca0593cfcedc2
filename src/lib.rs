//! Mini Disk Cache - A size-bounded, disk-backed blob cache
//!
//! Maps arbitrary keys to arbitrary values, persisting each entry as one
//! compressed blob, with LRU pruning, pluggable staleness and background
//! refresh.

pub mod cache;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod provider;
pub mod storage;
pub mod tasks;

pub use cache::{BlobCache, BlobCacheBuilder, CacheEntry, CacheStats};
pub use config::Config;
pub use error::{CacheError, Result};
pub use provider::CacheProvider;
pub use tasks::spawn_refresh_task;
