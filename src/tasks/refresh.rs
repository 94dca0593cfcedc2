//! Refresh Task
//!
//! Background task that periodically refreshes and prunes one cache.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::cache::BlobCache;

/// Spawns a background task that periodically runs `refresh()` then
/// `prune()` on `cache`.
///
/// The engine is synchronous, so each run happens on the blocking pool. A
/// failed run is logged and the task keeps going.
///
/// # Arguments
/// * `cache` - The cache to maintain
/// * `interval_secs` - Seconds between runs (at least 1)
///
/// # Returns
/// A JoinHandle for the spawned task, to be aborted on shutdown.
///
/// # Example
/// ```ignore
/// let handle = spawn_refresh_task(Arc::clone(&cache), 60);
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_refresh_task<K, V>(cache: Arc<BlobCache<K, V>>, interval_secs: u64) -> JoinHandle<()>
where
    K: 'static,
    V: 'static,
{
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            cache = %cache.name(),
            "Starting refresh task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let worker = Arc::clone(&cache);
            let outcome = tokio::task::spawn_blocking(move || {
                let refreshed = worker.refresh()?;
                let pruned = worker.prune()?;
                Ok::<_, crate::error::CacheError>((refreshed, pruned))
            })
            .await;

            match outcome {
                Ok(Ok((refreshed, pruned))) if refreshed > 0 || pruned > 0 => {
                    info!(refreshed, pruned, "Cache maintenance finished");
                }
                Ok(Ok(_)) => debug!("Cache maintenance: nothing to do"),
                Ok(Err(err)) => error!(error = %err, "Cache maintenance failed"),
                Err(err) => error!(error = %err, "Cache maintenance task panicked"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::StringSerializer;
    use crate::storage::{Directory, MemoryStore, Store};

    fn cache_on(
        directory: Arc<dyn Directory>,
        max_total_size: u64,
    ) -> crate::cache::BlobCacheBuilder<String, String> {
        BlobCache::builder(directory)
            .key_serializer(Arc::new(StringSerializer))
            .value_serializer(Arc::new(StringSerializer))
            .max_total_size(max_total_size)
    }

    #[tokio::test]
    async fn test_refresh_task_refreshes_entries() {
        let directory = MemoryStore::new().create_directory("task").unwrap();
        let cache = Arc::new(
            cache_on(directory, 0)
                .refresh_with(|k: &String| Ok(Some(format!("{}-refreshed", k))))
                .build()
                .unwrap(),
        );
        cache.put(&"k".to_string(), &"v".to_string()).unwrap();

        let handle = spawn_refresh_task(Arc::clone(&cache), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(
            cache.get(&"k".to_string()).unwrap(),
            Some("k-refreshed".to_string())
        );
        handle.abort();
    }

    #[tokio::test]
    async fn test_refresh_task_prunes() {
        let store = MemoryStore::new();
        let directory = store.create_directory("task").unwrap();

        // fill through an unbounded engine, then maintain through a bounded one
        let unbounded = cache_on(Arc::clone(&directory), 0).build().unwrap();
        for i in 0..10 {
            unbounded.put(&format!("key-{}", i), &"x".repeat(64)).unwrap();
        }
        let limit = unbounded.current_size().unwrap() / 2;
        let bounded = Arc::new(cache_on(directory, limit).build().unwrap());

        let handle = spawn_refresh_task(Arc::clone(&bounded), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(bounded.current_size().unwrap() <= limit);
        assert!(bounded.stats().unwrap().evictions > 0);
        handle.abort();
    }

    #[tokio::test]
    async fn test_refresh_task_can_be_aborted() {
        let directory = MemoryStore::new().create_directory("task").unwrap();
        let cache = Arc::new(cache_on(directory, 0).build().unwrap());

        let handle = spawn_refresh_task(cache, 1);
        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
