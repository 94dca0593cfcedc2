//! Refresher Module

/// Recomputes the value for a key whose cached entry went stale.
///
/// Refreshers run while the cache holds its exclusive lock, so they must not
/// call back into the same cache.
pub trait Refresher<K, V>: Send + Sync {
    /// Returns the new value, or `None` if the key can no longer be resolved.
    ///
    /// Both `Ok(None)` and `Err` count as a failed refresh: the stale entry is
    /// evicted rather than served.
    fn refresh(&self, key: &K) -> anyhow::Result<Option<V>>;
}

impl<K, V, F> Refresher<K, V> for F
where
    F: Fn(&K) -> anyhow::Result<Option<V>> + Send + Sync,
{
    fn refresh(&self, key: &K) -> anyhow::Result<Option<V>> {
        self(key)
    }
}
