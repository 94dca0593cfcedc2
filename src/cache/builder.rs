//! Cache Builder Module
//!
//! Configures and validates a [`BlobCache`] before it touches storage.

use std::sync::Arc;

use chrono::Duration;

use super::store::{BlobCache, CacheSettings};
use super::{Refresher, TimeoutPolicy};
use crate::clock::Clock;
use crate::codec::{DataSerializer, SerializerRegistry};
use crate::error::{CacheError, Result};
use crate::storage::Directory;

// == Blob Cache Builder ==
/// Builder for [`BlobCache`].
///
/// Both serializers are mandatory; everything else has a default
/// (unlimited sizes, no timeout, no refresher, system clock).
pub struct BlobCacheBuilder<K, V> {
    directory: Arc<dyn Directory>,
    settings: CacheSettings,
    key_serializer: Option<Arc<dyn DataSerializer<K>>>,
    value_serializer: Option<Arc<dyn DataSerializer<V>>>,
    refresher: Option<Arc<dyn Refresher<K, V>>>,
    timeout: Option<Arc<dyn TimeoutPolicy>>,
    clock: Clock,
}

impl<K, V> BlobCacheBuilder<K, V> {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self {
            directory,
            settings: CacheSettings::default(),
            key_serializer: None,
            value_serializer: None,
            refresher: None,
            timeout: None,
            clock: Clock::System,
        }
    }

    pub fn key_serializer(mut self, serializer: Arc<dyn DataSerializer<K>>) -> Self {
        self.key_serializer = Some(serializer);
        self
    }

    pub fn value_serializer(mut self, serializer: Arc<dyn DataSerializer<V>>) -> Self {
        self.value_serializer = Some(serializer);
        self
    }

    /// Takes both serializers from a registry.
    ///
    /// # Errors
    /// `CacheError::NoSerializer` if either type is not registered.
    pub fn serializers_from(mut self, registry: &SerializerRegistry) -> Result<Self>
    where
        K: 'static,
        V: 'static,
    {
        self.key_serializer = Some(registry.resolve::<K>()?);
        self.value_serializer = Some(registry.resolve::<V>()?);
        Ok(self)
    }

    /// Per-entry ceiling in bytes, 0 = unlimited.
    pub fn max_entry_size(mut self, bytes: u64) -> Self {
        self.settings.max_entry_size = bytes;
        self
    }

    /// Whole-cache ceiling in bytes, 0 = unlimited.
    pub fn max_total_size(mut self, bytes: u64) -> Self {
        self.settings.max_total_size = bytes;
        self
    }

    /// Evict entries unused for `idle` during prune, regardless of size.
    pub fn prune_idle_timeout(mut self, idle: Duration) -> Self {
        self.settings.prune_idle_timeout = Some(idle);
        self
    }

    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.settings.extension = extension.into();
        self
    }

    /// Whether [`BlobCache::hash`] fingerprints metadata (default) or payload.
    pub fn hash_metadata(mut self, enabled: bool) -> Self {
        self.settings.hash_metadata = enabled;
        self
    }

    pub fn refresher(mut self, refresher: Arc<dyn Refresher<K, V>>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Uses a closure as the refresher.
    pub fn refresh_with<F>(self, refresh: F) -> Self
    where
        F: Fn(&K) -> anyhow::Result<Option<V>> + Send + Sync + 'static,
        K: 'static,
        V: 'static,
    {
        self.refresher(Arc::new(refresh))
    }

    pub fn timeout_policy(mut self, policy: Arc<dyn TimeoutPolicy>) -> Self {
        self.timeout = Some(policy);
        self
    }

    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    // == Build ==
    /// Validates the configuration and creates the cache.
    ///
    /// # Errors
    /// - `CacheError::NoSerializer` if the key or value serializer is missing
    /// - `CacheError::InvalidBlobName` if the extension is unusable
    pub fn build(self) -> Result<BlobCache<K, V>> {
        let key_serializer = self
            .key_serializer
            .ok_or_else(|| CacheError::NoSerializer("key".to_string()))?;
        let value_serializer = self
            .value_serializer
            .ok_or_else(|| CacheError::NoSerializer("value".to_string()))?;

        let extension = &self.settings.extension;
        if extension.is_empty() || extension.contains(['.', '/', '\\']) {
            return Err(CacheError::InvalidBlobName(format!(
                "unusable extension '{}'",
                extension
            )));
        }

        Ok(BlobCache::from_parts(
            self.directory,
            self.settings,
            key_serializer,
            value_serializer,
            self.refresher,
            self.timeout,
            self.clock,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::StringSerializer;
    use crate::storage::{MemoryStore, Store};

    fn directory() -> Arc<dyn Directory> {
        MemoryStore::new().create_directory("test").unwrap()
    }

    #[test]
    fn test_missing_serializers_fail_fast() {
        let result = BlobCache::<String, String>::builder(directory()).build();
        assert!(matches!(result, Err(CacheError::NoSerializer(what)) if what == "key"));

        let result = BlobCache::<String, String>::builder(directory())
            .key_serializer(Arc::new(StringSerializer))
            .build();
        assert!(matches!(result, Err(CacheError::NoSerializer(what)) if what == "value"));
    }

    #[test]
    fn test_serializers_from_registry() {
        let registry = SerializerRegistry::with_defaults();
        let cache = BlobCache::<String, Vec<u8>>::builder(directory())
            .serializers_from(&registry)
            .unwrap()
            .build()
            .unwrap();
        assert!(cache.put(&"k".to_string(), &vec![1, 2, 3]).unwrap());

        let result = BlobCache::<String, u64>::builder(directory()).serializers_from(&registry);
        assert!(matches!(result, Err(CacheError::NoSerializer(_))));
    }

    #[test]
    fn test_settings_applied() {
        let cache = BlobCache::<String, String>::builder(directory())
            .key_serializer(Arc::new(StringSerializer))
            .value_serializer(Arc::new(StringSerializer))
            .max_entry_size(512)
            .max_total_size(4096)
            .extension("dat")
            .build()
            .unwrap();

        assert_eq!(cache.max_entry_size(), 512);
        assert_eq!(cache.max_total_size(), 4096);
        assert_eq!(cache.settings().extension, "dat");
        assert_eq!(cache.name(), "test");
    }

    #[test]
    fn test_rejects_bad_extension() {
        for bad in ["", "tar.gz", "a/b"] {
            let result = BlobCache::<String, String>::builder(directory())
                .key_serializer(Arc::new(StringSerializer))
                .value_serializer(Arc::new(StringSerializer))
                .extension(bad)
                .build();
            assert!(matches!(result, Err(CacheError::InvalidBlobName(_))), "{}", bad);
        }
    }
}
