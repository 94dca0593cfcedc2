//! Cache Provider Module
//!
//! Maps logical cache names to engines that share one root store and one
//! configuration. Engines are created on first request.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::cache::{BlobCache, CacheSettings, Refresher, TimeoutPolicy};
use crate::clock::Clock;
use crate::codec::{DataSerializer, SerializerRegistry};
use crate::config::Config;
use crate::error::Result;
use crate::storage::{FsStore, Store};

// == Cache Provider ==
/// A registry of named caches under one root store.
pub struct CacheProvider<K, V> {
    root: Arc<dyn Store>,
    settings: CacheSettings,
    key_serializer: Arc<dyn DataSerializer<K>>,
    value_serializer: Arc<dyn DataSerializer<V>>,
    refresher: Option<Arc<dyn Refresher<K, V>>>,
    timeout: Option<Arc<dyn TimeoutPolicy>>,
    clock: Clock,
    caches: Mutex<HashMap<String, Arc<BlobCache<K, V>>>>,
}

impl<K, V> CacheProvider<K, V> {
    // == Constructors ==
    /// Creates a provider with default settings.
    pub fn new(
        root: Arc<dyn Store>,
        key_serializer: Arc<dyn DataSerializer<K>>,
        value_serializer: Arc<dyn DataSerializer<V>>,
    ) -> Self {
        Self {
            root,
            settings: CacheSettings::default(),
            key_serializer,
            value_serializer,
            refresher: None,
            timeout: None,
            clock: Clock::System,
            caches: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a provider on the filesystem root described by `config`.
    pub fn from_config(
        config: &Config,
        key_serializer: Arc<dyn DataSerializer<K>>,
        value_serializer: Arc<dyn DataSerializer<V>>,
    ) -> Self {
        let root = FsStore::new(&config.root).with_access_tracking(config.track_access);
        let mut provider = Self::new(Arc::new(root), key_serializer, value_serializer)
            .with_settings(config.settings());
        provider.timeout = config.timeout_policy();
        provider
    }

    /// Creates a provider resolving both serializers from `registry`.
    ///
    /// # Errors
    /// `CacheError::NoSerializer` if either type is not registered.
    pub fn from_registry(root: Arc<dyn Store>, registry: &SerializerRegistry) -> Result<Self>
    where
        K: 'static,
        V: 'static,
    {
        Ok(Self::new(root, registry.resolve::<K>()?, registry.resolve::<V>()?))
    }

    pub fn with_settings(mut self, settings: CacheSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_refresher(mut self, refresher: Arc<dyn Refresher<K, V>>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn with_timeout_policy(mut self, policy: Arc<dyn TimeoutPolicy>) -> Self {
        self.timeout = Some(policy);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    // == Lookup ==
    /// Returns the cache named `name`, creating it (and its directory) on
    /// first request.
    pub fn get(&self, name: &str) -> Result<Arc<BlobCache<K, V>>> {
        let mut caches = self.caches.lock();
        if let Some(cache) = caches.get(name) {
            return Ok(Arc::clone(cache));
        }

        let directory = self.root.open_or_create(name)?;
        let mut builder = BlobCache::builder(directory)
            .key_serializer(Arc::clone(&self.key_serializer))
            .value_serializer(Arc::clone(&self.value_serializer))
            .max_entry_size(self.settings.max_entry_size)
            .max_total_size(self.settings.max_total_size)
            .extension(self.settings.extension.clone())
            .hash_metadata(self.settings.hash_metadata)
            .clock(self.clock.clone());
        if let Some(idle) = self.settings.prune_idle_timeout {
            builder = builder.prune_idle_timeout(idle);
        }
        if let Some(refresher) = &self.refresher {
            builder = builder.refresher(Arc::clone(refresher));
        }
        if let Some(timeout) = &self.timeout {
            builder = builder.timeout_policy(Arc::clone(timeout));
        }

        let cache = Arc::new(builder.build()?);
        caches.insert(name.to_string(), Arc::clone(&cache));
        info!(cache = name, "Created cache");
        Ok(cache)
    }

    /// Forgets the named engine; its stored entries stay on disk.
    pub fn remove(&self, name: &str) -> Option<Arc<BlobCache<K, V>>> {
        self.caches.lock().remove(name)
    }

    /// Names of the live engines, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn root(&self) -> &Arc<dyn Store> {
        &self.root
    }
}

impl<K, V> fmt::Debug for CacheProvider<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheProvider")
            .field("root", &self.root)
            .field("settings", &self.settings)
            .field("caches", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LastModifiedTimeout;
    use crate::clock::ManualClock;
    use crate::codec::StringSerializer;
    use crate::error::CacheError;
    use crate::storage::MemoryStore;
    use chrono::Duration;

    fn provider(store: &MemoryStore) -> CacheProvider<String, String> {
        CacheProvider::new(
            Arc::new(store.clone()),
            Arc::new(StringSerializer),
            Arc::new(StringSerializer),
        )
    }

    #[test]
    fn test_same_name_same_engine() {
        let store = MemoryStore::new();
        let provider = provider(&store);

        let a = provider.get("images").unwrap();
        let b = provider.get("images").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let c = provider.get("thumbs").unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(provider.names(), vec!["images", "thumbs"]);
    }

    #[test]
    fn test_caches_are_isolated() {
        let store = MemoryStore::new();
        let provider = provider(&store);
        let key = "k".to_string();

        provider.get("one").unwrap().put(&key, &"1".to_string()).unwrap();
        assert_eq!(provider.get("two").unwrap().get(&key).unwrap(), None);
    }

    #[test]
    fn test_remove_keeps_entries() {
        let store = MemoryStore::new();
        let provider = provider(&store);
        let key = "k".to_string();

        provider.get("one").unwrap().put(&key, &"1".to_string()).unwrap();
        assert!(provider.remove("one").is_some());
        assert!(provider.names().is_empty());
        assert!(provider.remove("one").is_none());

        let reopened = provider.get("one").unwrap();
        assert_eq!(reopened.get(&key).unwrap(), Some("1".to_string()));
    }

    #[test]
    fn test_shared_configuration() {
        let clock = ManualClock::default();
        let store = MemoryStore::with_options(clock.clone().into(), false);
        let provider = provider(&store)
            .with_settings(CacheSettings {
                max_entry_size: 2048,
                ..CacheSettings::default()
            })
            .with_timeout_policy(Arc::new(LastModifiedTimeout::new(Duration::seconds(10))))
            .with_refresher(Arc::new(|k: &String| -> anyhow::Result<Option<String>> {
                Ok(Some(format!("{}!", k)))
            }))
            .with_clock(clock.clone().into());

        let cache = provider.get("shared").unwrap();
        assert_eq!(cache.max_entry_size(), 2048);

        let key = "k".to_string();
        cache.put(&key, &"old".to_string()).unwrap();
        clock.advance(Duration::seconds(11));
        assert_eq!(cache.get(&key).unwrap(), Some("k!".to_string()));
    }

    #[test]
    fn test_from_registry() {
        let registry = SerializerRegistry::with_defaults();
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());

        let provider =
            CacheProvider::<String, Vec<u8>>::from_registry(Arc::clone(&store), &registry).unwrap();
        assert!(provider.get("bytes").unwrap().put(&"k".to_string(), &vec![1]).unwrap());

        let missing = CacheProvider::<String, u32>::from_registry(store, &registry);
        assert!(matches!(missing, Err(CacheError::NoSerializer(_))));
    }

    #[test]
    fn test_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            root: dir.path().to_path_buf(),
            timeout: 30,
            ..Config::default()
        };
        let provider = CacheProvider::<String, String>::from_config(
            &config,
            Arc::new(StringSerializer),
            Arc::new(StringSerializer),
        );

        let cache = provider.get("disk").unwrap();
        cache.put(&"k".to_string(), &"v".to_string()).unwrap();
        assert!(dir.path().join("disk").is_dir());
        assert_eq!(cache.get(&"k".to_string()).unwrap(), Some("v".to_string()));
    }
}
