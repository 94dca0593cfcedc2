//! Cache Entry Module
//!
//! A lazy view of one stored blob, used for enumeration and diagnostics.

use std::fmt;

use chrono::{DateTime, Utc};

use super::store::BlobCache;
use crate::codec::{accounted_size, encoded_key_of};
use crate::error::Result;
use crate::storage::BlobInfo;

// == Cache Entry ==
/// Read-through view of one cache entry.
///
/// The key and value are decoded on first use and kept in the view. The
/// cached value is decoded again once the blob has been modified after it
/// was cached, so a view never serves content older than the stored blob.
pub struct CacheEntry<'a, K, V> {
    cache: &'a BlobCache<K, V>,
    info: BlobInfo,
    key: Option<K>,
    value: Option<(V, DateTime<Utc>)>,
}

impl<'a, K, V> CacheEntry<'a, K, V> {
    pub(crate) fn new(cache: &'a BlobCache<K, V>, info: BlobInfo) -> Self {
        Self {
            cache,
            info,
            key: None,
            value: None,
        }
    }

    /// Blob name, `<encoded-key>.<extension>`.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn encoded_key(&self) -> Result<&str> {
        encoded_key_of(&self.info.name)
    }

    /// Accounted size: encoded key length plus payload bytes.
    pub fn size(&self) -> u64 {
        accounted_size(&self.info.name, self.info.size)
    }

    /// Stored (compressed) payload bytes.
    pub fn payload_size(&self) -> u64 {
        self.info.size
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.info.last_modified
    }

    pub fn last_accessed(&self) -> Option<DateTime<Utc>> {
        self.info.last_accessed
    }

    /// Re-reads the blob metadata.
    ///
    /// # Returns
    /// false if the blob no longer exists; the last known metadata is kept.
    pub fn reload(&mut self) -> Result<bool> {
        match self.cache.stat(&self.info.name)? {
            Some(info) => {
                self.info = info;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // == Key ==
    /// The decoded key.
    pub fn key(&mut self) -> Result<&K> {
        let key = match self.key.take() {
            Some(key) => key,
            None => self.cache.decode_key(encoded_key_of(&self.info.name)?)?,
        };
        Ok(self.key.insert(key))
    }

    // == Value ==
    /// The decoded value, or `None` once the blob is gone.
    ///
    /// Reading the value does not apply the cache's timeout policy.
    pub fn value(&mut self) -> Result<Option<&V>> {
        let Some(info) = self.cache.stat(&self.info.name)? else {
            self.value = None;
            return Ok(None);
        };

        // without a modification time there is nothing to validate against
        let cached = self.value.take().filter(|(_, cached_at)| {
            info.last_modified
                .is_some_and(|modified| modified <= *cached_at)
        });
        self.info = info;

        let cached = match cached {
            Some(cached) => cached,
            None => {
                let cached_at = self.cache.now();
                (self.cache.read_blob(&self.info.name)?, cached_at)
            }
        };
        Ok(Some(&self.value.insert(cached).0))
    }
}

impl<K, V> fmt::Debug for CacheEntry<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("info", &self.info)
            .field("key_decoded", &self.key.is_some())
            .field("value_cached", &self.value.is_some())
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use crate::cache::BlobCache;
    use crate::clock::ManualClock;
    use crate::codec::StringSerializer;
    use crate::storage::{MemoryStore, Store};

    fn cache(clock: &ManualClock) -> BlobCache<String, String> {
        let store = MemoryStore::with_options(clock.clone().into(), false);
        BlobCache::builder(store.create_directory("entries").unwrap())
            .key_serializer(Arc::new(StringSerializer))
            .value_serializer(Arc::new(StringSerializer))
            .clock(clock.clone().into())
            .build()
            .unwrap()
    }

    #[test]
    fn test_entry_exposes_key_value_and_metadata() {
        let clock = ManualClock::default();
        let cache = cache(&clock);
        cache.put(&"alpha".to_string(), &"one".to_string()).unwrap();

        let mut entry = cache.entry(&"alpha".to_string()).unwrap().unwrap();
        assert_eq!(entry.key().unwrap(), "alpha");
        assert_eq!(entry.value().unwrap().unwrap(), "one");
        assert_eq!(entry.last_modified(), Some(clock.now()));
        assert_eq!(entry.last_accessed(), None);
        assert_eq!(
            entry.size(),
            entry.encoded_key().unwrap().len() as u64 + entry.payload_size()
        );
        assert!(entry.name().ends_with(".bin"));
    }

    #[test]
    fn test_value_redecoded_after_modification() {
        let clock = ManualClock::default();
        let cache = cache(&clock);
        let key = "k".to_string();
        cache.put(&key, &"v1".to_string()).unwrap();

        let mut entry = cache.entry(&key).unwrap().unwrap();
        assert_eq!(entry.value().unwrap().unwrap(), "v1");

        clock.advance(Duration::seconds(1));
        cache.put(&key, &"v2".to_string()).unwrap();

        assert_eq!(entry.value().unwrap().unwrap(), "v2");
        assert_eq!(entry.last_modified(), Some(clock.now()));
    }

    #[test]
    fn test_value_absent_after_clear() {
        let clock = ManualClock::default();
        let cache = cache(&clock);
        let key = "k".to_string();
        cache.put(&key, &"v".to_string()).unwrap();

        let mut entry = cache.entry(&key).unwrap().unwrap();
        cache.clear_key(&key).unwrap();

        assert!(entry.value().unwrap().is_none());
        assert!(!entry.reload().unwrap());
        // key still decodes from the name
        assert_eq!(entry.key().unwrap(), "k");
    }

    #[test]
    fn test_entries_enumerates_all() {
        let clock = ManualClock::default();
        let cache = cache(&clock);
        for key in ["a", "b", "c"] {
            cache.put(&key.to_string(), &key.to_uppercase()).unwrap();
        }

        let mut seen: Vec<(String, String)> = cache
            .entries()
            .unwrap()
            .into_iter()
            .map(|mut entry| {
                let key = entry.key().unwrap().clone();
                let value = entry.value().unwrap().unwrap().clone();
                (key, value)
            })
            .collect();
        seen.sort();

        assert_eq!(
            seen,
            vec![
                ("a".to_string(), "A".to_string()),
                ("b".to_string(), "B".to_string()),
                ("c".to_string(), "C".to_string()),
            ]
        );
    }

    #[test]
    fn test_missing_entry() {
        let clock = ManualClock::default();
        let cache = cache(&clock);
        assert!(cache.entry(&"nope".to_string()).unwrap().is_none());
    }
}
