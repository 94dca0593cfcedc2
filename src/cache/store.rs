//! Cache Store Module
//!
//! The cache engine: maps keys to blobs in one storage directory and owns
//! the eviction and staleness policies.
//!
//! Total size is recomputed from a directory listing whenever it is needed;
//! no in-memory index is kept, so the storage is the single source of truth
//! and a restarted process picks up where the last one left off.

use std::fmt;
use std::io;
use std::sync::Arc;

use chrono::{Duration, SecondsFormat};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::builder::BlobCacheBuilder;
use super::entry::CacheEntry;
use super::lru;
use super::{CacheStats, Refresher, TimeoutPolicy};
use crate::clock::Clock;
use crate::codec::{
    accounted_size, blob_name, decode_key, encode_key, encoded_key_of, read_value, write_value,
    DataSerializer, DEFAULT_EXTENSION,
};
use crate::error::{CacheError, Result};
use crate::storage::{BlobInfo, Directory, CONTENT_TYPE_OCTET_STREAM};

// == Cache Settings ==
/// Limits and options of one cache engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Maximum accounted size of one entry in bytes, 0 = unlimited
    pub max_entry_size: u64,
    /// Maximum accounted size of the whole cache in bytes, 0 = unlimited
    pub max_total_size: u64,
    /// Entries unused for this long are pruned even under the size cap
    pub prune_idle_timeout: Option<Duration>,
    /// Blob name extension
    pub extension: String,
    /// Hash entry metadata instead of payload bytes in [`BlobCache::hash`]
    pub hash_metadata: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entry_size: 0,
            max_total_size: 0,
            prune_idle_timeout: None,
            extension: DEFAULT_EXTENSION.to_string(),
            hash_metadata: true,
        }
    }
}

enum Lookup<V> {
    Missing,
    Stale,
    Fresh(V),
}

// == Blob Cache ==
/// A size-bounded cache persisting each entry as one blob.
///
/// Mutations (`put`, `clear_key`, `clear`, `prune`, `refresh`) are mutually
/// exclusive through one engine-wide lock. Plain reads share that lock and
/// only upgrade to exclusive access when they need to refresh or delete.
pub struct BlobCache<K, V> {
    directory: RwLock<Arc<dyn Directory>>,
    settings: CacheSettings,
    key_serializer: Arc<dyn DataSerializer<K>>,
    value_serializer: Arc<dyn DataSerializer<V>>,
    refresher: Option<Arc<dyn Refresher<K, V>>>,
    timeout: Option<Arc<dyn TimeoutPolicy>>,
    clock: Clock,
    stats: Mutex<CacheStats>,
}

impl<K, V> BlobCache<K, V> {
    // == Constructor ==
    /// Starts configuring a cache stored in `directory`.
    pub fn builder(directory: Arc<dyn Directory>) -> BlobCacheBuilder<K, V> {
        BlobCacheBuilder::new(directory)
    }

    pub(crate) fn from_parts(
        directory: Arc<dyn Directory>,
        settings: CacheSettings,
        key_serializer: Arc<dyn DataSerializer<K>>,
        value_serializer: Arc<dyn DataSerializer<V>>,
        refresher: Option<Arc<dyn Refresher<K, V>>>,
        timeout: Option<Arc<dyn TimeoutPolicy>>,
        clock: Clock,
    ) -> Self {
        Self {
            directory: RwLock::new(directory),
            settings,
            key_serializer,
            value_serializer,
            refresher,
            timeout,
            clock,
            stats: Mutex::new(CacheStats::new()),
        }
    }

    // == Accessors ==
    /// Name of the backing directory.
    pub fn name(&self) -> String {
        self.directory.read().name().to_string()
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn max_entry_size(&self) -> u64 {
        self.settings.max_entry_size
    }

    pub fn max_total_size(&self) -> u64 {
        self.settings.max_total_size
    }

    // == Put ==
    /// Stores `value` under `key`, replacing any previous entry.
    ///
    /// # Returns
    /// - `Ok(true)` if the entry was stored (and the cache pruned)
    /// - `Ok(false)` if it could not be stored; no partial blob remains
    ///
    /// # Errors
    /// Key serialization failures and storage errors outside the value
    /// write itself.
    pub fn put(&self, key: &K, value: &V) -> Result<bool> {
        let encoded = match self.encode(key) {
            Ok(encoded) => encoded,
            Err(err) if err.is_too_large() => {
                warn!(error = %err, "Key does not fit in a cache entry");
                self.stats.lock().record_rejected();
                return Ok(false);
            }
            Err(err) => return Err(err),
        };
        let directory = self.directory.write();
        self.put_encoded(directory.as_ref(), &encoded, value)
    }

    // == Get ==
    /// Returns the cached value for `key`, if present and usable.
    ///
    /// Stale entries are refreshed when a refresher is configured and
    /// evicted otherwise. Unreadable entries are deleted.
    ///
    /// # Errors
    /// Only if the key itself cannot be serialized.
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        match self.encode(key) {
            Ok(encoded) => Ok(self.get_encoded(&encoded)),
            Err(err) if err.is_too_large() => {
                self.stats.lock().record_miss();
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    // == Clear Key ==
    /// Deletes the entry for `key`; a missing entry is not an error.
    pub fn clear_key(&self, key: &K) -> Result<()> {
        let encoded = match self.encode(key) {
            Ok(encoded) => encoded,
            Err(err) if err.is_too_large() => return Ok(()),
            Err(err) => return Err(err),
        };
        let name = self.blob_name(&encoded);
        let directory = self.directory.write();
        if directory.child(&name)?.is_some() {
            directory.delete(&name)?;
            debug!(blob = %name, "Cleared cache entry");
        }
        Ok(())
    }

    // == Clear ==
    /// Discards every entry by replacing the backing directory.
    ///
    /// # Errors
    /// `CacheError::ParentNotManageable` if the directory has no parent store.
    /// I/O errors if the directory cannot be deleted or recreated.
    pub fn clear(&self) -> Result<()> {
        let mut directory = self.directory.write();
        let name = directory.name().to_string();
        let parent = directory
            .parent()
            .ok_or_else(|| CacheError::ParentNotManageable(name.clone()))?;
        parent.delete_directory(&name)?;
        // the old handle points at a deleted directory from here on
        let fresh = parent.create_directory(&name).or_else(|err| {
            warn!(cache = %name, error = %err, "Could not recreate cache directory, retrying");
            parent.create_directory(&name)
        });
        match fresh {
            Ok(fresh) => *directory = fresh,
            Err(err) => {
                error!(cache = %name, error = %err, "Cache directory was deleted but not recreated");
                return Err(err.into());
            }
        }
        info!(cache = %name, "Cleared cache");
        Ok(())
    }

    // == Prune ==
    /// Evicts least recently used entries until the cache fits its size cap.
    ///
    /// With an idle timeout configured, entries unused for that long are
    /// evicted as well.
    ///
    /// # Returns
    /// The number of entries removed.
    pub fn prune(&self) -> Result<usize> {
        let directory = self.directory.write();
        self.prune_locked(directory.as_ref())
    }

    // == Refresh ==
    /// Re-populates every entry through the refresher.
    ///
    /// Entries whose key cannot be reconstructed are skipped. Without a
    /// refresher this is a no-op.
    ///
    /// # Returns
    /// The number of entries refreshed.
    pub fn refresh(&self) -> Result<usize> {
        if self.refresher.is_none() {
            return Ok(0);
        }
        let directory = self.directory.write();
        let mut refreshed = 0;
        for blob in self.blobs(directory.as_ref())? {
            // an earlier refresh may have pruned this one
            if directory.child(&blob.name)?.is_none() {
                continue;
            }
            let Ok(encoded) = encoded_key_of(&blob.name) else {
                continue;
            };
            if self.refresh_blob(directory.as_ref(), encoded)? {
                refreshed += 1;
            }
        }
        debug!(refreshed, "Refresh sweep finished");
        Ok(refreshed)
    }

    /// Refreshes the entry for one key, if it is stored.
    pub fn refresh_key(&self, key: &K) -> Result<bool> {
        let encoded = match self.encode(key) {
            Ok(encoded) => encoded,
            Err(err) if err.is_too_large() => return Ok(false),
            Err(err) => return Err(err),
        };
        let directory = self.directory.write();
        if directory.child(&self.blob_name(&encoded))?.is_none() {
            return Ok(false);
        }
        self.refresh_blob(directory.as_ref(), &encoded)
    }

    // == Hash ==
    /// Fingerprint of the entry for `key`, for external change detection.
    ///
    /// By default this hashes the entry's last-modified time and accounted
    /// size (encoded key plus payload), which
    /// assumes the metadata changes whenever the value does. With
    /// `hash_metadata` disabled the stored payload itself is hashed.
    ///
    /// # Returns
    /// An MD5 hex digest, or `None` if the entry does not exist or has no
    /// modification time.
    pub fn hash(&self, key: &K) -> Result<Option<String>> {
        let encoded = match self.encode(key) {
            Ok(encoded) => encoded,
            Err(err) if err.is_too_large() => return Ok(None),
            Err(err) => return Err(err),
        };
        let name = self.blob_name(&encoded);
        let directory = self.directory.read();
        let Some(info) = directory.child(&name)? else {
            return Ok(None);
        };

        if self.settings.hash_metadata {
            let Some(last_modified) = info.last_modified else {
                return Ok(None);
            };
            let stamp = format!(
                "{}-{}",
                last_modified.to_rfc3339_opts(SecondsFormat::Nanos, true),
                accounted_size(&info.name, info.size)
            );
            Ok(Some(format!("{:x}", md5::compute(stamp.as_bytes()))))
        } else {
            let mut context = md5::Context::new();
            let mut reader = directory.open_read(&name)?;
            io::copy(&mut reader, &mut context)?;
            Ok(Some(format!("{:x}", context.compute())))
        }
    }

    // == Enumeration ==
    /// Views of all stored entries.
    pub fn entries(&self) -> Result<Vec<CacheEntry<'_, K, V>>> {
        let directory = self.directory.read();
        Ok(self
            .blobs(directory.as_ref())?
            .into_iter()
            .map(|info| CacheEntry::new(self, info))
            .collect())
    }

    /// View of the entry for `key`, if stored.
    pub fn entry(&self, key: &K) -> Result<Option<CacheEntry<'_, K, V>>> {
        let encoded = match self.encode(key) {
            Ok(encoded) => encoded,
            Err(err) if err.is_too_large() => return Ok(None),
            Err(err) => return Err(err),
        };
        Ok(self
            .stat(&self.blob_name(&encoded))?
            .map(|info| CacheEntry::new(self, info)))
    }

    /// Current accounted size: encoded key lengths plus payload sizes.
    pub fn current_size(&self) -> Result<u64> {
        let directory = self.directory.read();
        Ok(self
            .blobs(directory.as_ref())?
            .iter()
            .map(|blob| accounted_size(&blob.name, blob.size))
            .sum())
    }

    // == Stats ==
    /// Counters plus the current entry count and size.
    pub fn stats(&self) -> Result<CacheStats> {
        let blobs = {
            let directory = self.directory.read();
            self.blobs(directory.as_ref())?
        };
        let total_size = blobs
            .iter()
            .map(|blob| accounted_size(&blob.name, blob.size))
            .sum();
        Ok(self.stats.lock().clone().with_contents(blobs.len(), total_size))
    }

    // == Internals ==
    fn blob_name(&self, encoded: &str) -> String {
        blob_name(encoded, &self.settings.extension)
    }

    fn encode(&self, key: &K) -> Result<String> {
        let encoded = encode_key(self.key_serializer.as_ref(), key)?;
        let max = self.settings.max_entry_size;
        if max > 0 && encoded.len() as u64 > max {
            return Err(CacheError::EntryTooLarge { limit: max });
        }
        Ok(encoded)
    }

    pub(crate) fn decode_key(&self, encoded: &str) -> Result<K> {
        decode_key(self.key_serializer.as_ref(), encoded)
    }

    pub(crate) fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    pub(crate) fn stat(&self, name: &str) -> Result<Option<BlobInfo>> {
        Ok(self.directory.read().child(name)?)
    }

    /// Decodes a stored value without any staleness handling.
    pub(crate) fn read_blob(&self, name: &str) -> Result<V> {
        let directory = self.directory.read();
        read_value(self.value_serializer.as_ref(), directory.open_read(name)?)
    }

    /// Children carrying this cache's extension.
    fn blobs(&self, directory: &dyn Directory) -> Result<Vec<BlobInfo>> {
        let suffix = format!(".{}", self.settings.extension);
        Ok(directory
            .children()?
            .into_iter()
            .filter(|blob| blob.name.ends_with(&suffix))
            .collect())
    }

    fn is_stale(&self, info: &BlobInfo) -> bool {
        self.timeout
            .as_ref()
            .is_some_and(|policy| policy.is_timed_out(info, self.clock.now()))
    }

    /// Read path for an already encoded key.
    fn get_encoded(&self, encoded: &str) -> Option<V> {
        let name = self.blob_name(encoded);
        let lookup = {
            let directory = self.directory.read();
            self.lookup(directory.as_ref(), &name)
        };

        let value = match lookup {
            Ok(Lookup::Missing) => None,
            Ok(Lookup::Fresh(value)) => Some(value),
            Ok(Lookup::Stale) => {
                let directory = self.directory.write();
                match self.revalidate(directory.as_ref(), encoded, &name) {
                    Ok(value) => value,
                    Err(err) => {
                        self.discard(directory.as_ref(), &name, &err);
                        None
                    }
                }
            }
            Err(err) => {
                let directory = self.directory.write();
                self.discard(directory.as_ref(), &name, &err);
                None
            }
        };

        let mut stats = self.stats.lock();
        if value.is_some() {
            stats.record_hit();
        } else {
            stats.record_miss();
        }
        value
    }

    fn lookup(&self, directory: &dyn Directory, name: &str) -> Result<Lookup<V>> {
        // an absent blob may also be one still being written; best effort
        let Some(info) = directory.child(name)? else {
            return Ok(Lookup::Missing);
        };
        if self.is_stale(&info) {
            return Ok(Lookup::Stale);
        }
        let value = read_value(self.value_serializer.as_ref(), directory.open_read(name)?)?;
        Ok(Lookup::Fresh(value))
    }

    /// Exclusive-lock half of a stale read: re-check, then refresh or evict.
    fn revalidate(&self, directory: &dyn Directory, encoded: &str, name: &str) -> Result<Option<V>> {
        let Some(info) = directory.child(name)? else {
            return Ok(None);
        };
        if self.is_stale(&info) && !self.refresh_blob(directory, encoded)? {
            directory.delete(name)?;
            self.stats.lock().record_evictions(1);
            debug!(blob = %name, "Evicted stale cache entry");
            return Ok(None);
        }
        let value = read_value(self.value_serializer.as_ref(), directory.open_read(name)?)?;
        Ok(Some(value))
    }

    /// Deletes an entry that could not be read.
    fn discard(&self, directory: &dyn Directory, name: &str, cause: &CacheError) {
        warn!(blob = %name, error = %cause, "Could not retrieve cache entry, deleting it");
        if let Err(err) = directory.delete(name) {
            error!(blob = %name, error = %err, "Could not delete unreadable cache entry");
        }
    }

    fn put_encoded(&self, directory: &dyn Directory, encoded: &str, value: &V) -> Result<bool> {
        let name = self.blob_name(encoded);
        if directory.child(&name)?.is_none() {
            directory.create(&name, CONTENT_TYPE_OCTET_STREAM)?;
        }

        if let Err(err) = self.write_blob(directory, &name, encoded, value) {
            // never keep a truncated or corrupt entry
            warn!(blob = %name, error = %err, "Could not store cache entry");
            directory.delete(&name)?;
            self.stats.lock().record_rejected();
            return Ok(false);
        }

        self.prune_locked(directory)?;
        Ok(true)
    }

    fn write_blob(&self, directory: &dyn Directory, name: &str, encoded: &str, value: &V) -> Result<u64> {
        let limit = match self.settings.max_entry_size {
            0 => None,
            max => Some(max.saturating_sub(encoded.len() as u64)),
        };
        let mut writer = directory.open_write(name)?;
        let written = write_value(self.value_serializer.as_ref(), value, &mut writer, limit)?;
        writer.commit()?;
        Ok(written)
    }

    /// Runs the refresher for one stored entry and stores its result.
    fn refresh_blob(&self, directory: &dyn Directory, encoded: &str) -> Result<bool> {
        let Some(refresher) = &self.refresher else {
            return Ok(false);
        };
        let key = match self.decode_key(encoded) {
            Ok(key) => key,
            Err(err) => {
                debug!(error = %err, "Key can not be reconstructed, skipping refresh");
                return Ok(false);
            }
        };

        match refresher.refresh(&key) {
            Ok(Some(value)) => {
                let stored = self.put_encoded(directory, encoded, &value)?;
                if stored {
                    self.stats.lock().record_refresh();
                }
                Ok(stored)
            }
            Ok(None) => Ok(false),
            Err(err) => {
                warn!(error = %err, "Refresher failed");
                Ok(false)
            }
        }
    }

    fn prune_locked(&self, directory: &dyn Directory) -> Result<usize> {
        let max = self.settings.max_total_size;
        let idle = self.settings.prune_idle_timeout;
        let over_capacity = |total: u64| max > 0 && total > max;

        let blobs = self.blobs(directory)?;
        let mut total: u64 = blobs
            .iter()
            .map(|blob| accounted_size(&blob.name, blob.size))
            .sum();
        if !over_capacity(total) && idle.is_none() {
            return Ok(0);
        }

        let now = self.clock.now();
        let mut removed = 0;
        for blob in lru::oldest_first(blobs) {
            let expired = idle.is_some_and(|idle| {
                lru::last_used(&blob).is_some_and(|used| now.signed_duration_since(used) >= idle)
            });
            // everything after this one is more recently used
            if !over_capacity(total) && !expired {
                break;
            }
            directory.delete(&blob.name)?;
            total = total.saturating_sub(accounted_size(&blob.name, blob.size));
            removed += 1;
        }

        if removed > 0 {
            self.stats.lock().record_evictions(removed);
            info!(removed, total_size = total, "Pruned cache entries");
        }
        Ok(removed)
    }
}

impl<K, V> fmt::Debug for BlobCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobCache")
            .field("directory", &self.directory.read().name())
            .field("settings", &self.settings)
            .field("refresher", &self.refresher.is_some())
            .field("timeout", &self.timeout.is_some())
            .finish()
    }
}
