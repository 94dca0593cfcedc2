//! In-Memory Storage Module
//!
//! A process-local storage adapter. Timestamps come from a [`Clock`], which
//! makes recency and expiry fully deterministic under a manual clock.

use std::collections::HashMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{validate_name, BlobInfo, BlobWriter, Directory, Store};
use crate::clock::Clock;

// == Memory Blob ==
#[derive(Debug, Clone)]
struct MemoryBlob {
    data: Vec<u8>,
    last_modified: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
}

type BlobMap = Arc<Mutex<HashMap<String, MemoryBlob>>>;

#[derive(Debug)]
struct StoreShared {
    directories: Mutex<HashMap<String, Arc<MemoryDirectory>>>,
    clock: Clock,
    track_access: bool,
}

// == Memory Store ==
/// An in-memory container of cache directories.
///
/// Clones share the same directories.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<StoreShared>,
}

impl MemoryStore {
    /// Creates an empty store on the system clock without access tracking.
    pub fn new() -> Self {
        Self::with_options(Clock::System, false)
    }

    /// Creates an empty store with the given clock and access tracking mode.
    pub fn with_options(clock: Clock, track_access: bool) -> Self {
        Self {
            shared: Arc::new(StoreShared {
                directories: Mutex::new(HashMap::new()),
                clock,
                track_access,
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn directory(&self, name: &str) -> io::Result<Option<Arc<dyn Directory>>> {
        validate_name(name)?;
        let directories = self.shared.directories.lock();
        Ok(directories
            .get(name)
            .map(|dir| Arc::clone(dir) as Arc<dyn Directory>))
    }

    fn create_directory(&self, name: &str) -> io::Result<Arc<dyn Directory>> {
        validate_name(name)?;
        let mut directories = self.shared.directories.lock();
        let directory = directories.entry(name.to_string()).or_insert_with(|| {
            Arc::new(MemoryDirectory {
                name: name.to_string(),
                blobs: Arc::new(Mutex::new(HashMap::new())),
                clock: self.shared.clock.clone(),
                track_access: self.shared.track_access,
                parent: Some(Arc::downgrade(&self.shared)),
            })
        });
        Ok(Arc::clone(directory) as Arc<dyn Directory>)
    }

    fn delete_directory(&self, name: &str) -> io::Result<()> {
        validate_name(name)?;
        self.shared.directories.lock().remove(name);
        Ok(())
    }
}

// == Memory Directory ==
/// An in-memory cache directory.
#[derive(Debug)]
pub struct MemoryDirectory {
    name: String,
    blobs: BlobMap,
    clock: Clock,
    track_access: bool,
    parent: Option<Weak<StoreShared>>,
}

impl MemoryDirectory {
    /// Creates a directory that belongs to no store.
    ///
    /// Such a directory cannot be replaced, so clearing a cache built on it
    /// fails with a structural error.
    pub fn detached(name: impl Into<String>, clock: Clock, track_access: bool) -> Self {
        Self {
            name: name.into(),
            blobs: Arc::new(Mutex::new(HashMap::new())),
            clock,
            track_access,
            parent: None,
        }
    }

    /// Overwrites a blob's raw bytes, bypassing any codec.
    pub fn write_raw(&self, name: &str, data: &[u8]) -> io::Result<()> {
        validate_name(name)?;
        let now = self.clock.now();
        self.blobs.lock().insert(
            name.to_string(),
            MemoryBlob {
                data: data.to_vec(),
                last_modified: now,
                last_accessed: now,
            },
        );
        Ok(())
    }

    /// Forces a blob's last-modified timestamp.
    pub fn set_last_modified(&self, name: &str, at: DateTime<Utc>) -> bool {
        self.blobs
            .lock()
            .get_mut(name)
            .map(|blob| blob.last_modified = at)
            .is_some()
    }

    /// Forces a blob's last-accessed timestamp.
    pub fn set_last_accessed(&self, name: &str, at: DateTime<Utc>) -> bool {
        self.blobs
            .lock()
            .get_mut(name)
            .map(|blob| blob.last_accessed = at)
            .is_some()
    }

    fn info(&self, name: &str, blob: &MemoryBlob) -> BlobInfo {
        let info = BlobInfo::new(name, blob.data.len() as u64).with_last_modified(blob.last_modified);
        if self.track_access {
            info.with_last_accessed(blob.last_accessed)
        } else {
            info
        }
    }
}

impl Directory for MemoryDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn child(&self, name: &str) -> io::Result<Option<BlobInfo>> {
        let blobs = self.blobs.lock();
        Ok(blobs.get(name).map(|blob| self.info(name, blob)))
    }

    fn create(&self, name: &str, _content_type: &str) -> io::Result<BlobInfo> {
        self.write_raw(name, &[])?;
        let blobs = self.blobs.lock();
        let blob = blobs
            .get(name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))?;
        Ok(self.info(name, blob))
    }

    fn delete(&self, name: &str) -> io::Result<()> {
        self.blobs.lock().remove(name);
        Ok(())
    }

    fn children(&self) -> io::Result<Vec<BlobInfo>> {
        let blobs = self.blobs.lock();
        Ok(blobs
            .iter()
            .map(|(name, blob)| self.info(name, blob))
            .collect())
    }

    fn open_read(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        let mut blobs = self.blobs.lock();
        let blob = blobs
            .get_mut(name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))?;
        if self.track_access {
            blob.last_accessed = self.clock.now();
        }
        Ok(Box::new(Cursor::new(blob.data.clone())))
    }

    fn open_write(&self, name: &str) -> io::Result<Box<dyn BlobWriter>> {
        validate_name(name)?;
        Ok(Box::new(MemoryBlobWriter {
            name: name.to_string(),
            buffer: Vec::new(),
            blobs: Arc::clone(&self.blobs),
            clock: self.clock.clone(),
        }))
    }

    fn parent(&self) -> Option<Arc<dyn Store>> {
        let shared = self.parent.as_ref()?.upgrade()?;
        Some(Arc::new(MemoryStore { shared }))
    }
}

// == Memory Blob Writer ==
struct MemoryBlobWriter {
    name: String,
    buffer: Vec<u8>,
    blobs: BlobMap,
    clock: Clock,
}

impl Write for MemoryBlobWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BlobWriter for MemoryBlobWriter {
    fn commit(self: Box<Self>) -> io::Result<()> {
        let MemoryBlobWriter {
            name,
            buffer,
            blobs,
            clock,
        } = *self;
        let now = clock.now();
        blobs.lock().insert(
            name,
            MemoryBlob {
                data: buffer,
                last_modified: now,
                last_accessed: now,
            },
        );
        Ok(())
    }
}
