//! Storage Module
//!
//! The narrow capability surface the cache engine needs from its backing
//! storage: a flat directory of named blobs, and a parent store able to
//! create and delete whole directories.

mod fs;
mod memory;

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

use chrono::{DateTime, Utc};

pub use fs::{FsDirectory, FsStore};
pub use memory::{MemoryDirectory, MemoryStore};

// == Content Types ==
/// Content type used for cache blobs.
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";

// == Blob Info ==
/// Metadata snapshot of one stored blob.
///
/// The timestamp facets are optional: a backend that does not track access
/// (or modification) reports `None` and the engine falls back accordingly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobInfo {
    /// Blob name within its directory
    pub name: String,
    /// Payload size in bytes
    pub size: u64,
    /// Last modification time, if tracked
    pub last_modified: Option<DateTime<Utc>>,
    /// Last access time, if tracked
    pub last_accessed: Option<DateTime<Utc>>,
}

impl BlobInfo {
    /// Creates a snapshot without timestamp facets.
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            last_modified: None,
            last_accessed: None,
        }
    }

    /// Adds a last-modified facet.
    pub fn with_last_modified(mut self, at: DateTime<Utc>) -> Self {
        self.last_modified = Some(at);
        self
    }

    /// Adds a last-accessed facet.
    pub fn with_last_accessed(mut self, at: DateTime<Utc>) -> Self {
        self.last_accessed = Some(at);
        self
    }
}

// == Blob Writer ==
/// Sink for a blob's new content.
///
/// Bytes written are not visible to readers until [`BlobWriter::commit`]
/// succeeds. Dropping the writer without committing leaves the previous
/// content in place.
pub trait BlobWriter: Write + Send {
    /// Publishes the written bytes as the blob's full content.
    fn commit(self: Box<Self>) -> io::Result<()>;
}

// == Directory ==
/// One cache directory: a flat set of named blobs.
pub trait Directory: Send + Sync + fmt::Debug {
    /// Name of this directory within its parent.
    fn name(&self) -> &str;

    /// Returns the metadata of a child blob, or `None` if absent.
    fn child(&self, name: &str) -> io::Result<Option<BlobInfo>>;

    /// Creates an empty child blob.
    fn create(&self, name: &str, content_type: &str) -> io::Result<BlobInfo>;

    /// Deletes a child blob. Deleting an absent blob is not an error.
    fn delete(&self, name: &str) -> io::Result<()>;

    /// Enumerates all child blobs, in no particular order.
    fn children(&self) -> io::Result<Vec<BlobInfo>>;

    /// Opens a child blob for reading.
    fn open_read(&self, name: &str) -> io::Result<Box<dyn Read + Send>>;

    /// Opens a child blob for full replacement of its content.
    fn open_write(&self, name: &str) -> io::Result<Box<dyn BlobWriter>>;

    /// The store this directory lives in, if it can be manipulated.
    fn parent(&self) -> Option<Arc<dyn Store>>;
}

// == Store ==
/// A container of cache directories.
pub trait Store: Send + Sync + fmt::Debug {
    /// Returns the named directory, or `None` if it does not exist.
    fn directory(&self, name: &str) -> io::Result<Option<Arc<dyn Directory>>>;

    /// Creates (or opens) the named directory.
    fn create_directory(&self, name: &str) -> io::Result<Arc<dyn Directory>>;

    /// Deletes the named directory with all of its blobs.
    fn delete_directory(&self, name: &str) -> io::Result<()>;

    /// Returns the named directory, creating it when missing.
    fn open_or_create(&self, name: &str) -> io::Result<Arc<dyn Directory>> {
        match self.directory(name)? {
            Some(directory) => Ok(directory),
            None => self.create_directory(name),
        }
    }
}

// == Name Validation ==
/// Rejects names that would escape a flat directory.
pub(crate) fn validate_name(name: &str) -> io::Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid storage name: '{}'", name),
        ));
    }
    Ok(())
}
