//! Filesystem Storage Module
//!
//! Maps a cache directory onto a real directory. Blob content is written to a
//! temp file next to the target and renamed over it on commit.

use std::fs::{self, File, Metadata};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::{validate_name, BlobInfo, BlobWriter, Directory, Store};

/// Prefix of in-flight temp files; such files are never listed as blobs.
const TMP_PREFIX: &str = ".tmp-";

/// Temp files untouched for this long were left behind by a crashed writer.
const STALE_TMP_AGE: Duration = Duration::from_secs(60 * 60);

// == Filesystem Store ==
/// A root directory holding one subdirectory per cache.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    track_access: bool,
}

impl FsStore {
    /// Creates a store rooted at `root`. The root is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            track_access: false,
        }
    }

    /// Reports file access times as the blobs' last-accessed facet.
    ///
    /// Only meaningful on filesystems that maintain atime.
    pub fn with_access_tracking(mut self, track_access: bool) -> Self {
        self.track_access = track_access;
        self
    }

    /// Root path of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn open_directory(&self, name: &str) -> FsDirectory {
        FsDirectory {
            path: self.root.join(name),
            name: name.to_string(),
            parent: Some(Arc::new(self.clone())),
            track_access: self.track_access,
        }
    }
}

impl Store for FsStore {
    fn directory(&self, name: &str) -> io::Result<Option<Arc<dyn Directory>>> {
        validate_name(name)?;
        if self.root.join(name).is_dir() {
            Ok(Some(Arc::new(self.open_directory(name))))
        } else {
            Ok(None)
        }
    }

    fn create_directory(&self, name: &str) -> io::Result<Arc<dyn Directory>> {
        validate_name(name)?;
        fs::create_dir_all(self.root.join(name))?;
        debug!(root = %self.root.display(), name, "Created cache directory");
        Ok(Arc::new(self.open_directory(name)))
    }

    fn delete_directory(&self, name: &str) -> io::Result<()> {
        validate_name(name)?;
        match fs::remove_dir_all(self.root.join(name)) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }
}

// == Filesystem Directory ==
/// A cache directory backed by a real directory.
#[derive(Debug, Clone)]
pub struct FsDirectory {
    path: PathBuf,
    name: String,
    parent: Option<Arc<FsStore>>,
    track_access: bool,
}

impl FsDirectory {
    /// Opens (creating if needed) the directory at `path`.
    ///
    /// The containing directory becomes its parent store, so `clear()` can
    /// replace it.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("not a named directory: {}", path.display()),
                )
            })?;
        fs::create_dir_all(&path)?;
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| Arc::new(FsStore::new(p)));

        Ok(Self {
            path,
            name,
            parent,
            track_access: false,
        })
    }

    /// See [`FsStore::with_access_tracking`].
    pub fn with_access_tracking(mut self, track_access: bool) -> Self {
        self.track_access = track_access;
        if let Some(parent) = self.parent.take() {
            let parent = FsStore::clone(&parent).with_access_tracking(track_access);
            self.parent = Some(Arc::new(parent));
        }
        self
    }

    /// Path of this directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes a temp file if no writer has touched it for a long time.
    fn sweep_temp_file(&self, name: &str, meta: &Metadata) {
        let abandoned = meta
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age >= STALE_TMP_AGE);
        if !abandoned {
            return;
        }
        match fs::remove_file(self.path.join(name)) {
            Ok(()) => debug!(file = name, "Removed abandoned temp file"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(file = name, error = %err, "Could not remove abandoned temp file"),
        }
    }

    fn blob_info(&self, name: &str, meta: &Metadata) -> BlobInfo {
        BlobInfo {
            name: name.to_string(),
            size: meta.len(),
            last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
            last_accessed: if self.track_access {
                meta.accessed().ok().map(DateTime::<Utc>::from)
            } else {
                None
            },
        }
    }
}

impl Directory for FsDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn child(&self, name: &str) -> io::Result<Option<BlobInfo>> {
        validate_name(name)?;
        match fs::metadata(self.path.join(name)) {
            Ok(meta) if meta.is_file() => Ok(Some(self.blob_info(name, &meta))),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn create(&self, name: &str, _content_type: &str) -> io::Result<BlobInfo> {
        validate_name(name)?;
        let file = File::create(self.path.join(name))?;
        let meta = file.metadata()?;
        Ok(self.blob_info(name, &meta))
    }

    fn delete(&self, name: &str) -> io::Result<()> {
        validate_name(name)?;
        match fs::remove_file(self.path.join(name)) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }

    fn children(&self) -> io::Result<Vec<BlobInfo>> {
        let mut blobs = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            // files can vanish between listing and stat
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err),
            };
            if name.starts_with(TMP_PREFIX) {
                self.sweep_temp_file(&name, &meta);
                continue;
            }
            if meta.is_file() {
                blobs.push(self.blob_info(&name, &meta));
            }
        }
        Ok(blobs)
    }

    fn open_read(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        validate_name(name)?;
        let file = File::open(self.path.join(name))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn open_write(&self, name: &str) -> io::Result<Box<dyn BlobWriter>> {
        validate_name(name)?;
        let file = tempfile::Builder::new()
            .prefix(TMP_PREFIX)
            .tempfile_in(&self.path)?;
        Ok(Box::new(FsBlobWriter {
            file,
            target: self.path.join(name),
        }))
    }

    fn parent(&self) -> Option<Arc<dyn Store>> {
        self.parent.clone().map(|parent| parent as Arc<dyn Store>)
    }
}

// == Filesystem Blob Writer ==
struct FsBlobWriter {
    file: NamedTempFile,
    target: PathBuf,
}

impl Write for FsBlobWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl BlobWriter for FsBlobWriter {
    fn commit(mut self: Box<Self>) -> io::Result<()> {
        self.file.flush()?;
        let FsBlobWriter { file, target } = *self;
        file.persist(&target).map_err(|err| err.error)?;
        Ok(())
    }
}
