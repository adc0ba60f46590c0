//! Path-keyed content cache.
//!
//! The cache mirrors remote paths verbatim underneath a root directory, so the
//! remote file `/data/ab/cd/abcd1234` lives at `<root>/data/ab/cd/abcd1234`.
//! It is the single source of truth for "has this content been downloaded".
//!
//! Writes go through a hidden temporary file in the destination directory that
//! is renamed into place once the data is on disk. A reader checking
//! [`Cache::has`] therefore sees either nothing or the complete file.

use crate::error::{ErrorKind, Result};
use crate::path::Root;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::instrument;

const COPY_BUFFER_SIZE: usize = 64 * 1024;
/// Longest part of the entry name reused in its temporary file name.
const TEMP_STEM_BYTES: usize = 64;

/// Converts a remote path into its cache key by stripping leading slashes.
///
/// ```
/// use hoard_storage::cache_key;
/// use std::path::Path;
///
/// assert_eq!(cache_key("/data/ab/cd/abcd1234"), Path::new("data/ab/cd/abcd1234"));
/// assert_eq!(cache_key("data/file"), Path::new("data/file"));
/// ```
pub fn cache_key(remote_path: &str) -> &Path {
    Path::new(remote_path.trim_start_matches('/'))
}

/// On-disk content store keyed by (relative) remote path.
#[derive(Debug, Clone)]
pub struct Cache {
    root: Root,
}
impl Cache {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { root: Root::new(base) }
    }

    pub fn root(&self) -> &Root {
        &self.root
    }

    /// Location of a cache entry, relative to the working directory if the
    /// cache root is.
    #[track_caller]
    pub fn path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        self.root.join(path)
    }

    /// Absolute location of a cache entry.
    #[track_caller]
    pub fn abs(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        self.root.absolute(path)
    }

    /// Creates a directory (and its ancestors) inside the cache.
    pub async fn ensure_dir(&self, path: impl AsRef<Path>) -> Result<()> {
        self.root.ensure_dir(path).await.map(|_| ())
    }

    /// Returns `true` only if a regular, non-empty file exists for `path`.
    ///
    /// Empty files are leftovers of an interrupted write and count as missing,
    /// as do directories and paths that fail validation.
    ///
    /// # Panics
    /// If `path` is absolute.
    pub async fn has(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let full = match self.root.join(path) {
            Ok(full) => full,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = ?e, "Refusing to look up invalid cache path");
                return false;
            },
        };
        match fs::metadata(&full).await {
            Ok(meta) => meta.is_file() && meta.len() > 0,
            Err(_) => false,
        }
    }

    /// Consumes `data` and stores it at `path`, returning the number of bytes
    /// written.
    ///
    /// An existing entry is replaced atomically. On failure the temporary file
    /// is removed and the final path is left exactly as it was before the call.
    ///
    /// # Panics
    /// If `path` is absolute.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn put<R>(&self, path: impl AsRef<Path>, mut data: R) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        let target = self.root.join(path.as_ref())?;
        let (dir, name) = match (target.parent(), target.file_name()) {
            (Some(dir), Some(name)) => (dir.to_path_buf(), name.to_string_lossy().into_owned()),
            _ => exn::bail!(ErrorKind::InvalidPath(target)),
        };
        fs::create_dir_all(&dir).await.map_err(|e| ErrorKind::from_io(e, &dir))?;

        // The random part and suffix must still fit when `name` is already
        // close to the file name limit.
        let stem = &name[..name.floor_char_boundary(TEMP_STEM_BYTES)];
        // Creating an empty file is cheap enough to do without a blocking task.
        let temp = tempfile::Builder::new()
            .prefix(&format!(".{stem}."))
            .suffix(".part")
            .tempfile_in(&dir)
            .map_err(|e| ErrorKind::from_io(e, &dir))?;
        // From here on, dropping `temp_path` deletes the temporary file. Every
        // early return below relies on that for cleanup.
        let (file, temp_path) = temp.into_parts();
        let mut file = fs::File::from_std(file);

        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut written = 0u64;
        loop {
            let read = data.read(&mut buffer).await.map_err(ErrorKind::Stream)?;
            if read == 0 {
                break;
            }
            file.write_all(&buffer[..read]).await.map_err(|e| ErrorKind::from_io(e, &temp_path))?;
            written += read as u64;
        }
        file.flush().await.map_err(|e| ErrorKind::from_io(e, &temp_path))?;
        file.sync_all().await.map_err(|e| ErrorKind::from_io(e, &temp_path))?;
        drop(file);

        // A failed persist hands the TempPath back inside the error; dropping
        // the error removes the file.
        temp_path.persist(&target).map_err(|e| ErrorKind::from_io(e.error, &target))?;
        tracing::debug!(bytes = written, "Stored cache entry");
        Ok(written)
    }
}
