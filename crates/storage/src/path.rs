//! Path validation and root confinement.
//!
//! Every path handed to the cache or the library is relative to a root
//! directory. Paths derived from remote data must never be able to climb out of
//! that root, so they are normalized here before being joined.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a root-relative path for security and correctness.
/// Ensures that paths don't escape the root (no `..` traversal).
///
/// A leading `/` is ignored, so remote paths such as `/data/ab/cd/abcd1234`
/// validate to `data/ab/cd/abcd1234`.
///
/// > **Note:** This does **not** normalize backslashes, non-UTF8 bytes, or
/// >           platform-specific weirdness. Null bytes are explicitly rejected.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use hoard_storage::validate_path;
/// // Valid paths
/// assert!(validate_path("data/ab/cd/abcd1234").is_ok());
/// assert!(validate_path("data/../abcd1234").is_ok()); // (never leaves the root)
/// // Invalid paths
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("data/../../b").is_err());
/// assert!(validate_path("a\0b").is_err());
/// // Paths get resolved
/// assert_eq!(
///     validate_path("wrong/../data/./ab//abcd1234/").unwrap(),
///     Path::new("data/ab/abcd1234")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls, reject them explicitly.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

/// A directory that relative paths are resolved against.
///
/// Both the cache and the library are rooted trees; this type is the single
/// place where a relative path becomes a real filesystem location. The base
/// itself may be relative (to the working directory) or absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Root {
    base: PathBuf,
}
impl Root {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Joins a root-relative path onto the base directory.
    ///
    /// # Panics
    /// Passing an absolute path is a programming error, not a runtime
    /// condition: callers must strip remote prefixes before getting here.
    #[track_caller]
    pub fn join(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        assert!(!path.has_root(), "path cannot be an absolute path: {}", path.display());
        Ok(self.base.join(validate(path)?))
    }

    /// Same as [`join`](Self::join), but anchored to the current working
    /// directory when the base is relative. Used for symlink targets, which
    /// must not depend on where the link itself lives.
    #[track_caller]
    pub fn absolute(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let joined = self.join(path)?;
        Ok(std::path::absolute(&joined).map_err(|e| ErrorKind::from_io(e, &joined))?)
    }

    /// Creates `path` (relative to the root) and all of its missing ancestors.
    ///
    /// Idempotent, and safe to race against other callers creating the same
    /// directories.
    pub async fn ensure_dir(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = self.join(path)?;
        tokio::fs::create_dir_all(&dir).await.map_err(|e| ErrorKind::from_io(e, &dir))?;
        Ok(dir)
    }
}
