//! Sync Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use crate::model::Role;
use derive_more::{Display, Error};

/// A sync error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Fetch-stage kinds ([`Transport`](Self::Transport),
/// [`CacheWrite`](Self::CacheWrite), [`Abandoned`](Self::Abandoned)) cost one
/// file and the run carries on. Anything else ends the run.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The remote could not list or return posts.
    #[display("could not retrieve posts")]
    Remote,
    /// The remote could not produce the file's contents.
    #[display("could not download file")]
    Transport,
    /// Downloaded data could not be stored in the cache.
    #[display("could not write cache entry")]
    CacheWrite,
    /// The worker handling a fetch went away without reporting back.
    #[display("fetch was abandoned")]
    Abandoned,
    /// The fetcher no longer accepts jobs.
    #[display("fetcher is closed")]
    Closed,
    /// Wraps a failure with the position of the file inside its post.
    #[display("{_0}")]
    File(#[error(not(source))] Role),
    /// The library could not be updated.
    #[display("could not link file")]
    Link,
    /// Linking stopped after an earlier error; no more files are accepted.
    #[display("linker has stopped")]
    LinkerStopped,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport | Self::CacheWrite | Self::Abandoned)
    }
}
