//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Anything that surfaces from here means the library tree is broken or not
//! writable; callers are expected to stop rather than carry on linking.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A directory inside the library tree could not be created.
    #[display("could not create directory {}", _0.display())]
    Directory(#[error(not(source))] PathBuf),
    /// Creating a symlink failed for a reason other than "already exists".
    #[display("could not create symlink {}", _0.display())]
    Symlink(#[error(not(source))] PathBuf),
    /// The entry's cache location could not be resolved.
    #[display("invalid cache location {_0}")]
    CacheLocation(#[error(not(source))] String),
    /// A path segment the library layout depends on is empty.
    #[display("entry has no {_0}")]
    MissingField(#[error(not(source))] &'static str),
    /// The time-added alias could not be rendered.
    #[display("could not render timestamp")]
    Timestamp,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
