//! API Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// An API error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for API operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// The core treats every one of these as a single opaque failure for the
/// request that produced it; the distinction only matters for retries and logs.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection, TLS or body transfer failed.
    #[display("transport error")]
    Transport,
    /// The server answered with something other than `200 OK`.
    #[display("unexpected HTTP status: {_0}")]
    Status(#[error(not(source))] u16),
    /// The response body was not the JSON shape we expected.
    #[display("could not decode response")]
    Decode,
    /// The domain or path could not be turned into a URL.
    #[display("invalid URL: {_0}")]
    InvalidUrl(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport => true,
            Self::Status(status) => *status == 429 || (500..600).contains(status),
            Self::Decode | Self::InvalidUrl(_) => false,
        }
    }
}
