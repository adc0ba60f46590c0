//! Remote collaborator for hoard.
//!
//! Everything that talks to the content API lives behind the [`Remote`] trait:
//! listing a creator's posts, fetching a single post, and opening a byte stream
//! for a data file. Retries, timeouts and TLS belong to implementations of the
//! trait; callers see a single error per call.

pub mod error;
mod http;
#[cfg(feature = "mock")]
mod mock;
mod models;

pub use crate::http::{HttpClient, HttpOptions};
#[cfg(feature = "mock")]
pub use crate::mock::MockRemote;
pub use crate::models::{Creator, Post, RemoteFile, parse_added};
use crate::error::Result;
use async_trait::async_trait;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncRead;

/// Raw file contents, streamed.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send + 'static>>;
pub type RemoteHandle = Arc<dyn Remote + Send + Sync>;

/// The content API, as far as the sync pipeline is concerned.
///
/// # Examples
///
/// ```
/// use hoard_api::{Creator, Remote, error::Result};
///
/// async fn count_files(remote: &dyn Remote, creator: &Creator) -> Result<usize> {
///     let posts = remote.creator_posts(creator).await?;
///     Ok(posts.iter().map(|post| post.file.iter().count() + post.attachments.len()).sum())
/// }
/// ```
#[async_trait]
pub trait Remote: Send + Sync {
    /// Lists every post the creator has published.
    async fn creator_posts(&self, creator: &Creator) -> Result<Vec<Post>>;

    /// Fetches a single post by ID.
    async fn post(&self, creator: &Creator, id: &str) -> Result<Post>;

    /// Opens a stream of the file stored at `path` on `domain`.
    ///
    /// Errors that happen before the first byte are returned here; errors
    /// part-way through the body surface as I/O errors from the stream.
    async fn file_stream(&self, domain: &str, path: &str) -> Result<ByteStream>;
}
