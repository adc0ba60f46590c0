//! In-memory remote for testing.

use crate::error::{ErrorKind, Result};
use crate::{ByteStream, Creator, Post, Remote};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{self, Cursor};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::io::StreamReader;

#[derive(Clone)]
enum MockFile {
    Data(Vec<u8>),
    /// Fails before any data is returned (e.g. DNS or TLS failure).
    Unavailable,
    /// Returns some data, then the connection drops.
    Broken(Vec<u8>),
}

/// In-memory [`Remote`] for tests in this and other crates.
///
/// Posts are served for any domain, filtered by service and user. Files are
/// keyed by their remote path, and every call to
/// [`file_stream`](Remote::file_stream) is counted so tests can assert how
/// often a path was fetched.
///
/// # Examples
///
/// ```
/// use hoard_api::{MockRemote, Remote};
/// use tokio::io::AsyncReadExt;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let remote = MockRemote::default().with_file("/data/ab/cd/abcd1234", b"png bytes");
/// let mut stream = remote.file_stream("kemono.su", "/data/ab/cd/abcd1234").await.unwrap();
/// let mut data = Vec::new();
/// stream.read_to_end(&mut data).await.unwrap();
/// assert_eq!(data, b"png bytes");
/// assert_eq!(remote.fetch_count("/data/ab/cd/abcd1234"), 1);
/// # }
/// ```
#[derive(Default)]
pub struct MockRemote {
    posts: Vec<Post>,
    files: HashMap<String, MockFile>,
    fetches: Mutex<HashMap<String, usize>>,
    delay: Option<Duration>,
}
impl MockRemote {
    pub fn with_post(mut self, post: Post) -> Self {
        self.posts.push(post);
        self
    }

    pub fn with_file(mut self, path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), MockFile::Data(data.into()));
        self
    }

    /// Requests for `path` fail before a stream is returned.
    pub fn with_unavailable_file(mut self, path: impl Into<String>) -> Self {
        self.files.insert(path.into(), MockFile::Unavailable);
        self
    }

    /// Requests for `path` return `prefix`, then fail mid-stream.
    pub fn with_broken_file(mut self, path: impl Into<String>, prefix: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), MockFile::Broken(prefix.into()));
        self
    }

    /// Sleep before answering each file request; widens race windows in
    /// concurrency tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of times `path` has been requested.
    pub fn fetch_count(&self, path: &str) -> usize {
        self.fetches.lock().map(|fetches| fetches.get(path).copied().unwrap_or(0)).unwrap_or(0)
    }

    /// Number of file requests across all paths.
    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().map(|fetches| fetches.values().sum()).unwrap_or(0)
    }
}

#[async_trait]
impl Remote for MockRemote {
    async fn creator_posts(&self, creator: &Creator) -> Result<Vec<Post>> {
        Ok(self
            .posts
            .iter()
            .filter(|post| post.service == creator.service && post.user == creator.user)
            .cloned()
            .collect())
    }

    async fn post(&self, creator: &Creator, id: &str) -> Result<Post> {
        self.creator_posts(creator)
            .await?
            .into_iter()
            .find(|post| post.id == id)
            .ok_or_else(|| exn::Exn::from(ErrorKind::Status(404)))
    }

    async fn file_stream(&self, _domain: &str, path: &str) -> Result<ByteStream> {
        if let Ok(mut fetches) = self.fetches.lock() {
            *fetches.entry(path.to_string()).or_default() += 1;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.files.get(path).cloned() {
            Some(MockFile::Data(data)) => {
                let chunks = vec![Ok::<_, io::Error>(Cursor::new(data))];
                Ok(Box::pin(StreamReader::new(futures::stream::iter(chunks))))
            },
            Some(MockFile::Broken(prefix)) => {
                let chunks = vec![
                    Ok(Cursor::new(prefix)),
                    Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer")),
                ];
                Ok(Box::pin(StreamReader::new(futures::stream::iter(chunks))))
            },
            Some(MockFile::Unavailable) => exn::bail!(ErrorKind::Transport),
            None => exn::bail!(ErrorKind::Status(404)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use tokio::io::AsyncReadExt;

    fn post(id: &str, user: &str) -> Post {
        Post {
            id: id.to_string(),
            service: "fanbox".to_string(),
            user: user.to_string(),
            title: format!("Post {id}"),
            added: datetime!(2023-01-01 00:00:00),
            file: None,
            attachments: vec![],
        }
    }

    #[tokio::test]
    async fn test_creator_posts_filters_by_creator() {
        let remote = MockRemote::default().with_post(post("1", "42")).with_post(post("2", "42")).with_post(post("3", "7"));
        let posts = remote.creator_posts(&Creator::new("kemono.su", "fanbox", "42")).await.unwrap();
        assert_eq!(posts.len(), 2);
        let post = remote.post(&Creator::new("kemono.su", "fanbox", "7"), "3").await.unwrap();
        assert_eq!(post.id, "3");
        let err = remote.post(&Creator::new("kemono.su", "fanbox", "7"), "1").await.unwrap_err();
        assert_eq!(*err, ErrorKind::Status(404));
    }

    #[tokio::test]
    async fn test_broken_file_fails_mid_stream() {
        let remote = MockRemote::default().with_broken_file("/broken", b"half");
        let mut stream = remote.file_stream("kemono.su", "/broken").await.unwrap();
        let mut data = Vec::new();
        assert!(stream.read_to_end(&mut data).await.is_err());
        assert_eq!(data, b"half");
    }

    #[tokio::test]
    async fn test_missing_and_unavailable_files() {
        let remote = MockRemote::default().with_unavailable_file("/down");
        assert!(matches!(remote.file_stream("d", "/down").await, Err(e) if *e == ErrorKind::Transport));
        assert!(matches!(remote.file_stream("d", "/nope").await, Err(e) if *e == ErrorKind::Status(404)));
        assert_eq!(remote.fetch_count("/down"), 1);
        assert_eq!(remote.total_fetches(), 2);
    }
}
