//! HTTP implementation of [`Remote`].

use crate::error::{ErrorKind, Result};
use crate::{ByteStream, Creator, Post, Remote};
use async_trait::async_trait;
use exn::ResultExt;
use futures::TryStreamExt;
use reqwest::{Client, Response, StatusCode, Url};
use std::io;
use std::time::Duration;
use tokio_util::io::StreamReader;
use tracing::instrument;

/// Tuning knobs for [`HttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOptions {
    /// Additional attempts after the first failed one.
    pub retries: u32,
    pub retry_wait: Duration,
    /// The servers can be very slow to accept connections.
    pub connect_timeout: Duration,
}
impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            retries: 5,
            retry_wait: Duration::from_millis(250),
            connect_timeout: Duration::from_secs(60),
        }
    }
}

/// Talks to the content API over HTTPS.
///
/// Requests that fail at the transport level, or come back with `429` or a
/// `5xx` status, are retried with a fixed wait between attempts.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    options: HttpOptions,
}
impl HttpClient {
    pub fn new(options: HttpOptions) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(options.connect_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::Transport)?;
        Ok(Self { client, options })
    }

    async fn get(&self, url: Url) -> Result<Response> {
        let mut attempt = 0;
        let outcome = loop {
            let outcome = self.client.get(url.clone()).send().await;
            let retry = match &outcome {
                Ok(response) => is_retryable_status(response.status()),
                Err(e) => !e.is_builder(),
            };
            if !retry || attempt >= self.options.retries {
                break outcome;
            }
            attempt += 1;
            tracing::debug!(%url, attempt, "Retrying request");
            tokio::time::sleep(self.options.retry_wait).await;
        };
        let response = outcome.or_raise(|| ErrorKind::Transport)?;
        if response.status() != StatusCode::OK {
            exn::bail!(ErrorKind::Status(response.status().as_u16()));
        }
        Ok(response)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
        let body = self.get(url).await?.bytes().await.or_raise(|| ErrorKind::Transport)?;
        serde_json::from_slice(&body).or_raise(|| ErrorKind::Decode)
    }
}

#[async_trait]
impl Remote for HttpClient {
    #[instrument(skip_all, fields(creator = %creator))]
    async fn creator_posts(&self, creator: &Creator) -> Result<Vec<Post>> {
        self.get_json(creator_url(creator)?).await
    }

    #[instrument(skip_all, fields(creator = %creator, id = %id))]
    async fn post(&self, creator: &Creator, id: &str) -> Result<Post> {
        self.get_json(post_url(creator, id)?).await
    }

    async fn file_stream(&self, domain: &str, path: &str) -> Result<ByteStream> {
        let response = self.get(data_url(domain, path)?).await?;
        let body = response.bytes_stream().map_err(io::Error::other);
        Ok(Box::pin(StreamReader::new(body)))
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn parse_url(url: String) -> Result<Url> {
    Url::parse(&url).or_raise(|| ErrorKind::InvalidUrl(url))
}

fn creator_url(creator: &Creator) -> Result<Url> {
    parse_url(format!("https://{}/api/v1/{}/user/{}", creator.domain, creator.service, creator.user))
}

fn post_url(creator: &Creator, id: &str) -> Result<Url> {
    parse_url(format!("https://{}/api/v1/{}/user/{}/post/{id}", creator.domain, creator.service, creator.user))
}

fn data_url(domain: &str, path: &str) -> Result<Url> {
    let separator = if path.starts_with('/') { "" } else { "/" };
    parse_url(format!("https://{domain}/data{separator}{path}"))
}
