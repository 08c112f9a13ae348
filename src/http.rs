// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::header::RANGE;
use reqwest::redirect::Policy;

/// User agent sent with every request unless a channel overrides it
pub const DEFAULT_USER_AGENT: &str = concat!(
    "podspool/",
    env!("CARGO_PKG_VERSION"),
    " (podspool rss enclosure downloader)"
);

const MAX_REDIRECTS: usize = 10;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Longest silence tolerated between two reads of a response body
const READ_TIMEOUT: Duration = Duration::from_secs(120);

/// A streaming response body
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// HTTP response with status, content length, and body stream
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Content-Length header value, if present
    pub content_length: Option<u64>,
    /// Response body as a stream of bytes
    pub body: ByteStream,
}

/// HTTP client abstraction for testability
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetch the entire response body along with the status code
    async fn get_bytes(&self, url: &str) -> Result<(u16, Bytes), reqwest::Error>;

    /// Get a streaming response, asking the server to start at `offset` when non-zero
    async fn get_stream(&self, url: &str, offset: u64) -> Result<HttpResponse, reqwest::Error>;
}

/// Default HTTP client implementation using reqwest
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a client with the default user agent
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_user_agent(DEFAULT_USER_AGENT)
    }

    /// Create a client that identifies itself with `user_agent`
    pub fn with_user_agent(user_agent: &str) -> Result<Self, reqwest::Error> {
        Self::build(user_agent, READ_TIMEOUT)
    }

    fn build(user_agent: &str, read_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(read_timeout)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get_bytes(&self, url: &str) -> Result<(u16, Bytes), reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        tracing::debug!(url, status, "feed response");
        Ok((status, response.bytes().await?))
    }

    async fn get_stream(&self, url: &str, offset: u64) -> Result<HttpResponse, reqwest::Error> {
        let mut request = self.client.get(url);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let content_length = response.content_length();
        tracing::debug!(url, status, ?content_length, offset, "enclosure response");

        let body: ByteStream = Box::pin(response.bytes_stream());

        Ok(HttpResponse {
            status,
            content_length,
            body,
        })
    }
}
