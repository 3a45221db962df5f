//! HTTP session used by the walker, behind a small trait seam.
//!
//! # Architecture
//!
//! - [`Transport`]: the two requests a crawl needs, a page and an image
//! - [`HttpTransport`]: the real implementation over one `reqwest::Client`
//! - [`ImageResponse`]: image headers plus a stream of body chunks
//!
//! The walker is generic over [`Transport`], so tests can substitute a spy
//! that records which URLs were requested.

use crate::error::CrawlError;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{Client, Response, header};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Browser user agent sent with every request.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; rv:84.0) Gecko/20100101 Firefox/84.0";

/// Limit on connecting, and on each wait for more response bytes.
///
/// This is not a deadline for the whole request: a large image keeps
/// downloading for as long as data keeps arriving.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Headers and body of a successful image request.
pub struct ImageResponse {
    /// Value of `Content-Length`, `0` when absent or malformed.
    pub content_length: u64,
    /// Raw `Last-Modified` header value.
    pub last_modified: Option<String>,
    /// Body chunks in arrival order.
    pub body: BoxStream<'static, Result<Vec<u8>, CrawlError>>,
}

impl fmt::Debug for ImageResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageResponse")
            .field("content_length", &self.content_length)
            .field("last_modified", &self.last_modified)
            .finish_non_exhaustive()
    }
}

/// The requests a crawl makes.
///
/// Implementations must treat any non-2xx status as [`CrawlError::Status`].
pub trait Transport {
    /// Fetch a page and return its body as text.
    async fn fetch_page(&self, url: &str) -> Result<String, CrawlError>;

    /// Start fetching an image; the body is consumed by the caller.
    async fn fetch_image(&self, url: &str) -> Result<ImageResponse, CrawlError>;
}

/// [`Transport`] backed by a single `reqwest::Client`.
///
/// The client keeps a cookie store, so cookies set by a page are sent along
/// with the request for its image. Certificate verification stays on.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, CrawlError> {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    /// Build a transport whose connect and read timeouts are `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self, CrawlError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .cookie_store(true)
            .build()
            .map_err(CrawlError::Client)?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<Response, CrawlError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| CrawlError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%url, %status, "Error status code received");
            return Err(CrawlError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

impl Transport for HttpTransport {
    #[instrument(level = "debug", skip(self))]
    async fn fetch_page(&self, url: &str) -> Result<String, CrawlError> {
        let response = self.get(url).await?;
        let body = response.text().await.map_err(|source| CrawlError::Http {
            url: url.to_string(),
            source,
        })?;
        debug!(bytes = body.len(), "Fetched page");
        Ok(body)
    }

    #[instrument(level = "debug", skip(self))]
    async fn fetch_image(&self, url: &str) -> Result<ImageResponse, CrawlError> {
        let response = self.get(url).await?;
        let headers = response.headers();

        let content_length = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let last_modified = headers
            .get(header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        debug!(content_length, ?last_modified, "Image response headers");

        let url = url.to_string();
        let body = stream::unfold(Some(response), move |state| {
            let url = url.clone();
            async move {
                let mut response = state?;
                match response.chunk().await {
                    Ok(Some(bytes)) => Some((Ok(bytes.to_vec()), Some(response))),
                    Ok(None) => None,
                    Err(source) => Some((Err(CrawlError::Http { url, source }), None)),
                }
            }
        })
        .boxed();

        Ok(ImageResponse {
            content_length,
            last_modified,
            body,
        })
    }
}
