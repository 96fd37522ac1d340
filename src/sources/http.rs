//! Network fetch seam used by the playlist parsers and country detection

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::Client;
use std::io;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::HttpConfig;
use crate::errors::{SourceError, SourceResult};
use crate::utils::url::obfuscate_credentials;

/// Response body as a stream of byte chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

pub struct HttpResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl HttpResponse {
    /// In-memory response, mainly for built-in content and tests
    pub fn from_bytes(status: u16, body: impl Into<Bytes>) -> Self {
        Self::from_chunks(status, vec![body.into()])
    }

    /// In-memory response delivered as separate chunks
    pub fn from_chunks(status: u16, chunks: Vec<Bytes>) -> Self {
        Self {
            status,
            body: Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx status into an error
    pub fn error_for_status(self, url: &str) -> SourceResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(SourceError::http(
                self.status,
                format!("unexpected status fetching {}", obfuscate_credentials(url)),
            ))
        }
    }
}

#[async_trait]
pub trait HttpFetcher: Send + Sync {
    /// GET `url` with extra request headers; the body is not read yet
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> SourceResult<HttpResponse>;
}

/// reqwest-backed fetcher with a spoofed user agent and connect/read timeouts
pub struct ReqwestFetcher {
    client: Client,
    read_timeout: Duration,
}

impl ReqwestFetcher {
    pub fn new(config: &HttpConfig) -> SourceResult<Self> {
        let mut default_headers = HeaderMap::new();
        let user_agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|e| SourceError::invalid_format(format!("invalid user agent: {}", e)))?;
        default_headers.insert(USER_AGENT, user_agent);

        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .default_headers(default_headers)
            .build()?;

        Ok(Self {
            client,
            read_timeout: config.read_timeout(),
        })
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> SourceResult<HttpResponse> {
        let display_url = obfuscate_credentials(url);
        let mut request = self.client.get(url);
        for (name, value) in headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => request = request.header(name, value),
                _ => warn!("Skipping invalid request header '{}' for {}", name, display_url),
            }
        }

        debug!("GET {}", display_url);
        let response = tokio::time::timeout(self.read_timeout, request.send())
            .await
            .map_err(|_| SourceError::timeout(display_url.clone()))??;

        let status = response.status().as_u16();
        debug!("{} responded with {}", display_url, status);

        let chunks = response
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e));

        Ok(HttpResponse {
            status,
            body: with_read_timeout(Box::pin(chunks), self.read_timeout),
        })
    }
}

/// Fail the stream when no chunk arrives within `timeout`
fn with_read_timeout(body: ByteStream, timeout: Duration) -> ByteStream {
    let timed = futures::stream::unfold(Some(body), move |state| async move {
        let mut body = state?;
        match tokio::time::timeout(timeout, body.next()).await {
            Ok(Some(item)) => Some((item, Some(body))),
            Ok(None) => None,
            Err(_) => Some((
                Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out")),
                None,
            )),
        }
    });
    Box::pin(timed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_error_for_status() {
        assert!(HttpResponse::from_bytes(200, "ok").error_for_status("http://x").is_ok());

        let err = HttpResponse::from_bytes(404, "")
            .error_for_status("http://user:secret@x/list.m3u")
            .err()
            .unwrap();
        match err {
            SourceError::Http { status, message } => {
                assert_eq!(status, 404);
                assert!(!message.contains("secret"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_timeout_ends_stream_with_error() {
        let stalled: ByteStream = Box::pin(futures::stream::pending());
        let mut body = with_read_timeout(stalled, Duration::from_millis(10));

        let first = body.next().await.unwrap();
        assert_eq!(first.unwrap_err().kind(), io::ErrorKind::TimedOut);
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn test_chunks_pass_through() {
        let response = HttpResponse::from_chunks(200, vec![Bytes::from("a"), Bytes::from("b")]);
        let mut body = with_read_timeout(response.body, Duration::from_secs(1));
        let mut collected = Vec::new();
        while let Some(chunk) = body.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"ab");
    }
}
