//! Retrieval of issuer certificates and CRLs named in certificate extensions.

use crate::error::{Error, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Limited};
use hyper::Uri;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::collections::HashMap;
use std::time::Duration;
use tokio::runtime::Handle;

/// Default cap on a fetched response body.
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 8 * 1024 * 1024;

/// Source of certificates and revocation lists by URL.
pub trait Fetcher: Send + Sync {
    /// Fetch the body behind `url`.
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

fn fetch_error(url: &str, reason: impl Into<String>) -> Error {
    Error::Fetch {
        url: url.to_string(),
        reason: reason.into(),
    }
}

/// Plain `http://` fetcher driven by a tokio runtime.
///
/// `fetch` blocks the calling thread, so it must be called from outside the
/// runtime's async context (e.g. inside `spawn_blocking`).
pub struct HttpFetcher {
    client: Client<HttpConnector, Empty<Bytes>>,
    handle: Handle,
    timeout: Duration,
    max_bytes: usize,
}

impl HttpFetcher {
    /// Create a fetcher that runs its requests on `handle`.
    pub fn new(handle: Handle, timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self {
            client,
            handle,
            timeout,
            max_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }

    /// Cap on the response body size.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    async fn get(&self, uri: Uri, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(uri)
            .await
            .map_err(|e| fetch_error(url, e.to_string()))?;
        if !response.status().is_success() {
            return Err(fetch_error(url, format!("HTTP status {}", response.status())));
        }
        let body = Limited::new(response.into_body(), self.max_bytes)
            .collect()
            .await
            .map_err(|e| fetch_error(url, e.to_string()))?
            .to_bytes();
        Ok(body.to_vec())
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let uri: Uri = url
            .parse()
            .map_err(|e: http::uri::InvalidUri| fetch_error(url, e.to_string()))?;
        if uri.scheme_str() != Some("http") {
            return Err(fetch_error(url, "only http:// URLs are fetched"));
        }

        log::debug!("fetching {}", url);
        let result = self
            .handle
            .block_on(async { tokio::time::timeout(self.timeout, self.get(uri, url)).await });
        match result {
            Ok(inner) => inner,
            Err(_) => Err(fetch_error(url, format!("timed out after {:?}", self.timeout))),
        }
    }
}

/// Fetcher used when network access is disallowed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFetch;

impl Fetcher for NoFetch {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        Err(fetch_error(url, "network fetching is disabled"))
    }
}

/// In-memory fetcher keyed by URL.
#[derive(Debug, Default, Clone)]
pub struct StaticFetcher {
    responses: HashMap<String, Vec<u8>>,
}

impl StaticFetcher {
    /// Empty fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`.
    pub fn with_response(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.responses.insert(url.into(), body.into());
        self
    }
}

impl Fetcher for StaticFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| fetch_error(url, "not found"))
    }
}
