//! Origin client.

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode, Uri};
use tracing::debug;

use crate::{headers, ProxyError};

/// Client for the single proxied origin.
#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    base: reqwest::Url,
}

/// A fully buffered origin response.
#[derive(Debug)]
pub struct UpstreamResponse {
    /// Origin status
    pub status: StatusCode,
    /// Origin headers, as received
    pub headers: HeaderMap,
    /// Origin body bytes, as received (possibly gzip-encoded)
    pub body: Bytes,
}

impl UpstreamClient {
    /// Creates a client for the origin at `base` (scheme, host, port).
    pub fn new(base: reqwest::Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base,
        }
    }

    /// The origin base URL.
    pub fn base(&self) -> &reqwest::Url {
        &self.base
    }

    /// Forwards one request to the origin and buffers the response.
    ///
    /// Hop-by-hop request headers are stripped; the `Host` header is
    /// rewritten to the origin by the HTTP client.
    pub async fn forward(
        &self,
        method: Method,
        uri: &Uri,
        request_headers: &HeaderMap,
        body: Bytes,
    ) -> Result<UpstreamResponse, ProxyError> {
        let mut url = self.base.clone();
        url.set_path(uri.path());
        url.set_query(uri.query());

        let mut forwarded = HeaderMap::new();
        headers::copy_end_to_end(&mut forwarded, request_headers);

        let response = self
            .client
            .request(method, url)
            .headers(forwarded)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let response_headers = response.headers().clone();
        let body = response.bytes().await?;
        debug!(%status, bytes = body.len(), path = uri.path(), "origin response");

        Ok(UpstreamResponse {
            status,
            headers: response_headers,
            body,
        })
    }
}
