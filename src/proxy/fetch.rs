//! Manifest and segment fetching
//!
//! Thin reqwest wrapper carrying the upstream error taxonomy. Manifests are
//! fetched whole (they are small and need rewriting); segments are opened as
//! live responses and streamed through without buffering.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header;
use thiserror::Error;

use crate::proxy::token::ProxyToken;

/// Browser-ish UA; several upstream origins refuse obvious bot agents.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Upstream fetch failures
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("upstream returned HTTP {status}")]
    UpstreamHttpError { status: u16 },

    #[error("upstream timed out after {0:?}")]
    UpstreamTimeout(Duration),
}

/// HTTP fetcher for upstream manifests, segments and metadata
pub struct Fetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl Fetcher {
    /// Create a fetcher with the given per-request deadline
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(timeout)
                .build()
                .unwrap_or_default(),
            timeout,
        }
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::UpstreamTimeout(self.timeout)
        } else {
            FetchError::UpstreamUnreachable(err.to_string())
        }
    }

    fn request(&self, token: &ProxyToken) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .get(&token.url)
            .header(header::USER_AGENT, USER_AGENT);
        if let Some(referer) = &token.referer {
            req = req.header(header::REFERER, referer.clone());
        }
        if let Some(cookie) = &token.cookie {
            req = req.header(header::COOKIE, cookie.clone());
        }
        req
    }

    /// Fetch a whole resource (manifest path).
    ///
    /// Returns the body and the upstream content-type, if any.
    pub async fn fetch(&self, token: &ProxyToken) -> Result<(Bytes, Option<String>), FetchError> {
        let response = self
            .request(token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UpstreamHttpError {
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        Ok((body, content_type))
    }

    /// Open a resource for streaming passthrough (segment path).
    ///
    /// The deadline covers time-to-headers only; the body may stream for as
    /// long as the segment takes. An optional Range header is forwarded so
    /// seeking players keep working.
    pub async fn open_stream(
        &self,
        token: &ProxyToken,
        range: Option<&str>,
    ) -> Result<reqwest::Response, FetchError> {
        let mut req = self.request(token);
        if let Some(range) = range {
            req = req.header(header::RANGE, range.to_string());
        }

        let response = tokio::time::timeout(self.timeout, req.send())
            .await
            .map_err(|_| FetchError::UpstreamTimeout(self.timeout))?
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UpstreamHttpError {
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}
