//! Proxy tokens - stateless references to upstream resources
//!
//! A token is a reversible encoding of the absolute upstream URL plus the
//! request-header context (referer/cookie) some origins demand. Because the
//! token carries everything needed to reproduce the fetch, the proxy keeps no
//! server-side table and survives restarts with in-flight manifests intact.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token decode failures
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token encoding: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("invalid token payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Stateless, reversible reference to one upstream resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyToken {
    /// Absolute upstream URL to fetch.
    #[serde(rename = "u")]
    pub url: String,
    /// Referer header some origins require.
    #[serde(rename = "r", default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    /// Cookie header some origins require.
    #[serde(rename = "c", default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
}

impl ProxyToken {
    /// Create a token with no header context
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            referer: None,
            cookie: None,
        }
    }

    /// Create a token carrying referer/cookie context
    pub fn with_headers(
        url: impl Into<String>,
        referer: Option<String>,
        cookie: Option<String>,
    ) -> Self {
        Self {
            url: url.into(),
            referer,
            cookie,
        }
    }

    /// Derive a token for a different URL keeping this token's header context
    pub fn rebase(&self, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            referer: self.referer.clone(),
            cookie: self.cookie.clone(),
        }
    }

    /// Encode to a URL-safe opaque string
    pub fn encode(&self) -> String {
        // The payload is three plain strings; serialization cannot fail.
        let payload = serde_json::to_vec(self).expect("token payload serializes");
        URL_SAFE_NO_PAD.encode(payload)
    }

    /// Decode a token previously produced by [`encode`](Self::encode)
    pub fn decode(encoded: &str) -> Result<Self, TokenError> {
        let payload = URL_SAFE_NO_PAD.decode(encoded)?;
        Ok(serde_json::from_slice(&payload)?)
    }

    /// Host component of the upstream URL (the Governor pool key)
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}
