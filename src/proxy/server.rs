//! Local HLS proxy server
//!
//! The HTTP front the player connects to. One endpoint, `GET /hls/{token}`:
//! decode the token, fetch upstream, and either return a rewritten manifest
//! or stream the payload straight through under a governor slot. The server
//! keeps no cross-request state; a media playlist is free to change between
//! requests (live-edge updates) and every answer is derived from the token
//! alone.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::proxy::fetch::{FetchError, Fetcher};
use crate::proxy::governor::{Governor, GovernorError, Slot};
use crate::proxy::rewrite::{rewrite_playlist, RewriteError};
use crate::proxy::token::{ProxyToken, TokenError};

/// Content type players expect for HLS manifests
pub const HLS_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Failures on the request path, mapped to HTTP responses
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Governor(#[from] GovernorError),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),
}

impl ProxyError {
    fn status(&self) -> StatusCode {
        match self {
            ProxyError::Token(_) => StatusCode::BAD_REQUEST,
            ProxyError::Fetch(FetchError::UpstreamHttpError { status }) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ProxyError::Fetch(FetchError::UpstreamUnreachable(_)) => StatusCode::BAD_GATEWAY,
            ProxyError::Fetch(FetchError::UpstreamTimeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Governor(GovernorError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Rewrite(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Shared per-server state, injected into every request handler
#[derive(Clone)]
pub struct ProxyState {
    pub fetcher: Arc<Fetcher>,
    pub governor: Arc<Governor>,
    pub variant_limit: usize,
}

/// Running proxy server bound to a loopback port
pub struct ProxyServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl ProxyServer {
    /// Bind 127.0.0.1 on an ephemeral port and start serving
    pub async fn start(
        fetcher: Arc<Fetcher>,
        governor: Arc<Governor>,
        variant_limit: usize,
    ) -> io::Result<Self> {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        let app = router(ProxyState {
            fetcher,
            governor,
            variant_limit,
        });

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("proxy server terminated: {e}");
            }
        });

        info!(%addr, "HLS proxy listening");
        Ok(Self { addr, handle })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Player-facing local URL for an upstream resource
    pub fn local_url(&self, token: &ProxyToken) -> String {
        format!("http://127.0.0.1:{}/hls/{}", self.addr.port(), token.encode())
    }
}

impl Drop for ProxyServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Build the proxy router (exposed separately for tests)
pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route("/hls/{token}", get(serve_token))
        .with_state(state)
}

async fn serve_token(
    State(state): State<ProxyState>,
    Path(raw): Path<String>,
    headers: HeaderMap,
) -> Response {
    let token = match ProxyToken::decode(&raw) {
        Ok(token) => token,
        Err(e) => {
            warn!("rejecting undecodable token: {e}");
            return ProxyError::from(e).into_response();
        }
    };
    debug!(url = %token.url, "proxy request");

    let result = if looks_like_manifest_url(&token.url) {
        serve_manifest(&state, &token).await
    } else {
        serve_passthrough(&state, &token, &headers).await
    };

    match result {
        Ok(response) => response,
        Err(e) => {
            // One failed request must not take the session down; the player
            // retries or switches variants on its own.
            warn!(url = %token.url, error = %e, "proxy request failed");
            e.into_response()
        }
    }
}

/// Manifest path: fetch, filter (masters only), rewrite, return
async fn serve_manifest(state: &ProxyState, token: &ProxyToken) -> Result<Response, ProxyError> {
    let (body, _content_type) = state.fetcher.fetch(token).await?;
    let text = String::from_utf8_lossy(&body);
    let rewritten = rewrite_playlist(&text, token, state.variant_limit)?;
    Ok(manifest_response(rewritten))
}

/// Segment/key path: governed streaming passthrough.
///
/// The slot is owned by the response body stream and frees when the stream
/// ends, errors, or the client disconnects and the body is dropped.
async fn serve_passthrough(
    state: &ProxyState,
    token: &ProxyToken,
    headers: &HeaderMap,
) -> Result<Response, ProxyError> {
    let host = token.host().unwrap_or_else(|| "unknown".to_string());
    let slot = state.governor.acquire(&host).await?;

    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let upstream = state.fetcher.open_stream(token, range).await?;

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    // Some origins serve manifests from extensionless URLs; the content-type
    // is the only tell. Buffer and rewrite those instead of streaming.
    if is_manifest_content_type(content_type.as_deref()) {
        let body = upstream
            .bytes()
            .await
            .map_err(|e| FetchError::UpstreamUnreachable(e.to_string()))?;
        drop(slot);
        let text = String::from_utf8_lossy(&body);
        let rewritten = rewrite_playlist(&text, token, state.variant_limit)?;
        return Ok(manifest_response(rewritten));
    }

    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::OK);
    let mut passthrough_headers = HeaderMap::new();
    for name in [
        header::CONTENT_TYPE,
        header::CONTENT_LENGTH,
        header::CONTENT_RANGE,
        header::ACCEPT_RANGES,
    ] {
        if let Some(value) = upstream.headers().get(&name) {
            if let Ok(value) = HeaderValue::from_bytes(value.as_bytes()) {
                passthrough_headers.insert(name, value);
            }
        }
    }

    let stream = GuardedStream::new(upstream.bytes_stream().boxed(), slot);
    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    *response.headers_mut() = passthrough_headers;
    Ok(response)
}

fn manifest_response(body: String) -> Response {
    let mut response = Response::new(Body::from(body));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(HLS_CONTENT_TYPE),
    );
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

fn looks_like_manifest_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or(&lower);
    path.ends_with(".m3u8") || path.contains("playlist")
}

fn is_manifest_content_type(content_type: Option<&str>) -> bool {
    content_type
        .map(|c| c.to_ascii_lowercase().contains("mpegurl"))
        .unwrap_or(false)
}

/// Upstream byte stream that owns the governor slot for its lifetime
struct GuardedStream {
    inner: BoxStream<'static, reqwest::Result<Bytes>>,
    slot: Option<Slot>,
}

impl GuardedStream {
    fn new(inner: BoxStream<'static, reqwest::Result<Bytes>>, slot: Slot) -> Self {
        Self {
            inner,
            slot: Some(slot),
        }
    }

    fn finish(&mut self) {
        if let Some(mut slot) = self.slot.take() {
            slot.release();
        }
    }
}

impl Stream for GuardedStream {
    type Item = Result<Bytes, io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(Some(Err(e))) => {
                self.finish();
                Poll::Ready(Some(Err(io::Error::other(e))))
            }
            Poll::Ready(None) => {
                self.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

// Client disconnect drops the body, which drops the stream; the slot's own
// Drop returns it to the pool, so no leak on abnormal termination.
