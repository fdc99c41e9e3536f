//! Tool-name rewriting transport.
//!
//! [`ToolPrefixService`] decorates any `tower::Service` that executes HTTP
//! requests. Requests to the messages endpoint get the `beta` query flag and
//! prefixed tool names; every response body is unprefixed on the way back.

pub mod upstream;

use axum::body::Body;
use axum::http::{
    HeaderValue, Method, Request, Response, Uri, header,
    uri::{Parts as UriParts, PathAndQuery},
};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use url::form_urlencoded;

use crate::constants::{BETA_QUERY_PARAM, DEFAULT_MAX_BODY_BYTES, MESSAGES_PATH_SUFFIX};
use crate::error::TransportError;
use crate::transforms::{BoundaryMode, ToolPrefix, prefix_request_tool_names, unprefix_body};

pub use upstream::UpstreamTransport;

/// Layer producing [`ToolPrefixService`].
#[derive(Debug, Clone)]
pub struct ToolPrefixLayer {
    prefix: Arc<ToolPrefix>,
    boundary: BoundaryMode,
    max_body_bytes: usize,
}

impl ToolPrefixLayer {
    pub fn new(prefix: ToolPrefix) -> Self {
        Self {
            prefix: Arc::new(prefix),
            boundary: BoundaryMode::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_boundary_mode(mut self, boundary: BoundaryMode) -> Self {
        self.boundary = boundary;
        self
    }

    /// Largest request body buffered for rewriting. Bigger bodies on the
    /// messages endpoint fail with [`TransportError::ReadBody`].
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

impl<S> Layer<S> for ToolPrefixLayer {
    type Service = ToolPrefixService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ToolPrefixService {
            inner,
            prefix: self.prefix.clone(),
            boundary: self.boundary,
            max_body_bytes: self.max_body_bytes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolPrefixService<S> {
    inner: S,
    prefix: Arc<ToolPrefix>,
    boundary: BoundaryMode,
    max_body_bytes: usize,
}

impl<S> Service<Request<Body>> for ToolPrefixService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Response<Body>;
    type Error = TransportError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(TransportError::Transport)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        // Use the instance that was driven to readiness; leave a fresh clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let prefix = self.prefix.clone();
        let boundary = self.boundary;
        let max_body_bytes = self.max_body_bytes;

        Box::pin(async move {
            let request = if targets_messages(&request) {
                rewrite_request::<S::Error>(request, &prefix, max_body_bytes).await?
            } else {
                tracing::trace!(
                    method = %request.method(),
                    uri = %request.uri(),
                    "Forwarding request without rewriting"
                );
                request
            };

            let response = inner.call(request).await.map_err(TransportError::Transport)?;
            let (mut parts, body) = response.into_parts();
            // Stripping shortens the body, so any declared length is stale
            parts.headers.remove(header::CONTENT_LENGTH);
            let body = unprefix_body(body, prefix, boundary);
            Ok::<_, TransportError<S::Error>>(Response::from_parts(parts, body))
        })
    }
}

/// POST to a path ending in `/v1/messages`.
fn targets_messages<B>(request: &Request<B>) -> bool {
    request.method() == Method::POST && request.uri().path().ends_with(MESSAGES_PATH_SUFFIX)
}

/// Return a copy of `uri` with `beta=true` appended, or `None` if the query
/// already names the flag (whatever its value).
fn ensure_beta_query(uri: &Uri) -> Option<Uri> {
    let query = uri.query().unwrap_or_default();
    if form_urlencoded::parse(query.as_bytes()).any(|(key, _)| key == BETA_QUERY_PARAM) {
        return None;
    }

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    serializer.extend_pairs(form_urlencoded::parse(query.as_bytes()));
    serializer.append_pair(BETA_QUERY_PARAM, "true");
    let path_and_query = format!("{}?{}", uri.path(), serializer.finish());

    let mut parts = UriParts::from(uri.clone());
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query).ok()?);
    Uri::from_parts(parts).ok()
}

/// Prefix tool names in a JSON request body.
///
/// Returns `None` when the body is not a JSON object or references no tool
/// names; the caller then forwards the original bytes.
fn rewrite_body(bytes: &[u8], prefix: &ToolPrefix) -> Option<Bytes> {
    let mut payload: Value = match serde_json::from_slice(bytes) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => return None,
        Err(e) => {
            tracing::debug!("Request body is not JSON, forwarding unchanged: {e}");
            return None;
        }
    };

    let rewritten = prefix_request_tool_names(&mut payload, prefix);
    if rewritten == 0 {
        return None;
    }
    tracing::debug!(rewritten, prefix = prefix.as_str(), "Prefixed tool names");

    serde_json::to_vec(&payload).ok().map(Bytes::from)
}

async fn rewrite_request<E>(
    request: Request<Body>,
    prefix: &ToolPrefix,
    max_body_bytes: usize,
) -> Result<Request<Body>, TransportError<E>> {
    let (mut parts, body) = request.into_parts();

    if let Some(uri) = ensure_beta_query(&parts.uri) {
        parts.uri = uri;
    }

    // Collecting consumes the incoming body, releasing it before we re-wrap
    let bytes = axum::body::to_bytes(body, max_body_bytes)
        .await
        .map_err(TransportError::ReadBody)?;

    if bytes.is_empty() {
        return Ok(Request::from_parts(parts, Body::empty()));
    }

    let bytes = rewrite_body(&bytes, prefix).unwrap_or(bytes);
    parts
        .headers
        .insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));

    Ok(Request::from_parts(parts, Body::from(bytes)))
}
