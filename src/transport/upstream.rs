//! Inner transport that executes requests against the upstream API.

use axum::body::{Body, HttpBody};
use axum::http::{Request, Response, Uri, header};
use futures_util::future::BoxFuture;
use reqwest::Client;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

/// Sends each request to `base_url` + the request's path and query using a
/// shared (pooled) reqwest client.
#[derive(Debug, Clone)]
pub struct UpstreamTransport {
    client: Client,
    base_url: Arc<str>,
}

impl UpstreamTransport {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
        }
    }

    fn target_url(&self, uri: &Uri) -> String {
        let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        format!("{}{}", self.base_url, path_and_query)
    }
}

impl Service<Request<Body>> for UpstreamTransport {
    type Response = Response<Body>;
    type Error = reqwest::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let url = self.target_url(request.uri());
        let client = self.client.clone();

        Box::pin(async move {
            let (parts, body) = request.into_parts();
            let mut headers = parts.headers;
            headers.remove(header::HOST);

            let mut builder = client.request(parts.method, &url).headers(headers);
            if !body.is_end_stream() {
                builder = builder.body(reqwest::Body::wrap_stream(body.into_data_stream()));
            }

            let upstream = builder.send().await?;
            tracing::debug!(status = %upstream.status(), %url, "Upstream responded");
            Ok::<_, reqwest::Error>(into_response(upstream))
        })
    }
}

/// Convert an upstream response into an axum response, streaming the body.
///
/// Hop-by-hop headers and `content-length` are dropped: the body may shrink
/// when tool name prefixes are stripped.
fn into_response(upstream: reqwest::Response) -> Response<Body> {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    for name in [
        header::TRANSFER_ENCODING,
        header::CONNECTION,
        header::CONTENT_LENGTH,
    ] {
        headers.remove(name);
    }

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{Method, StatusCode};
    use tower::ServiceExt;

    async fn echo(request: axum::extract::Request) -> Response<Body> {
        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        let has_custom_header = parts.headers.contains_key("x-request-marker");
        Response::builder()
            .status(StatusCode::CREATED)
            .header("x-echo-method", parts.method.as_str())
            .header("x-echo-uri", parts.uri.to_string())
            .header("x-echo-marker", has_custom_header.to_string())
            .body(Body::from(body))
            .unwrap()
    }

    async fn spawn_upstream() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().fallback(echo))
                .await
                .unwrap();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn test_forwards_request_and_streams_response() {
        let base_url = spawn_upstream().await;
        let transport = UpstreamTransport::new(Client::new(), &base_url);

        let request = Request::builder()
            .method(Method::POST)
            .uri("http://localhost:4097/v1/messages?beta=true")
            .header(header::HOST, "localhost:4097")
            .header("x-request-marker", "1")
            .body(Body::from(r#"{"model":"claude"}"#))
            .unwrap();

        let response = transport.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-echo-method"], "POST");
        assert_eq!(response.headers()["x-echo-uri"], "/v1/messages?beta=true");
        assert_eq!(response.headers()["x-echo-marker"], "true");
        assert!(response.headers().get(header::CONTENT_LENGTH).is_none());

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], br#"{"model":"claude"}"#);
    }

    #[tokio::test]
    async fn test_get_without_body() {
        let base_url = spawn_upstream().await;
        let transport = UpstreamTransport::new(Client::new(), &base_url);

        let request = Request::builder()
            .method(Method::GET)
            .uri("/v1/models")
            .body(Body::empty())
            .unwrap();

        let response = transport.oneshot(request).await.unwrap();
        assert_eq!(response.headers()["x-echo-method"], "GET");
        assert_eq!(response.headers()["x-echo-uri"], "/v1/models");
    }

    #[tokio::test]
    async fn test_connection_refused_is_reqwest_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = UpstreamTransport::new(Client::new(), &format!("http://{addr}"));
        let request = Request::builder()
            .uri("/v1/messages")
            .body(Body::empty())
            .unwrap();

        let Err(err) = transport.oneshot(request).await else {
            panic!("expected a connection error");
        };
        assert!(err.is_connect() || err.is_request());
    }

    #[test]
    fn test_target_url_joins_base_and_path() {
        let transport = UpstreamTransport::new(Client::new(), "https://api.anthropic.com/");
        let uri: Uri = "/v1/messages?beta=true".parse().unwrap();
        assert_eq!(
            transport.target_url(&uri),
            "https://api.anthropic.com/v1/messages?beta=true"
        );
    }
}
