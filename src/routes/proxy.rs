use axum::{
    extract::{Request, State},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tower::ServiceExt;

use crate::AppState;
use crate::error::ProxyError;

/// Forward any request upstream through the tool-prefix transport.
pub async fn forward(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    match state.transport.clone().oneshot(request).await {
        Ok(response) => response,
        Err(err) => {
            let err = ProxyError::from(err);
            tracing::warn!("{method} {path} failed: {err}");
            err.into_response()
        }
    }
}
