use std::time::Duration;

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::error::ApiError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
const HANDLER_DEADLINE_SECONDS: u64 = 30;

/// Tag every request with an id; echo it on the response so 5xx bodies are
/// traceable without leaking detail.
pub async fn request_id(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

    request.extensions_mut().insert(RequestId(id.clone()));
    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// 30-second handler deadline. Long-running work is expected to detach into
/// a task and return a task id instead of holding the request open.
pub async fn deadline(request: Request, next: Next) -> Response {
    match tokio::time::timeout(
        Duration::from_secs(HANDLER_DEADLINE_SECONDS),
        next.run(request),
    )
    .await
    {
        Ok(response) => response,
        Err(_) => ApiError::internal("request deadline exceeded").into_response(),
    }
}

/// Count requests into the prometheus registry.
pub async fn count_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let response = next.run(request).await;
    crate::metrics::observe_request(method.as_str(), response.status().as_u16());
    response
}
