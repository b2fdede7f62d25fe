use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request id carried in the request extensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Reuses an incoming `X-Request-Id` or mints a UUID v4, runs the rest of the
/// request inside a span carrying it, and echoes it on the response so page
/// errors can be matched to server logs.
pub async fn request_id_middleware(
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    let id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = tracing::info_span!("req", request_id = %id);
    span.in_scope(|| tracing::debug!("{} {}", request.method(), request.uri().path()));

    request.extensions_mut().insert(RequestId(id.clone()));

    // Everything downstream, handler and pipeline included, logs inside the span
    let mut response = next.run(request).instrument(span).await;
    if let Ok(val) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, val);
    }

    response
}
