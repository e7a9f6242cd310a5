use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use canopy_core::collection::UserId;

/// Header carrying the acting user's id. Authentication happens upstream.
pub const USER_HEADER: &str = "x-user-id";

fn skip_identity(path: &str) -> bool {
    matches!(path, "/healthz" | "/metrics")
}

/// Parses the acting user from [`USER_HEADER`] and stores it as a request
/// extension for the handlers.
pub async fn identity_middleware(mut request: Request<Body>, next: Next) -> Response {
    if skip_identity(request.uri().path()) {
        return next.run(request).await;
    }

    let raw = match request
        .headers()
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        Some(raw) => raw.trim().to_string(),
        None => return error_json(StatusCode::UNAUTHORIZED, "missing x-user-id header"),
    };

    let user_id = match raw.parse::<i64>() {
        Ok(id) => UserId::new(id),
        Err(_) => {
            tracing::debug!(value = %raw, "rejecting malformed user header");
            return error_json(StatusCode::UNAUTHORIZED, "invalid x-user-id header");
        }
    };

    request.extensions_mut().insert(user_id);
    next.run(request).await
}

fn error_json(status: StatusCode, msg: &str) -> Response {
    let body = serde_json::json!({"error": msg});
    (status, axum::Json(body)).into_response()
}
