use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::http::response::status_envelope;
use crate::http::server::AppState;

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(key) if key == state.config.admin.api_key => next.run(request).await,
        _ => {
            tracing::warn!(path = %request.uri().path(), "Rejected admin request");
            status_envelope(StatusCode::UNAUTHORIZED, "Invalid or missing admin API key")
        }
    }
}
