use std::any::Any;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::{
    error::{ApiError, ErrorReport},
    state::AppState,
};

/// Outermost error stage: outside production, re-renders error bodies with
/// their diagnostic trace.
pub async fn expose_diagnostics(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let mut res = next.run(req).await;
    if !state.config.environment.exposes_diagnostics() {
        return res;
    }
    let Some(report) = res.extensions_mut().remove::<ErrorReport>() else {
        return res;
    };
    let mut body = report.body;
    body.stack = Some(report.trace);

    let (mut parts, _) = res.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Json(body).into_response().into_body())
}

/// The router answers unsupported methods with a bare 405; give it the
/// error body, keeping its `Allow` header.
pub async fn method_not_allowed(req: Request, next: Next) -> Response {
    let res = next.run(req).await;
    if res.status() != StatusCode::METHOD_NOT_ALLOWED
        || res.extensions().get::<ErrorReport>().is_some()
    {
        return res;
    }
    let allow = res.headers().get(header::ALLOW).cloned();
    let mut normalized = ApiError::MethodNotAllowed.into_response();
    if let Some(allow) = allow {
        normalized.headers_mut().insert(header::ALLOW, allow);
    }
    normalized
}

pub async fn request_timeout(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    tokio::time::timeout(state.config.request_timeout, next.run(req))
        .await
        .map_err(|_| ApiError::Timeout)
}

/// Turns a handler panic into a normalized 500.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    };
    ApiError::Internal(anyhow::anyhow!("handler panicked: {detail}")).into_response()
}

pub async fn route_not_found() -> ApiError {
    ApiError::NotFound("Route not found".into())
}
