//! API middleware

use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};
use tracing::{info, warn};

use crate::auth::{validate_token, Claims};
use crate::error::ApiError;
use crate::AppState;

/// Authentication middleware
///
/// Validates the bearer token and stores its [`Claims`] in the request
/// extensions for handlers and the audit log.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| {
            warn!("Missing or invalid Authorization header");
            ApiError::Unauthorized
        })?;

    let claims = validate_token(token, &state.config.jwt_secret).map_err(|e| {
        warn!(error = %e, "Token validation failed");
        ApiError::Unauthorized
    })?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Audit logging middleware
///
/// One line per request with the acting user. Runs inside the auth layer so
/// the claims are available.
pub async fn audit_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let user_id = request
        .extensions()
        .get::<Claims>()
        .map(|c| c.sub.clone())
        .unwrap_or_else(|| "anonymous".to_string());

    let start = Instant::now();
    let response = next.run(request).await;
    let status = response.status();

    info!(
        method = %method,
        uri = %uri,
        user = %user_id,
        status = status.as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        "API request"
    );

    response
}
