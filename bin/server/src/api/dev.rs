//! Development role override endpoints.
//!
//! Only functional when the server is built with the `dev-override`
//! feature. Production builds answer every request here with 403 before the
//! body is even read.

use axum::{
    Json,
    extract::{Request, State, rejection::JsonRejection},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use medislot_access::{DEV_ROLE_COOKIE, OverrideError, Role};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiError;
use crate::security::InputSchema;
use crate::state::AppState;

/// Body of `POST /api/dev/role`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetRoleRequest {
    pub role: Role,
}

impl InputSchema for SetRoleRequest {}

#[derive(Debug, Serialize)]
struct OverrideResponse {
    role: Option<Role>,
}

/// Rejects every dev route unless overrides are compiled in.
pub async fn require_dev_build(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.resolver.dev_override().is_enabled() {
        tracing::warn!(path = %request.uri().path(), "dev override requested in production build");
        return ApiError::Forbidden { role: None }.into_response();
    }
    next.run(request).await
}

/// Sets the development role cookie.
pub async fn set_role(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: Result<Json<SetRoleRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    // Covers what body validation cannot see, such as a missing JSON
    // content type.
    let Json(request) = body.map_err(|e| ApiError::validation(e.body_text()))?;
    let cookie = state
        .resolver
        .dev_override()
        .set_override(request.role)
        .map_err(forbidden)?;

    let max_age = time::Duration::try_from(cookie.max_age())
        .map_err(|e| ApiError::internal(format!("cookie max-age out of range: {e}")))?;
    let cookie = Cookie::build((cookie.name(), cookie.value()))
        .path(cookie.path())
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(max_age);

    tracing::info!(role = %request.role, "dev role override set");
    Ok((
        jar.add(cookie),
        Json(OverrideResponse {
            role: Some(request.role),
        }),
    ))
}

/// Clears the development role cookie.
pub async fn clear_role(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    state
        .resolver
        .dev_override()
        .clear_override()
        .map_err(forbidden)?;

    let removal = Cookie::build((DEV_ROLE_COOKIE, ""))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::ZERO);

    tracing::info!("dev role override cleared");
    Ok((
        StatusCode::OK,
        jar.add(removal),
        Json(OverrideResponse { role: None }),
    ))
}

fn forbidden(error: OverrideError) -> ApiError {
    tracing::warn!(error = %error, "dev override refused");
    ApiError::Forbidden { role: None }
}
