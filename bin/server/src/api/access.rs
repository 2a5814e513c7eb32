//! Access-gate decisions for clients that gate their own views.

use axum::{
    Json,
    extract::{Query, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use medislot_access::{AccessGate, DenyReason, GateState, Resolution, Role, RoleSet};
use serde::{Deserialize, Serialize};

use crate::auth::{AnyRole, Authorized};
use crate::error::ApiError;

/// Query parameters for `GET /api/access`.
#[derive(Debug, Deserialize)]
pub struct AccessQuery {
    /// Comma-separated required roles.
    roles: String,
}

/// The gate's decision for the caller.
#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub allowed: bool,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

/// Checks the caller against `roles`; 403 when the gate denies.
pub async fn check_access(
    caller: Authorized<AnyRole>,
    query: Result<Query<AccessQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::validation(e.body_text()))?;
    let required =
        RoleSet::parse_list(&query.roles).map_err(|e| ApiError::validation(e.to_string()))?;
    if required.is_empty() {
        return Err(ApiError::validation("roles must name at least one role"));
    }

    let role = caller.resolved.role();
    let state = AccessGate::new(required).check(&Resolution::Resolved(caller.resolved));

    let (status, reason) = match state {
        GateState::Allowed => (StatusCode::OK, None),
        GateState::Denied(DenyReason::Forbidden) => (StatusCode::FORBIDDEN, Some("forbidden")),
        // A resolved caller never leaves the gate pending or unauthenticated.
        GateState::Denied(DenyReason::Unauthenticated) | GateState::Pending => {
            return Err(ApiError::Unauthenticated);
        }
    };

    let body = AccessResponse {
        allowed: reason.is_none(),
        role,
        reason,
    };
    Ok((status, Json(body)).into_response())
}
