//! Role lookup for the caller or, for staff, another subject.

use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};
use medislot_access::{ResolvedRole, Role};
use medislot_core::SubjectId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::{Caller, RoutePolicy, StaffOrAdmin};
use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters for `GET /api/user/role`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleQuery {
    /// Subject to look up instead of the caller.
    user_id: Option<String>,
}

/// A resolved role as returned to clients.
#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub role: Role,
    pub authenticated: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

impl From<&ResolvedRole> for RoleResponse {
    fn from(resolved: &ResolvedRole) -> Self {
        Self {
            role: resolved.role(),
            authenticated: resolved.authenticated(),
            degraded: resolved.degraded(),
        }
    }
}

/// Returns the caller's role, or the role of `userId` for staff and admins.
///
/// A target without a record reports `PATIENT`, the same default the caller
/// would get.
pub async fn get_role(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    query: Result<Query<RoleQuery>, QueryRejection>,
) -> Result<Json<RoleResponse>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::validation(e.body_text()))?;

    let Some(user_id) = query.user_id else {
        return Ok(Json(RoleResponse::from(&caller)));
    };

    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(ApiError::validation("userId must not be empty"));
    }

    let caller = StaffOrAdmin::authorize(caller)?;
    let target = SubjectId::new(user_id);
    let resolved = state.resolver.resolve_subject(&target).await;

    tracing::info!(
        caller_role = %caller.role(),
        target = %target.redacted(),
        target_role = %resolved.role(),
        "cross-user role lookup"
    );

    Ok(Json(RoleResponse::from(&resolved)))
}
