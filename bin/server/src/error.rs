//! HTTP error taxonomy.
//!
//! Every rejection the API produces goes through [`ApiError`]. Details are
//! logged server-side; clients only ever see a fixed message and the status
//! code, plus the caller's role when it is known.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use medislot_access::Role;
use serde::Serialize;

/// Errors surfaced to API clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No verifiable identity on the request.
    #[error("unauthenticated")]
    Unauthenticated,
    /// The caller's role is not allowed here.
    #[error("forbidden for role {role:?}")]
    Forbidden { role: Option<Role> },
    /// The caller exceeded a rate limit.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    /// A parameter or body failed validation.
    #[error("validation failed: {reason}")]
    Validation { reason: String },
    /// Anything else. The reason is logged, never returned.
    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl ApiError {
    /// Creates a validation error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Returns the HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "Unauthenticated",
            Self::Forbidden { .. } => "Forbidden",
            Self::RateLimited { .. } => "Too many requests",
            Self::Validation { .. } => "Invalid request",
            Self::Internal { .. } => "Internal server error",
        }
    }
}

/// JSON body of an error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticated: Option<bool>,
    pub error: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Internal { reason } => tracing::error!(%reason, "request failed"),
            Self::Validation { reason } => tracing::debug!(%reason, "request rejected"),
            other => tracing::debug!(error = %other, "request rejected"),
        }

        let (role, authenticated) = match &self {
            Self::Unauthenticated => (None, Some(false)),
            // Only a resolved caller has a known role and is known to be signed in.
            Self::Forbidden { role } => (*role, role.map(|_| true)),
            _ => (None, None),
        };
        let body = ErrorBody {
            role,
            authenticated,
            error: self.public_message(),
        };

        let mut response = (status, Json(body)).into_response();
        if let Self::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}
