//! Request extractors for credentials, resolved roles, and route guards.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use axum_extra::extract::CookieJar;
use medislot_access::{
    AccessGate, DEV_ROLE_COOKIE, DenyReason, GateState, RequestCredentials, Resolution,
    ResolvedRole, RoleSet,
};
use medislot_core::SubjectId;
use std::marker::PhantomData;
use std::sync::Arc;

use super::SESSION_COOKIE;
use crate::error::ApiError;
use crate::state::AppState;

/// Unverified credentials carried by the request.
///
/// The session token comes from the session cookie, or from an
/// `Authorization: Bearer` header when no cookie is present.
pub struct Credentials(pub RequestCredentials);

impl Credentials {
    /// Reads credentials from request headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let jar = CookieJar::from_headers(headers);
        let mut credentials = RequestCredentials::anonymous();

        let session = jar
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
            .or_else(|| bearer_token(headers));
        if let Some(token) = session {
            credentials = credentials.with_session_token(token);
        }

        if let Some(cookie) = jar.get(DEV_ROLE_COOKIE) {
            credentials = credentials.with_dev_role_cookie(cookie.value());
        }

        Self(credentials)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// The caller's resolved role. Rejects with 401 when there is no identity.
pub struct Caller(pub ResolvedRole);

impl<S> FromRequestParts<S> for Caller
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        let Credentials(credentials) = Credentials::from_headers(&parts.headers);

        let resolved = app_state
            .resolver
            .resolve(&credentials)
            .await
            .map_err(|_| {
                tracing::info!(route = %parts.uri.path(), "no verifiable identity");
                ApiError::Unauthenticated
            })?;

        Ok(Self(resolved))
    }
}

/// The required-role set guarding a route.
pub trait RoutePolicy: Send + Sync + 'static {
    /// Roles admitted by this policy.
    const REQUIRED: RoleSet;

    /// Runs the access gate for an already-resolved caller.
    fn authorize(resolved: ResolvedRole) -> Result<ResolvedRole, ApiError> {
        let gate = AccessGate::new(Self::REQUIRED);
        match gate.check(&Resolution::Resolved(resolved.clone())) {
            GateState::Allowed => Ok(resolved),
            GateState::Denied(DenyReason::Forbidden) => {
                let caller = resolved.subject().map(SubjectId::redacted);
                tracing::warn!(
                    caller = caller.as_deref(),
                    role = %resolved.role(),
                    required = %Self::REQUIRED,
                    "access denied"
                );
                Err(ApiError::Forbidden {
                    role: Some(resolved.role()),
                })
            }
            GateState::Denied(DenyReason::Unauthenticated) | GateState::Pending => {
                Err(ApiError::Unauthenticated)
            }
        }
    }
}

/// Any authenticated caller.
pub enum AnyRole {}

impl RoutePolicy for AnyRole {
    const REQUIRED: RoleSet = RoleSet::all();
}

/// Staff and administrators; the cross-user lookup policy.
pub enum StaffOrAdmin {}

impl RoutePolicy for StaffOrAdmin {
    const REQUIRED: RoleSet = AccessGate::cross_user().required();
}

/// A caller that passed the access gate for policy `P`.
pub struct Authorized<P: RoutePolicy> {
    pub resolved: ResolvedRole,
    _policy: PhantomData<fn() -> P>,
}

impl<P: RoutePolicy> Authorized<P> {
    /// Applies policy `P` to a resolved caller.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Forbidden`] when the caller's role is outside the
    /// policy.
    pub fn check(resolved: ResolvedRole) -> Result<Self, ApiError> {
        P::authorize(resolved).map(|resolved| Self {
            resolved,
            _policy: PhantomData,
        })
    }
}

impl<S, P> FromRequestParts<S> for Authorized<P>
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
    P: RoutePolicy,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Caller(resolved) = Caller::from_request_parts(parts, state).await?;
        Self::check(resolved)
    }
}
