//! Login flow routes.
//!
//! These routes only establish or clear the session cookie. They never read
//! or write user records; roles come from the role store on each request.

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use std::sync::Arc;
use time::Duration as TimeDuration;

use super::SESSION_COOKIE;
use super::oidc::{AuthState, OidcClient};
use crate::config::SessionConfig;

/// Holds the PKCE verifier, nonce and CSRF token between login and callback.
const AUTH_STATE_COOKIE: &str = "auth_state";

/// How long a login attempt may take at the provider.
const AUTH_STATE_TTL: TimeDuration = TimeDuration::minutes(10);

/// State shared by the login flow routes.
pub struct LoginState {
    pub oidc_client: OidcClient,
    pub session_config: SessionConfig,
}

impl LoginState {
    fn cookie<'c>(&self, name: &'c str, value: String, max_age: TimeDuration) -> Cookie<'c> {
        Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .secure(self.session_config.secure_cookies)
            .same_site(SameSite::Lax)
            .max_age(max_age)
            .build()
    }
}

fn expired(name: &str) -> Cookie<'_> {
    Cookie::build((name, "")).path("/").max_age(TimeDuration::ZERO).build()
}

/// Builds the `/auth/*` routes.
pub fn router(state: Arc<LoginState>) -> Router {
    Router::new()
        .route("/auth/login", get(login))
        .route("/auth/callback", get(callback))
        .route("/auth/logout", get(logout))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: String,
    state: String,
}

/// Redirects to the identity provider.
pub async fn login(
    State(state): State<Arc<LoginState>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AuthError> {
    let (auth_url, auth_state) = state.oidc_client.authorization_url();
    let encoded = serde_json::to_string(&auth_state).map_err(|_| AuthError::InvalidAuthState)?;

    let jar = jar.add(state.cookie(AUTH_STATE_COOKIE, encoded, AUTH_STATE_TTL));
    Ok((jar, Redirect::to(&auth_url)))
}

/// Completes the login: verifies the code exchange and stores the ID token
/// as the session.
pub async fn callback(
    State(state): State<Arc<LoginState>>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AuthError> {
    let auth_state: AuthState = jar
        .get(AUTH_STATE_COOKIE)
        .ok_or(AuthError::MissingAuthState)
        .and_then(|c| serde_json::from_str(c.value()).map_err(|_| AuthError::InvalidAuthState))?;

    if query.state != auth_state.csrf_token {
        return Err(AuthError::CsrfMismatch);
    }

    let token = state
        .oidc_client
        .exchange_code(&query.code, &auth_state)
        .await
        .map_err(|e| AuthError::TokenExchange(e.to_string()))?;

    tracing::info!(subject = %token.subject.redacted(), "session established");

    let lifetime = TimeDuration::minutes(state.session_config.cookie_max_age_minutes);
    let jar = jar
        .add(state.cookie(SESSION_COOKIE, token.id_token, lifetime))
        .add(expired(AUTH_STATE_COOKIE));

    Ok((jar, Redirect::to("/")))
}

/// Clears the session cookie. There is no server-side session to revoke.
pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    (jar.add(expired(SESSION_COOKIE)), Redirect::to("/"))
}

/// Login flow failures.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing auth state cookie")]
    MissingAuthState,
    #[error("auth state cookie could not be read")]
    InvalidAuthState,
    #[error("CSRF token mismatch")]
    CsrfMismatch,
    #[error("token exchange failed: {0}")]
    TokenExchange(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::TokenExchange(_) => {
                tracing::error!(error = %self, "login failed");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Authentication failed")
                    .into_response();
            }
            Self::MissingAuthState | Self::InvalidAuthState | Self::CsrfMismatch => {
                StatusCode::BAD_REQUEST
            }
        };
        tracing::debug!(error = %self, "login rejected");
        (status, self.to_string()).into_response()
    }
}
