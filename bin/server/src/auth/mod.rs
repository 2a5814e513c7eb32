//! Authentication for the medislot server.
//!
//! This module provides:
//! - OIDC login with the external identity provider
//! - Session verification (the request-time identity adapter)
//! - Extractors that resolve the caller's role and apply route policies
//!
//! # Authorization Model
//!
//! The identity provider only says *who* the caller is. *What* they may do
//! comes from the role stored locally for their subject, resolved fresh on
//! every request. Organization memberships in the token are carried along
//! for information and never grant a role.

pub mod extract;
pub mod oidc;
pub mod routes;

pub use extract::{AnyRole, Authorized, Caller, Credentials, RoutePolicy, StaffOrAdmin};
pub use oidc::{OidcClient, OidcError, OidcSessionVerifier};
pub use routes::LoginState;

/// Session cookie name. Holds the verified ID token.
pub const SESSION_COOKIE: &str = "__session";
