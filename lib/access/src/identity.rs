//! External identity extraction.
//!
//! The identity provider authenticates users and signs their session tokens.
//! An [`IdentitySessionAdapter`] turns the credentials carried by a request
//! into a verified [`ExternalIdentity`], or nothing. It never consults the
//! role store and never reports *why* a session was rejected.

use async_trait::async_trait;
use medislot_core::SubjectId;
use serde::{Deserialize, Serialize};

/// Membership of the principal in an identity-provider organization.
///
/// Informational only: organization roles never grant local privilege.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// The provider's organization identifier.
    pub organization_id: String,
    /// The provider-side role within the organization, if reported.
    pub role: Option<String>,
}

impl Membership {
    /// Creates a membership without a provider-side role.
    #[must_use]
    pub fn new(organization_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            role: None,
        }
    }

    /// Sets the provider-side role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

/// A verified principal as reported by the identity provider for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    subject_id: SubjectId,
    organization_memberships: Vec<Membership>,
}

impl ExternalIdentity {
    /// Creates an identity with no organization memberships.
    #[must_use]
    pub fn new(subject_id: SubjectId) -> Self {
        Self {
            subject_id,
            organization_memberships: Vec::new(),
        }
    }

    /// Sets the organization memberships, preserving order.
    #[must_use]
    pub fn with_memberships(mut self, memberships: Vec<Membership>) -> Self {
        self.organization_memberships = memberships;
        self
    }

    /// Returns the verified subject identifier.
    #[must_use]
    pub fn subject_id(&self) -> &SubjectId {
        &self.subject_id
    }

    /// Returns the organization memberships in provider order.
    #[must_use]
    pub fn organization_memberships(&self) -> &[Membership] {
        &self.organization_memberships
    }
}

/// Raw, unverified credentials pulled off an inbound request.
#[derive(Debug, Clone, Default)]
pub struct RequestCredentials {
    session_token: Option<String>,
    dev_role_cookie: Option<String>,
}

impl RequestCredentials {
    /// Credentials carrying nothing.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Sets the session token (cookie or bearer header value).
    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Sets the raw value of the development role cookie.
    #[must_use]
    pub fn with_dev_role_cookie(mut self, value: impl Into<String>) -> Self {
        self.dev_role_cookie = Some(value.into());
        self
    }

    /// Returns the session token, if any.
    #[must_use]
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// Returns the raw development role cookie value, if any.
    #[must_use]
    pub fn dev_role_cookie(&self) -> Option<&str> {
        self.dev_role_cookie.as_deref()
    }
}

/// Verifies request credentials against the identity provider.
#[async_trait]
pub trait IdentitySessionAdapter: Send + Sync {
    /// Returns the verified identity, or `None` when the session is absent
    /// or fails verification for any reason.
    async fn resolve_identity(&self, credentials: &RequestCredentials) -> Option<ExternalIdentity>;
}
