//! Authoritative role resolution.
//!
//! The resolver reconciles the identity provider's session with the locally
//! persisted role. Every failure path lands on [`Role::Patient`]; nothing
//! here can produce a role higher than the one stored for the subject.

use medislot_core::SubjectId;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, instrument};

use crate::dev_override::{ActiveProfile, BuildProfile, DevRoleOverride};
use crate::error::{StoreError, Unauthenticated};
use crate::identity::{IdentitySessionAdapter, RequestCredentials};
use crate::role::Role;
use crate::store::RetryingRoleStore;

/// Where a resolved role came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleSource {
    /// Forced by the development role cookie.
    DevOverride,
    /// Read from the subject's stored record.
    Store,
    /// No record exists yet; defaulted to the lowest privilege.
    DefaultNotFound,
    /// The store failed; defaulted to the lowest privilege.
    DefaultDegraded,
}

/// The outcome of resolving a role for one request or subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRole {
    role: Role,
    authenticated: bool,
    degraded: bool,
    subject: Option<SubjectId>,
    source: RoleSource,
}

impl ResolvedRole {
    /// A role read from a stored record.
    #[must_use]
    pub fn from_store(subject: SubjectId, role: Role) -> Self {
        Self {
            role,
            authenticated: true,
            degraded: false,
            subject: Some(subject),
            source: RoleSource::Store,
        }
    }

    /// The default for a subject with no record.
    #[must_use]
    pub fn not_found(subject: SubjectId) -> Self {
        Self {
            role: Role::lowest_privilege(),
            authenticated: true,
            degraded: false,
            subject: Some(subject),
            source: RoleSource::DefaultNotFound,
        }
    }

    /// The default after an unrecoverable store failure.
    #[must_use]
    pub fn store_failure(subject: SubjectId) -> Self {
        Self {
            role: Role::lowest_privilege(),
            authenticated: true,
            degraded: true,
            subject: Some(subject),
            source: RoleSource::DefaultDegraded,
        }
    }

    /// A role forced by the development override.
    #[must_use]
    pub fn dev_override(role: Role) -> Self {
        Self {
            role,
            authenticated: true,
            degraded: false,
            subject: None,
            source: RoleSource::DevOverride,
        }
    }

    /// Returns the resolved role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns true if an identity was established.
    #[must_use]
    pub fn authenticated(&self) -> bool {
        self.authenticated
    }

    /// Returns true if the role is a fallback after a store failure.
    #[must_use]
    pub fn degraded(&self) -> bool {
        self.degraded
    }

    /// Returns the subject the role belongs to; `None` for dev overrides.
    #[must_use]
    pub fn subject(&self) -> Option<&SubjectId> {
        self.subject.as_ref()
    }

    /// Returns where the role came from.
    #[must_use]
    pub fn source(&self) -> RoleSource {
        self.source
    }
}

/// Produces the authoritative role for a request.
pub struct RoleResolver<P: BuildProfile = ActiveProfile> {
    identity: Arc<dyn IdentitySessionAdapter>,
    store: RetryingRoleStore,
    dev_override: DevRoleOverride<P>,
}

impl<P: BuildProfile> RoleResolver<P> {
    /// Creates a resolver.
    #[must_use]
    pub fn new(identity: Arc<dyn IdentitySessionAdapter>, store: RetryingRoleStore) -> Self {
        Self {
            identity,
            store,
            dev_override: DevRoleOverride::new(),
        }
    }

    /// Returns the development override for this build.
    #[must_use]
    pub fn dev_override(&self) -> &DevRoleOverride<P> {
        &self.dev_override
    }

    /// Resolves the caller's role.
    ///
    /// # Errors
    ///
    /// Returns [`Unauthenticated`] when no verifiable identity is present.
    /// Store failures are not errors: they resolve to a degraded
    /// [`Role::Patient`].
    #[instrument(skip_all, fields(profile = P::NAME))]
    pub async fn resolve(
        &self,
        credentials: &RequestCredentials,
    ) -> Result<ResolvedRole, Unauthenticated> {
        if let Some(role) = self.dev_override.read(credentials.dev_role_cookie()) {
            debug!(role = %role, "role forced by dev override");
            return Ok(ResolvedRole::dev_override(role));
        }

        let identity = self
            .identity
            .resolve_identity(credentials)
            .await
            .ok_or(Unauthenticated)?;

        Ok(self.resolve_subject(identity.subject_id()).await)
    }

    /// Resolves the stored role of an arbitrary subject.
    ///
    /// Callers must authorize the cross-user lookup first.
    pub async fn resolve_subject(&self, subject: &SubjectId) -> ResolvedRole {
        match self.store.lookup(subject).await {
            Ok(Some(record)) => ResolvedRole::from_store(subject.clone(), record.role()),
            Ok(None) => {
                debug!(
                    subject = %subject.redacted(),
                    "no user record, defaulting to lowest privilege"
                );
                ResolvedRole::not_found(subject.clone())
            }
            Err(err) => {
                log_degraded(subject, &err);
                ResolvedRole::store_failure(subject.clone())
            }
        }
    }
}

fn log_degraded(subject: &SubjectId, err: &StoreError) {
    error!(
        subject = %subject.redacted(),
        error = %err,
        "role store failed, resolving degraded"
    );
}

impl<P: BuildProfile> fmt::Debug for RoleResolver<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleResolver")
            .field("retry", self.store.policy())
            .field("dev_override", &self.dev_override)
            .finish_non_exhaustive()
    }
}
