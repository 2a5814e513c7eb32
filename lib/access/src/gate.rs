//! Allow/deny decisions for routes and UI regions.
//!
//! The gate is tri-state. While resolution is in flight it reports
//! [`GateState::Pending`], and a pending gate is never allowed: callers must
//! render nothing protected until the state settles.

use tokio::sync::watch;

use crate::error::Unauthenticated;
use crate::resolver::ResolvedRole;
use crate::role::{Role, RoleSet};

/// Progress of role resolution as seen by the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Resolution has not finished.
    Pending,
    /// No verifiable identity.
    Unauthenticated,
    /// A role was resolved.
    Resolved(ResolvedRole),
}

impl From<Result<ResolvedRole, Unauthenticated>> for Resolution {
    fn from(result: Result<ResolvedRole, Unauthenticated>) -> Self {
        match result {
            Ok(resolved) => Self::Resolved(resolved),
            Err(Unauthenticated) => Self::Unauthenticated,
        }
    }
}

/// Why the gate denied access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Unauthenticated,
    Forbidden,
}

/// The gate's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Pending,
    Allowed,
    Denied(DenyReason),
}

impl GateState {
    /// Returns true once the decision can no longer change.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Returns true only for an explicit allow.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// An access check against a required-role set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessGate {
    required: RoleSet,
}

impl AccessGate {
    /// Creates a gate admitting any role in `required`.
    #[must_use]
    pub const fn new(required: RoleSet) -> Self {
        Self { required }
    }

    /// The gate guarding lookups of another user's role.
    #[must_use]
    pub const fn cross_user() -> Self {
        Self::new(RoleSet::staff_or_admin())
    }

    /// Returns the required-role set.
    #[must_use]
    pub const fn required(&self) -> RoleSet {
        self.required
    }

    /// Decides access for a resolution.
    #[must_use]
    pub fn check(&self, resolution: &Resolution) -> GateState {
        match resolution {
            Resolution::Pending => GateState::Pending,
            Resolution::Unauthenticated => GateState::Denied(DenyReason::Unauthenticated),
            Resolution::Resolved(resolved) if !resolved.authenticated() => {
                GateState::Denied(DenyReason::Unauthenticated)
            }
            Resolution::Resolved(resolved) => self.check_role(resolved.role()),
        }
    }

    /// Decides whether the caller may look up another user's role.
    #[must_use]
    pub fn check_cross_user(resolution: &Resolution) -> GateState {
        Self::cross_user().check(resolution)
    }

    /// Decides access for an already-resolved role.
    #[must_use]
    pub fn check_role(&self, role: Role) -> GateState {
        if self.required.contains(role) {
            GateState::Allowed
        } else {
            GateState::Denied(DenyReason::Forbidden)
        }
    }

    /// Starts an asynchronous check.
    ///
    /// The returned [`GateWatch`] reports `Pending` until the
    /// [`GateResolver`] completes. Dropping the resolver without completing
    /// settles the watch to `Denied(Unauthenticated)`.
    #[must_use]
    pub fn watch(&self) -> (GateResolver, GateWatch) {
        let (tx, rx) = watch::channel(GateState::Pending);
        (
            GateResolver {
                gate: *self,
                tx: Some(tx),
            },
            GateWatch { rx },
        )
    }
}

/// Completes an asynchronous gate check exactly once.
#[derive(Debug)]
pub struct GateResolver {
    gate: AccessGate,
    tx: Option<watch::Sender<GateState>>,
}

impl GateResolver {
    /// Settles the watch with the decision for `resolution`.
    ///
    /// Completing with [`Resolution::Pending`] is treated like dropping the
    /// resolver.
    pub fn complete(mut self, resolution: &Resolution) {
        let state = self.gate.check(resolution);
        if !state.is_settled() {
            return;
        }
        if let Some(tx) = self.tx.take() {
            tx.send_replace(state);
        }
    }
}

impl Drop for GateResolver {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            tx.send_replace(GateState::Denied(DenyReason::Unauthenticated));
        }
    }
}

/// Observes an asynchronous gate check.
#[derive(Debug, Clone)]
pub struct GateWatch {
    rx: watch::Receiver<GateState>,
}

impl GateWatch {
    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> GateState {
        *self.rx.borrow()
    }

    /// Waits until the state is no longer pending.
    ///
    /// If the resolver went away while the state was still pending, the
    /// result is `Denied(Unauthenticated)`.
    pub async fn settled(&mut self) -> GateState {
        let waited = self.rx.wait_for(GateState::is_settled).await.map(|state| *state);
        match waited {
            Ok(state) => state,
            Err(_) => {
                let last = *self.rx.borrow();
                if last.is_settled() {
                    last
                } else {
                    GateState::Denied(DenyReason::Unauthenticated)
                }
            }
        }
    }
}
