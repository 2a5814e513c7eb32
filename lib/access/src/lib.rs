//! Role resolution and access control for medislot.
//!
//! This crate provides:
//! - The role model (`Role`, `RoleSet`) and persisted `UserRecord`
//! - The identity seam (`IdentitySessionAdapter`, `ExternalIdentity`)
//! - Role store lookups with bounded retry (`RoleStore`, `RetryingRoleStore`)
//! - Authoritative role resolution (`RoleResolver`)
//! - Tri-state access decisions (`AccessGate`, `GateState`, `GateWatch`)
//! - A development-only role override gated by build profile
//! - Fixed-window rate limiting (`RateLimitStore`, `InMemoryRateLimiter`)
//!
//! # Failure Model
//!
//! A failure never escalates privilege. A missing user record resolves to
//! `PATIENT`; a role store that cannot be reached within the retry policy
//! resolves to `PATIENT` flagged as degraded. No verifiable identity is
//! `Unauthenticated`, which every gate denies.
//!
//! # Example
//!
//! ```
//! use medislot_access::{AccessGate, GateState, Resolution, ResolvedRole, Role, RoleSet};
//! use medislot_core::SubjectId;
//!
//! let gate = AccessGate::new(RoleSet::of(&[Role::Doctor, Role::Admin]));
//!
//! // Nothing is shown while resolution is in flight.
//! assert_eq!(gate.check(&Resolution::Pending), GateState::Pending);
//!
//! let doctor = ResolvedRole::from_store(SubjectId::new("user_2abc"), Role::Doctor);
//! assert!(gate.check(&Resolution::Resolved(doctor)).is_allowed());
//! ```

pub mod dev_override;
pub mod error;
pub mod gate;
pub mod identity;
pub mod oidc;
pub mod rate_limit;
pub mod resolver;
pub mod role;
pub mod store;
pub mod user;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types at crate root
pub use dev_override::{
    ActiveProfile, BuildProfile, DEV_ROLE_COOKIE, DevRoleCookie, DevRoleOverride, Development,
    Production,
};
pub use error::{OverrideError, RateLimitStoreError, StoreError, Unauthenticated};
pub use gate::{AccessGate, DenyReason, GateResolver, GateState, GateWatch, Resolution};
pub use identity::{ExternalIdentity, IdentitySessionAdapter, Membership, RequestCredentials};
pub use oidc::OidcConfig;
pub use rate_limit::{
    InMemoryRateLimiter, RateLimitBucket, RateLimitConfig, RateLimitDecision, RateLimitStore,
};
pub use resolver::{ResolvedRole, RoleResolver, RoleSource};
pub use role::{ParseRoleError, Role, RoleSet};
pub use store::{RetryPolicy, RetryingRoleStore, RoleStore};
pub use user::UserRecord;
