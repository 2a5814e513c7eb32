//! Development-only role override.
//!
//! Local development needs to exercise every role without provisioning IdP
//! users. The override lets a developer pin a role in a cookie that the
//! resolver consults before anything else.
//!
//! Availability is a property of the *build*, not of configuration. The
//! override is parameterized by a [`BuildProfile`] type whose
//! `ALLOWS_DEV_OVERRIDE` is a compile-time constant; the server selects
//! [`ActiveProfile`] from the `dev-override` cargo feature. In a
//! [`Production`] build every override path is a constant `false` branch:
//! nothing a request carries (cookie, header, body) and nothing in the
//! environment can reach it. Enabling the feature in a release build does
//! not compile.

use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::OverrideError;
use crate::role::Role;

#[cfg(all(feature = "dev-override", not(debug_assertions)))]
compile_error!("the `dev-override` feature must not be enabled in release builds");

/// Name of the development role cookie.
pub const DEV_ROLE_COOKIE: &str = "dev-user-role";

/// Lifetime of the development role cookie.
pub const DEV_ROLE_MAX_AGE: Duration = Duration::from_secs(86_400);

mod sealed {
    pub trait Sealed {}
}

/// Compile-time description of the build being run.
pub trait BuildProfile: sealed::Sealed + Send + Sync + 'static {
    /// Human-readable profile name for logs.
    const NAME: &'static str;
    /// Whether the development role override may be honored.
    const ALLOWS_DEV_OVERRIDE: bool;
}

/// Local development build.
#[derive(Debug)]
pub enum Development {}

/// Production build.
#[derive(Debug)]
pub enum Production {}

impl sealed::Sealed for Development {}
impl sealed::Sealed for Production {}

impl BuildProfile for Development {
    const NAME: &'static str = "development";
    const ALLOWS_DEV_OVERRIDE: bool = true;
}

impl BuildProfile for Production {
    const NAME: &'static str = "production";
    const ALLOWS_DEV_OVERRIDE: bool = false;
}

/// The profile of the running build.
#[cfg(feature = "dev-override")]
pub type ActiveProfile = Development;

/// The profile of the running build.
#[cfg(not(feature = "dev-override"))]
pub type ActiveProfile = Production;

/// A role override to be written as the development role cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevRoleCookie {
    role: Role,
    max_age: Duration,
}

impl DevRoleCookie {
    fn new(role: Role) -> Self {
        Self {
            role,
            max_age: DEV_ROLE_MAX_AGE,
        }
    }

    /// Returns the forced role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the cookie name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        DEV_ROLE_COOKIE
    }

    /// Returns the cookie value; always an enumerated role name.
    #[must_use]
    pub fn value(&self) -> &'static str {
        self.role.as_str()
    }

    /// Returns the cookie lifetime.
    #[must_use]
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Returns the cookie path; the whole application.
    #[must_use]
    pub fn path(&self) -> &'static str {
        "/"
    }
}

/// Reads and issues development role overrides for build profile `P`.
pub struct DevRoleOverride<P: BuildProfile = ActiveProfile> {
    _profile: PhantomData<fn() -> P>,
}

impl<P: BuildProfile> DevRoleOverride<P> {
    /// Creates the override for profile `P`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _profile: PhantomData,
        }
    }

    /// Returns true if this build honors overrides.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        P::ALLOWS_DEV_OVERRIDE
    }

    /// Returns the overridden role carried by a raw cookie value.
    ///
    /// Always `None` in builds that do not allow overrides. Values that are
    /// not an enumerated role are ignored.
    #[must_use]
    pub fn read(&self, cookie_value: Option<&str>) -> Option<Role> {
        if !P::ALLOWS_DEV_OVERRIDE {
            return None;
        }

        let value = cookie_value?;
        match value.parse::<Role>() {
            Ok(role) => Some(role),
            Err(err) => {
                debug!(error = %err, "ignoring malformed dev role cookie");
                None
            }
        }
    }

    /// Issues an override cookie for `role`.
    ///
    /// # Errors
    ///
    /// Returns [`OverrideError::Forbidden`] in builds that do not allow
    /// overrides; nothing is issued.
    pub fn set_override(&self, role: Role) -> Result<DevRoleCookie, OverrideError> {
        if !P::ALLOWS_DEV_OVERRIDE {
            warn!(profile = P::NAME, "rejected dev role override");
            return Err(OverrideError::Forbidden);
        }

        info!(role = %role, "dev role override issued");
        Ok(DevRoleCookie::new(role))
    }

    /// Authorizes removal of the override cookie.
    ///
    /// # Errors
    ///
    /// Returns [`OverrideError::Forbidden`] in builds that do not allow
    /// overrides.
    pub fn clear_override(&self) -> Result<(), OverrideError> {
        if !P::ALLOWS_DEV_OVERRIDE {
            warn!(profile = P::NAME, "rejected dev role override removal");
            return Err(OverrideError::Forbidden);
        }
        Ok(())
    }
}

impl<P: BuildProfile> Default for DevRoleOverride<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: BuildProfile> fmt::Debug for DevRoleOverride<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevRoleOverride")
            .field("profile", &P::NAME)
            .finish()
    }
}
