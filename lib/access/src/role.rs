//! Role and required-role types for access control.
//!
//! Roles are an unordered enumeration. Authorization is always a
//! set-membership question ("is the caller's role in {STAFF, ADMIN}?"),
//! never a threshold comparison, so no `Ord` is derived here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Authorization role persisted on a local user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// Default role; lowest privilege.
    Patient,
    /// Clinician with access to their own schedule and patients.
    Doctor,
    /// Clinic staff; may look up other users' roles.
    Staff,
    /// Platform administrator.
    Admin,
}

impl Role {
    /// All roles, in declaration order.
    pub const ALL: [Role; 4] = [Role::Patient, Role::Doctor, Role::Staff, Role::Admin];

    /// The role every failed or incomplete resolution falls back to.
    #[must_use]
    pub const fn lowest_privilege() -> Self {
        Self::Patient
    }

    /// Returns the wire/storage name of the role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Patient => "PATIENT",
            Self::Doctor => "DOCTOR",
            Self::Staff => "STAFF",
            Self::Admin => "ADMIN",
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Self::Patient => 1 << 0,
            Self::Doctor => 1 << 1,
            Self::Staff => 1 << 2,
            Self::Admin => 1 << 3,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when text does not name one of the enumerated roles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {value:?}")]
pub struct ParseRoleError {
    /// The rejected input.
    pub value: String,
}

impl FromStr for Role {
    type Err = ParseRoleError;

    /// Parses a role name case-insensitively.
    ///
    /// Only the four enumerated names are accepted. Anything else (including
    /// surrounding whitespace) is rejected rather than mapped to a default.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseRoleError {
                value: s.to_string(),
            })
    }
}

/// A set of roles, used as the required-role set of a route or UI region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RoleSet {
    bits: u8,
}

impl RoleSet {
    /// The empty set. Nothing is allowed through an empty requirement.
    #[must_use]
    pub const fn none() -> Self {
        Self { bits: 0 }
    }

    /// Every role.
    #[must_use]
    pub const fn all() -> Self {
        Self::of(&Role::ALL)
    }

    /// A set containing exactly the given roles.
    #[must_use]
    pub const fn of(roles: &[Role]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < roles.len() {
            bits |= roles[i].bit();
            i += 1;
        }
        Self { bits }
    }

    /// The roles allowed to inspect other users' roles.
    #[must_use]
    pub const fn staff_or_admin() -> Self {
        Self::of(&[Role::Staff, Role::Admin])
    }

    /// Returns a copy of this set with `role` added.
    #[must_use]
    pub const fn with(self, role: Role) -> Self {
        Self {
            bits: self.bits | role.bit(),
        }
    }

    /// Returns true if `role` is a member of the set.
    #[must_use]
    pub const fn contains(&self, role: Role) -> bool {
        self.bits & role.bit() != 0
    }

    /// Returns true if the set has no members.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Iterates the members in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        Role::ALL.into_iter().filter(|role| self.contains(*role))
    }

    /// Parses a comma-separated list of role names.
    ///
    /// # Errors
    ///
    /// Returns the first name that is not an enumerated role.
    pub fn parse_list(list: &str) -> Result<Self, ParseRoleError> {
        list.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .try_fold(Self::none(), |set, name| {
                name.parse::<Role>().map(|role| set.with(role))
            })
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        iter.into_iter().fold(Self::none(), RoleSet::with)
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|role| role.as_str()).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}
