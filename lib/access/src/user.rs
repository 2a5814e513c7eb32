//! Local user records.
//!
//! A `UserRecord` maps an identity-provider subject to the locally
//! authoritative role. Records are created and updated by the webhook-sync
//! collaborator; this crate only ever reads them.

use chrono::{DateTime, Utc};
use medislot_core::{SubjectId, UserId};
use serde::{Deserialize, Serialize};

use crate::role::Role;

/// The locally persisted authorization record for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Internal platform user ID.
    internal_id: UserId,
    /// Identity-provider subject; unique across records.
    subject_id: SubjectId,
    /// The authoritative role.
    role: Role,
    /// When the record was created.
    created_at: DateTime<Utc>,
    /// When the record was last updated.
    updated_at: DateTime<Utc>,
}

impl UserRecord {
    /// Creates a fresh record for a subject.
    #[must_use]
    pub fn new(subject_id: SubjectId, role: Role) -> Self {
        let now = Utc::now();
        Self {
            internal_id: UserId::new(),
            subject_id,
            role,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reconstitutes a record from storage.
    #[must_use]
    pub fn with_all_fields(
        internal_id: UserId,
        subject_id: SubjectId,
        role: Role,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            internal_id,
            subject_id,
            role,
            created_at,
            updated_at,
        }
    }

    /// Returns the internal user ID.
    #[must_use]
    pub fn internal_id(&self) -> UserId {
        self.internal_id
    }

    /// Returns the identity-provider subject.
    #[must_use]
    pub fn subject_id(&self) -> &SubjectId {
        &self.subject_id
    }

    /// Returns the stored role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns when the record was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the record was last updated.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
