//! Identity-provider subject identifiers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of hex characters kept from the subject digest in log output.
const REDACTED_LEN: usize = 12;

/// Stable opaque identifier assigned by the identity provider to a principal.
///
/// Subjects are personal data in a healthcare context. The `Debug`
/// implementation prints the redacted form; use [`SubjectId::as_str`] when the
/// raw value is actually needed (database lookups).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    /// Creates a subject identifier from the provider's raw value.
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self(subject.into())
    }

    /// Returns the raw subject value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a stable, non-reversible token for logs.
    ///
    /// The same subject always redacts to the same token so log lines can be
    /// correlated without exposing the identifier itself.
    #[must_use]
    pub fn redacted(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        let mut token = hex::encode(digest);
        token.truncate(REDACTED_LEN);
        format!("sub#{token}")
    }
}

impl fmt::Debug for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SubjectId").field(&self.redacted()).finish()
    }
}

impl From<String> for SubjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SubjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
