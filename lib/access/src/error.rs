//! Error types for the access crate.
//!
//! The taxonomy is deliberately small:
//! - `Unauthenticated`: no verifiable identity on the request
//! - `StoreError`: role store failures, classified transient or fatal
//! - `OverrideError`: the dev role override is unavailable in this build
//! - `RateLimitStoreError`: the shared rate-limit counter could not be updated
//!
//! `Forbidden` is not an error here; it is a [`DenyReason`](crate::gate::DenyReason)
//! produced by the access gate. A missing user record is not an error either:
//! lookups return `Ok(None)`.

/// No verifiable identity was present on the request.
///
/// Absent and invalid sessions are indistinguishable by design of the
/// identity adapter contract, so this carries no detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no verifiable identity on the request")]
pub struct Unauthenticated;

/// Errors from role store lookups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store was briefly unavailable; the lookup may succeed if retried.
    #[error("transient role store failure: {reason}")]
    Transient { reason: String },
    /// The lookup cannot succeed by retrying, or retries were exhausted.
    #[error("fatal role store failure: {reason}")]
    Fatal { reason: String },
}

impl StoreError {
    /// Creates a transient error.
    #[must_use]
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
        }
    }

    /// Creates a fatal error.
    #[must_use]
    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal {
            reason: reason.into(),
        }
    }

    /// Returns true if the failure is worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Errors from the development role override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OverrideError {
    /// The running build does not permit role overrides.
    #[error("role override is not available in this build")]
    Forbidden,
}

/// The rate-limit counter store could not be reached or updated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rate limit store unavailable: {reason}")]
pub struct RateLimitStoreError {
    /// Error details.
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_classification() {
        assert!(StoreError::transient("connection reset").is_transient());
        assert!(!StoreError::fatal("unique violation").is_transient());
    }

    #[test]
    fn store_error_display_includes_reason() {
        let err = StoreError::fatal("retries exhausted");
        assert!(err.to_string().contains("fatal"));
        assert!(err.to_string().contains("retries exhausted"));
    }

    #[test]
    fn unauthenticated_display() {
        assert!(Unauthenticated.to_string().contains("identity"));
    }
}
