//! JSON API handlers.
//!
//! Route assembly, including which policy and security layer guards each
//! handler, lives in [`crate::app`].

pub mod access;
pub mod dev;
pub mod role;

/// Liveness probe. Touches no dependencies.
pub async fn healthz() -> &'static str {
    "ok"
}
