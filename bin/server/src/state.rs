//! Shared application state.

use medislot_access::{RateLimitConfig, RateLimitStore, RoleResolver};
use std::sync::Arc;

use crate::config::SecuritySettings;

/// State shared by the API routes.
pub struct AppState {
    /// Resolves the caller's role on each request.
    pub resolver: RoleResolver,
    /// Counter storage for rate-limited routes.
    pub rate_limits: Arc<dyn RateLimitStore>,
    /// Limit applied to role lookups.
    pub role_lookup_limit: RateLimitConfig,
    /// Request hardening settings.
    pub security: SecuritySettings,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(
        resolver: RoleResolver,
        rate_limits: Arc<dyn RateLimitStore>,
        role_lookup_limit: RateLimitConfig,
        security: SecuritySettings,
    ) -> Self {
        Self {
            resolver,
            rate_limits,
            role_lookup_limit,
            security,
        }
    }
}
