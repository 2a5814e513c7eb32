//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables. Nested keys use
//! `__` as the separator, e.g. `DATABASE__URL` or `ROLE_STORE__MAX_ATTEMPTS`.
//!
//! See [`OidcConfig`](medislot_access::OidcConfig) for identity provider
//! configuration and [`RetryPolicy`](medislot_access::RetryPolicy) for role
//! store retry tuning.

use medislot_access::{OidcConfig, RateLimitConfig, RetryPolicy};
use serde::Deserialize;
use std::time::Duration;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// PostgreSQL connection settings.
    pub database: DatabaseConfig,

    /// OIDC authentication configuration.
    pub oidc: OidcConfig,

    /// Session cookie configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Retry policy for role store lookups.
    #[serde(default)]
    pub role_store: RetryPolicy,

    /// Rate limiting configuration.
    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    /// Request hardening configuration.
    #[serde(default)]
    pub security: SecuritySettings,
}

fn default_bind_address() -> String {
    "0.0.0.0:3000".to_string()
}

/// Connection pool settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL database connection URL.
    pub url: String,

    /// Maximum pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long to wait for a pooled connection before giving up, in
    /// milliseconds. Kept below the role store ceiling so pool exhaustion
    /// surfaces as a retryable error.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_ms() -> u64 {
    500
}

impl DatabaseConfig {
    /// Returns the pool acquire timeout.
    #[must_use]
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Lifetime of the session cookie in minutes. The ID token inside it
    /// carries its own expiry, which is enforced on every request.
    #[serde(default = "default_cookie_max_age_minutes")]
    pub cookie_max_age_minutes: i64,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Defaults to true for production safety; set to false for local HTTP development.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
}

fn default_cookie_max_age_minutes() -> i64 {
    60
}

fn default_secure_cookies() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_max_age_minutes: default_cookie_max_age_minutes(),
            secure_cookies: default_secure_cookies(),
        }
    }
}

/// Where rate-limit counters live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitBackend {
    /// Per-process counters. Only correct for a single server process.
    #[default]
    Memory,
    /// Counters shared by every process through PostgreSQL.
    Postgres,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    /// Counter storage.
    #[serde(default)]
    pub backend: RateLimitBackend,

    /// Limit applied to role lookups.
    #[serde(default = "default_role_lookup_limit")]
    pub role_lookup: RateLimitConfig,

    /// Interval between sweeps of expired buckets, in seconds.
    #[serde(default = "default_purge_interval_seconds")]
    pub purge_interval_seconds: u64,
}

fn default_role_lookup_limit() -> RateLimitConfig {
    RateLimitConfig::per_minute(50)
}

fn default_purge_interval_seconds() -> u64 {
    60
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            backend: RateLimitBackend::default(),
            role_lookup: default_role_lookup_limit(),
            purge_interval_seconds: default_purge_interval_seconds(),
        }
    }
}

/// Request hardening configuration.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SecuritySettings {
    /// Use the first `X-Forwarded-For` hop as the client identifier. Only
    /// enable behind a proxy that overwrites the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,

    /// Largest request body accepted by validated endpoints, in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_max_body_bytes() -> usize {
    16 * 1024
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            trust_forwarded_for: false,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_builder(config::Config::builder().add_source(
            config::Environment::default()
                .separator("__")
                .try_parsing(true),
        ))
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, config::ConfigError> {
        builder.build()?.try_deserialize()
    }
}
