//! PostgreSQL persistence for the medislot server.
//!
//! This module provides:
//! - [`Database`]: the owned connection pool and its lifecycle
//! - [`PgRoleStore`]: role store lookups with transient/fatal classification
//! - [`PgRateLimitStore`]: rate-limit counters shared across processes
//!
//! Schema changes are applied outside the server; `migrations/` holds the
//! schema these queries expect.

pub mod rate_limit;
pub mod user;

pub use rate_limit::PgRateLimitStore;
pub use user::PgRoleStore;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::DatabaseConfig;

/// The process's connection pool.
///
/// Created once at startup and closed explicitly after the server has
/// drained, so in-flight queries finish before connections are dropped.
#[derive(Debug)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Opens the pool and checks that the database is reachable.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(&config.url)
            .await?;
        Ok(Self { pool })
    }

    /// Returns a handle to the pool.
    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    /// Closes every connection, waiting for checked-out ones to return.
    pub async fn close(self) {
        self.pool.close().await;
        tracing::info!("database pool closed");
    }
}

/// Connects to `DATABASE_URL` and applies the schema.
///
/// Only the `#[ignore]`d database tests call this; run them with
/// `cargo test -- --ignored` against a scratch database.
#[cfg(test)]
pub(crate) async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("connect to test database");
    sqlx::raw_sql(include_str!("../../migrations/0001_init.sql"))
        .execute(&pool)
        .await
        .expect("apply schema");
    pool
}
