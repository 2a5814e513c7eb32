//! Rate-limit counters shared by every server process.
//!
//! Each hit is a single upsert: the row for the key is created, rolled over
//! to a fresh window, or incremented, and the resulting count is returned in
//! the same statement. Concurrent hits from any number of processes are
//! serialized by the row lock, so the count is exact.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use medislot_access::{RateLimitConfig, RateLimitDecision, RateLimitStore, RateLimitStoreError};
use sqlx::{FromRow, PgPool};
use std::time::Duration;

#[derive(FromRow)]
struct HitRow {
    count: i64,
    window_start: DateTime<Utc>,
    now: DateTime<Utc>,
}

/// PostgreSQL-backed rate-limit store.
pub struct PgRateLimitStore {
    pool: PgPool,
}

impl PgRateLimitStore {
    /// Creates a new store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Deletes buckets idle for longer than `max_window`.
    pub async fn purge_expired(&self, max_window: Duration) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM rate_limit_buckets
            WHERE window_start + make_interval(secs => $1) <= NOW()
            "#,
        )
        .bind(max_window.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RateLimitStore for PgRateLimitStore {
    async fn check_and_increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitDecision, RateLimitStoreError> {
        let row: HitRow = sqlx::query_as(
            r#"
            INSERT INTO rate_limit_buckets AS b (key, window_start, count)
            VALUES ($1, NOW(), 1)
            ON CONFLICT (key) DO UPDATE SET
                window_start = CASE
                    WHEN b.window_start + make_interval(secs => $2) <= NOW() THEN NOW()
                    ELSE b.window_start
                END,
                count = CASE
                    WHEN b.window_start + make_interval(secs => $2) <= NOW() THEN 1
                    ELSE b.count + 1
                END
            RETURNING count::BIGINT AS count, window_start, NOW() AS now
            "#,
        )
        .bind(key)
        .bind(config.window().as_secs_f64())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RateLimitStoreError {
            reason: e.to_string(),
        })?;

        Ok(decide(row, config))
    }
}

fn decide(row: HitRow, config: &RateLimitConfig) -> RateLimitDecision {
    let resets_at = row.window_start + chrono::Duration::seconds(config.window_seconds as i64);
    let resets_in = (resets_at - row.now).to_std().unwrap_or(Duration::ZERO);
    let limit = i64::from(config.requests);

    if row.count > limit {
        RateLimitDecision::Limited {
            retry_after: resets_in,
        }
    } else {
        RateLimitDecision::Allowed {
            remaining: u32::try_from(limit - row.count).unwrap_or(0),
            resets_in,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(count: i64, elapsed_secs: i64) -> HitRow {
        let window_start = Utc::now();
        HitRow {
            count,
            window_start,
            now: window_start + chrono::Duration::seconds(elapsed_secs),
        }
    }

    #[test]
    fn within_limit_is_allowed() {
        let decision = decide(hit(1, 0), &RateLimitConfig::per_minute(50));
        assert_eq!(
            decision,
            RateLimitDecision::Allowed {
                remaining: 49,
                resets_in: Duration::from_secs(60),
            }
        );
    }

    #[test]
    fn last_slot_is_allowed() {
        let decision = decide(hit(50, 10), &RateLimitConfig::per_minute(50));
        assert!(decision.is_allowed());
        assert_eq!(decision.remaining(), 0);
    }

    #[test]
    fn over_limit_reports_remaining_window() {
        let decision = decide(hit(51, 15), &RateLimitConfig::per_minute(50));
        assert_eq!(
            decision,
            RateLimitDecision::Limited {
                retry_after: Duration::from_secs(45),
            }
        );
        assert_eq!(decision.retry_after_secs(), Some(45));
    }

    #[test]
    fn clock_skew_never_goes_negative() {
        let decision = decide(hit(51, 120), &RateLimitConfig::per_minute(50));
        assert_eq!(decision.retry_after_secs(), Some(1));
    }

    mod postgres {
        use super::*;
        use crate::db::test_pool;

        fn unique_key() -> String {
            format!("test:{}", medislot_core::UserId::new())
        }

        #[tokio::test]
        #[ignore = "requires DATABASE_URL"]
        async fn fifty_first_hit_is_limited_until_window_rolls_over() {
            let pool = test_pool().await;
            let store = PgRateLimitStore::new(pool.clone());
            let config = RateLimitConfig::per_minute(50);
            let key = unique_key();

            for n in 1..=50u32 {
                let decision = store
                    .check_and_increment(&key, &config)
                    .await
                    .expect("hit");
                assert_eq!(decision.remaining(), 50 - n, "hit {n}");
            }
            let limited = store
                .check_and_increment(&key, &config)
                .await
                .expect("hit");
            assert!(!limited.is_allowed());
            assert!(limited.retry_after_secs().is_some_and(|s| (1..=60).contains(&s)));

            sqlx::query(
                "UPDATE rate_limit_buckets \
                 SET window_start = NOW() - make_interval(secs => 61) WHERE key = $1",
            )
            .bind(&key)
            .execute(&pool)
            .await
            .expect("age bucket");

            let rolled = store
                .check_and_increment(&key, &config)
                .await
                .expect("hit");
            assert!(rolled.is_allowed());
            assert_eq!(rolled.remaining(), 49);
        }

        #[tokio::test]
        #[ignore = "requires DATABASE_URL"]
        async fn purge_removes_only_expired_buckets() {
            let pool = test_pool().await;
            let store = PgRateLimitStore::new(pool.clone());
            let config = RateLimitConfig::per_minute(50);
            let (stale, fresh) = (unique_key(), unique_key());

            for key in [&stale, &fresh] {
                store
                    .check_and_increment(key, &config)
                    .await
                    .expect("hit");
            }
            sqlx::query(
                "UPDATE rate_limit_buckets \
                 SET window_start = NOW() - make_interval(secs => 3600) WHERE key = $1",
            )
            .bind(&stale)
            .execute(&pool)
            .await
            .expect("age bucket");

            let purged = store
                .purge_expired(Duration::from_secs(60))
                .await
                .expect("purge");
            assert!(purged >= 1);

            let remaining: Vec<String> =
                sqlx::query_scalar("SELECT key FROM rate_limit_buckets WHERE key = ANY($1)")
                    .bind(vec![stale.clone(), fresh.clone()])
                    .fetch_all(&pool)
                    .await
                    .expect("select");
            assert_eq!(remaining, vec![fresh]);
        }
    }
}
