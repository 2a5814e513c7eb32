//! Role store backed by the `users` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use medislot_access::{Role, RoleStore, StoreError, UserRecord};
use medislot_core::{SubjectId, UserId};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

/// Row type for user queries.
#[derive(FromRow)]
struct UserRow {
    id: String,
    subject_id: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn try_into_record(self) -> Result<UserRecord, StoreError> {
        let id = UserId::from_str(&self.id)
            .map_err(|e| StoreError::fatal(format!("invalid user id '{}': {}", self.id, e)))?;
        let role = Role::from_str(&self.role)
            .map_err(|e| StoreError::fatal(format!("invalid stored role: {}", e)))?;
        Ok(UserRecord::with_all_fields(
            id,
            SubjectId::new(self.subject_id),
            role,
            self.created_at,
            self.updated_at,
        ))
    }
}

/// Read-only role store over PostgreSQL.
pub struct PgRoleStore {
    pool: PgPool,
}

impl PgRoleStore {
    /// Creates a new role store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleStore for PgRoleStore {
    async fn find_by_subject(&self, subject: &SubjectId) -> Result<Option<UserRecord>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, subject_id, role, created_at, updated_at
            FROM users
            WHERE subject_id = $1
            "#,
        )
        .bind(subject.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        row.map(UserRow::try_into_record).transpose()
    }
}

/// Sorts a driver error into retryable and non-retryable failures.
pub(crate) fn classify(err: sqlx::Error) -> StoreError {
    let transient = match &err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db.code().is_some_and(|code| is_transient_sqlstate(&code)),
        _ => false,
    };

    if transient {
        StoreError::transient(err.to_string())
    } else {
        StoreError::fatal(err.to_string())
    }
}

/// SQLSTATEs worth retrying: connection exceptions, too many connections,
/// operator-initiated shutdown, and serialization failures or deadlocks.
fn is_transient_sqlstate(code: &str) -> bool {
    code.starts_with("08")
        || matches!(
            code,
            "53300" | "57P01" | "57P02" | "57P03" | "40001" | "40P01"
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn row(role: &str) -> UserRow {
        UserRow {
            id: UserId::new().to_string(),
            subject_id: "user_2abc".to_string(),
            role: role.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn row_converts_to_record() {
        let record = row("DOCTOR").try_into_record().expect("valid row");
        assert_eq!(record.role(), Role::Doctor);
        assert_eq!(record.subject_id().as_str(), "user_2abc");
    }

    #[test]
    fn unknown_stored_role_is_fatal() {
        let err = row("SUPERUSER").try_into_record().expect_err("unknown role");
        assert!(!err.is_transient());
    }

    #[test]
    fn invalid_stored_id_is_fatal() {
        let mut bad = row("ADMIN");
        bad.id = "not-a-ulid".to_string();
        assert!(!bad.try_into_record().expect_err("bad id").is_transient());
    }

    #[test]
    fn connection_level_failures_are_transient() {
        assert!(classify(sqlx::Error::PoolTimedOut).is_transient());
        assert!(
            classify(sqlx::Error::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "reset by peer"
            )))
            .is_transient()
        );
        assert!(classify(sqlx::Error::Protocol("unexpected eof".into())).is_transient());
    }

    #[test]
    fn query_level_failures_are_fatal() {
        assert!(!classify(sqlx::Error::PoolClosed).is_transient());
        assert!(!classify(sqlx::Error::RowNotFound).is_transient());
        assert!(!classify(sqlx::Error::ColumnNotFound("role".into())).is_transient());
    }

    #[test]
    fn sqlstate_classification() {
        for code in ["08000", "08006", "53300", "57P01", "40001", "40P01"] {
            assert!(is_transient_sqlstate(code), "{code} should be transient");
        }
        for code in ["23505", "42601", "42P01", "22P02"] {
            assert!(!is_transient_sqlstate(code), "{code} should be fatal");
        }
    }

    mod postgres {
        use super::*;
        use crate::db::test_pool;

        #[tokio::test]
        #[ignore = "requires DATABASE_URL"]
        async fn finds_stored_role_by_subject() {
            let pool = test_pool().await;
            let id = UserId::new();
            let subject = format!("sub_{id}");
            sqlx::query("INSERT INTO users (id, subject_id, role) VALUES ($1, $2, 'DOCTOR')")
                .bind(id.to_string())
                .bind(&subject)
                .execute(&pool)
                .await
                .expect("insert user");

            let record = PgRoleStore::new(pool)
                .find_by_subject(&SubjectId::new(subject.clone()))
                .await
                .expect("lookup")
                .expect("user exists");

            assert_eq!(record.internal_id(), id);
            assert_eq!(record.subject_id().as_str(), subject);
            assert_eq!(record.role(), Role::Doctor);
        }

        #[tokio::test]
        #[ignore = "requires DATABASE_URL"]
        async fn unknown_subject_is_none() {
            let pool = test_pool().await;
            let subject = SubjectId::new(format!("sub_missing_{}", UserId::new()));

            let found = PgRoleStore::new(pool)
                .find_by_subject(&subject)
                .await
                .expect("lookup");

            assert!(found.is_none());
        }
    }
}
