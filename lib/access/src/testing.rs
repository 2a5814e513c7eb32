//! In-memory collaborators for tests.
//!
//! Compiled for this crate's own tests and, behind the `testing` feature,
//! for downstream crates' tests. Never wire these into a running server.

use async_trait::async_trait;
use medislot_core::SubjectId;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::StoreError;
use crate::identity::{ExternalIdentity, IdentitySessionAdapter, RequestCredentials};
use crate::store::RoleStore;
use crate::user::UserRecord;

/// Identity adapter backed by a fixed token → identity table.
#[derive(Debug, Default)]
pub struct StaticIdentityAdapter {
    sessions: HashMap<String, ExternalIdentity>,
}

impl StaticIdentityAdapter {
    /// Creates an adapter that recognizes no sessions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session token for a subject.
    #[must_use]
    pub fn with_session(mut self, token: &str, subject: &str) -> Self {
        self.sessions.insert(
            token.to_string(),
            ExternalIdentity::new(SubjectId::new(subject)),
        );
        self
    }

    /// Registers a session token for a fully specified identity.
    #[must_use]
    pub fn with_identity(mut self, token: &str, identity: ExternalIdentity) -> Self {
        self.sessions.insert(token.to_string(), identity);
        self
    }
}

#[async_trait]
impl IdentitySessionAdapter for StaticIdentityAdapter {
    async fn resolve_identity(&self, credentials: &RequestCredentials) -> Option<ExternalIdentity> {
        credentials
            .session_token()
            .and_then(|token| self.sessions.get(token))
            .cloned()
    }
}

#[derive(Debug, Default)]
struct Failures {
    queued: VecDeque<StoreError>,
    always: Option<StoreError>,
}

/// Role store backed by a map, with scriptable failures and latency.
#[derive(Debug, Default)]
pub struct InMemoryRoleStore {
    records: Mutex<HashMap<String, UserRecord>>,
    failures: Mutex<Failures>,
    latency: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl InMemoryRoleStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a record.
    pub fn insert(&self, record: UserRecord) {
        self.records
            .lock()
            .insert(record.subject_id().as_str().to_string(), record);
    }

    /// Makes the next `count` lookups fail with `error`.
    pub fn fail_next(&self, count: usize, error: StoreError) {
        let mut failures = self.failures.lock();
        failures
            .queued
            .extend(std::iter::repeat_n(error, count));
    }

    /// Makes every lookup fail with `error`.
    pub fn always_fail(&self, error: StoreError) {
        self.failures.lock().always = Some(error);
    }

    /// Delays every lookup by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Returns the number of lookups performed.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoleStore for InMemoryRoleStore {
    async fn find_by_subject(&self, subject: &SubjectId) -> Result<Option<UserRecord>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let failure = {
            let mut failures = self.failures.lock();
            failures.queued.pop_front().or_else(|| failures.always.clone())
        };
        if let Some(error) = failure {
            return Err(error);
        }

        Ok(self.records.lock().get(subject.as_str()).cloned())
    }
}
