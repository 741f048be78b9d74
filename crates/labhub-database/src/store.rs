//! Store traits consumed by the session and queue services.
//!
//! The services never see SQL or memory layouts; they hold
//! `Arc<dyn ...Store>` handles injected at construction time.

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use labhub_core::result::AppResult;
use labhub_core::types::id::{LabId, SessionId, UserId};
use labhub_entity::{LabSession, Laboratory, NewLabSession, QueueEntry, SessionState};

/// Read access to laboratories.
#[async_trait]
pub trait LaboratoryStore: Send + Sync + Debug {
    /// Look up a laboratory.
    async fn get_laboratory_by_id(&self, lab_id: LabId) -> AppResult<Option<Laboratory>>;
}

/// Partial update of a session record. `None` fields are left unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionUpdate {
    /// New end time.
    pub end_time: Option<DateTime<Utc>>,
    /// New state.
    pub state: Option<SessionState>,
}

impl SessionUpdate {
    /// Terminal update: `Completed`, ending at `end_time`.
    pub fn completed_at(end_time: DateTime<Utc>) -> Self {
        Self {
            end_time: Some(end_time),
            state: Some(SessionState::Completed),
        }
    }
}

/// Persistence for session records.
#[async_trait]
pub trait SessionStore: Send + Sync + Debug {
    /// Insert a new session.
    ///
    /// Fails with `Conflict` when `new.state` is `InProgress` and the owner
    /// already has an InProgress session in the same laboratory.
    async fn create_session(&self, new: NewLabSession) -> AppResult<LabSession>;

    /// Look up a session.
    async fn find_session(&self, session_id: SessionId) -> AppResult<Option<LabSession>>;

    /// Apply a partial update. Returns `false` when the session does not exist.
    async fn update_session(&self, session_id: SessionId, update: SessionUpdate)
    -> AppResult<bool>;

    /// Move an InProgress session to `Completed`, ending at `end_time`.
    ///
    /// Returns `true` only for the call that made the transition; `false`
    /// when the session is missing or already completed.
    async fn complete_session(
        &self,
        session_id: SessionId,
        end_time: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Number of InProgress sessions in a laboratory.
    async fn count_in_progress(&self, lab_id: LabId) -> AppResult<u64>;

    /// InProgress sessions whose `end_time` is at or before `now`.
    async fn find_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<LabSession>>;
}

/// Persistence for waiting-queue membership.
///
/// All mutations on one laboratory's queue are linearizable with respect to
/// each other.
#[async_trait]
pub trait QueueStore: Send + Sync + Debug {
    /// Append a user to the tail of a laboratory's queue.
    ///
    /// Fails with `Conflict` if the user is already queued there.
    async fn add_to_queue(&self, lab_id: LabId, user_id: UserId) -> AppResult<QueueEntry>;

    /// Atomically remove and return the head of the queue.
    async fn pop_queue(&self, lab_id: LabId) -> AppResult<Option<UserId>>;

    /// 1-based position of a user, or `None` if not queued.
    async fn queue_position(&self, lab_id: LabId, user_id: UserId) -> AppResult<Option<u64>>;

    /// Queued users, head first.
    async fn list_queued(&self, lab_id: LabId) -> AppResult<Vec<UserId>>;

    /// Remove a user's entry. Returns `false` if there was none.
    async fn remove_from_queue(&self, lab_id: LabId, user_id: UserId) -> AppResult<bool>;

    /// Laboratories that currently have at least one waiter.
    async fn labs_with_waiters(&self) -> AppResult<Vec<LabId>>;
}
