//! In-memory session records.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use labhub_core::error::AppError;
use labhub_core::result::AppResult;
use labhub_core::types::id::{LabId, SessionId};
use labhub_entity::{LabSession, NewLabSession, SessionState};

use crate::store::{SessionStore, SessionUpdate};

/// Session records backed by a map.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, LabSession>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All sessions, in no particular order.
    pub async fn all(&self) -> Vec<LabSession> {
        self.sessions.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, new: NewLabSession) -> AppResult<LabSession> {
        let mut sessions = self.sessions.write().await;

        if new.state == SessionState::InProgress
            && sessions
                .values()
                .any(|s| s.lab_id == new.lab_id && s.owner_id == new.owner_id && s.is_in_progress())
        {
            return Err(AppError::conflict(format!(
                "User {} already has a session in progress in laboratory {}",
                new.owner_id, new.lab_id
            )));
        }

        let session = LabSession {
            id: SessionId::new(),
            lab_id: new.lab_id,
            owner_id: new.owner_id,
            start_time: new.start_time,
            end_time: new.end_time,
            state: new.state,
        };
        sessions.insert(session.id, session.clone());
        debug!(session_id = %session.id, "Session stored");

        Ok(session)
    }

    async fn find_session(&self, session_id: SessionId) -> AppResult<Option<LabSession>> {
        Ok(self.sessions.read().await.get(&session_id).cloned())
    }

    async fn update_session(
        &self,
        session_id: SessionId,
        update: SessionUpdate,
    ) -> AppResult<bool> {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(&session_id) else {
            return Ok(false);
        };

        if let Some(end_time) = update.end_time {
            session.end_time = end_time;
        }
        if let Some(state) = update.state {
            session.state = state;
        }
        Ok(true)
    }

    async fn complete_session(
        &self,
        session_id: SessionId,
        end_time: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session_id) {
            Some(session) if !session.state.is_terminal() => {
                session.end_time = end_time;
                session.state = SessionState::Completed;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count_in_progress(&self, lab_id: LabId) -> AppResult<u64> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .filter(|s| s.lab_id == lab_id && s.is_in_progress())
            .count() as u64)
    }

    async fn find_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<LabSession>> {
        let sessions = self.sessions.read().await;
        let mut overdue: Vec<LabSession> = sessions
            .values()
            .filter(|s| s.is_overdue(now))
            .cloned()
            .collect();
        overdue.sort_by_key(|s| s.end_time);
        Ok(overdue)
    }
}
