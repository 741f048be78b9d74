//! Session repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use labhub_core::error::{AppError, ErrorKind};
use labhub_core::result::AppResult;
use labhub_core::types::id::{LabId, SessionId};
use labhub_entity::{LabSession, NewLabSession};

use super::is_unique_violation;
use crate::store::{SessionStore, SessionUpdate};

const SESSION_COLUMNS: &str = "id, lab_id, owner_id, start_time, end_time, state";

/// Repository for the `lab_sessions` table.
///
/// The one-InProgress-session-per-owner rule is enforced by the partial
/// unique index `lab_sessions_one_active`.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    /// Create a new session repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SessionRepository {
    async fn create_session(&self, new: NewLabSession) -> AppResult<LabSession> {
        sqlx::query_as::<_, LabSession>(&format!(
            "INSERT INTO lab_sessions (id, lab_id, owner_id, start_time, end_time, state) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {SESSION_COLUMNS}"
        ))
        .bind(SessionId::new())
        .bind(new.lab_id)
        .bind(new.owner_id)
        .bind(new.start_time)
        .bind(new.end_time)
        .bind(new.state)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return AppError::conflict(format!(
                    "User {} already has a session in progress in laboratory {}",
                    new.owner_id, new.lab_id
                ));
            }
            AppError::with_source(ErrorKind::Database, "Failed to create session", e)
        })
    }

    async fn find_session(&self, session_id: SessionId) -> AppResult<Option<LabSession>> {
        sqlx::query_as::<_, LabSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM lab_sessions WHERE id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find session", e))
    }

    async fn update_session(
        &self,
        session_id: SessionId,
        update: SessionUpdate,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE lab_sessions SET end_time = COALESCE($2, end_time), \
             state = COALESCE($3, state) WHERE id = $1",
        )
        .bind(session_id)
        .bind(update.end_time)
        .bind(update.state)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to update session", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn complete_session(
        &self,
        session_id: SessionId,
        end_time: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE lab_sessions SET end_time = $2, state = 'completed' \
             WHERE id = $1 AND state = 'in_progress'",
        )
        .bind(session_id)
        .bind(end_time)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to complete session", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_in_progress(&self, lab_id: LabId) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM lab_sessions WHERE lab_id = $1 AND state = 'in_progress'",
        )
        .bind(lab_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to count active sessions", e)
        })?;
        Ok(count.max(0) as u64)
    }

    async fn find_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<LabSession>> {
        sqlx::query_as::<_, LabSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM lab_sessions \
             WHERE state = 'in_progress' AND end_time <= $1 ORDER BY end_time ASC"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to find overdue sessions", e)
        })
    }
}
