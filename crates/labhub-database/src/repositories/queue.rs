//! Waiting-queue repository implementation.
//!
//! Insertion order comes from the `insertion_order` BIGSERIAL. The head pop
//! is a single `DELETE ... RETURNING` over a `FOR UPDATE SKIP LOCKED`
//! subselect, so concurrent pops on one laboratory never return the same
//! user twice.

use async_trait::async_trait;
use sqlx::PgPool;

use labhub_core::error::{AppError, ErrorKind};
use labhub_core::result::AppResult;
use labhub_core::types::id::{LabId, UserId};
use labhub_entity::QueueEntry;

use super::is_unique_violation;
use crate::store::QueueStore;

/// Repository for the `lab_queue` table.
#[derive(Debug, Clone)]
pub struct QueueRepository {
    pool: PgPool,
}

impl QueueRepository {
    /// Create a new queue repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueueStore for QueueRepository {
    async fn add_to_queue(&self, lab_id: LabId, user_id: UserId) -> AppResult<QueueEntry> {
        sqlx::query_as::<_, QueueEntry>(
            "INSERT INTO lab_queue (lab_id, user_id) VALUES ($1, $2) \
             RETURNING lab_id, user_id, insertion_order, enqueued_at",
        )
        .bind(lab_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return AppError::conflict(format!(
                    "User {user_id} is already queued for laboratory {lab_id}"
                ));
            }
            AppError::with_source(ErrorKind::Database, "Failed to enqueue user", e)
        })
    }

    async fn pop_queue(&self, lab_id: LabId) -> AppResult<Option<UserId>> {
        sqlx::query_scalar::<_, UserId>(
            "DELETE FROM lab_queue WHERE insertion_order = ( \
                 SELECT insertion_order FROM lab_queue WHERE lab_id = $1 \
                 ORDER BY insertion_order ASC LIMIT 1 FOR UPDATE SKIP LOCKED \
             ) RETURNING user_id",
        )
        .bind(lab_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to pop queue head", e))
    }

    async fn queue_position(&self, lab_id: LabId, user_id: UserId) -> AppResult<Option<u64>> {
        let position: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM lab_queue WHERE lab_id = $1 AND insertion_order <= ( \
                 SELECT insertion_order FROM lab_queue WHERE lab_id = $1 AND user_id = $2 \
             )",
        )
        .bind(lab_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to compute queue position", e)
        })?;

        Ok((position > 0).then_some(position as u64))
    }

    async fn list_queued(&self, lab_id: LabId) -> AppResult<Vec<UserId>> {
        sqlx::query_scalar::<_, UserId>(
            "SELECT user_id FROM lab_queue WHERE lab_id = $1 ORDER BY insertion_order ASC",
        )
        .bind(lab_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list queue", e))
    }

    async fn remove_from_queue(&self, lab_id: LabId, user_id: UserId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM lab_queue WHERE lab_id = $1 AND user_id = $2")
            .bind(lab_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to remove queue entry", e)
            })?;

        Ok(result.rows_affected() > 0)
    }

    async fn labs_with_waiters(&self) -> AppResult<Vec<LabId>> {
        sqlx::query_scalar::<_, LabId>("SELECT DISTINCT lab_id FROM lab_queue")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to list waiting labs", e)
            })
    }
}
