//! Laboratory repository implementation.

use async_trait::async_trait;
use sqlx::PgPool;

use labhub_core::error::{AppError, ErrorKind};
use labhub_core::result::AppResult;
use labhub_core::types::id::LabId;
use labhub_entity::Laboratory;

use crate::store::LaboratoryStore;

/// Read-only access to the `laboratories` table.
#[derive(Debug, Clone)]
pub struct LaboratoryRepository {
    pool: PgPool,
}

impl LaboratoryRepository {
    /// Create a new laboratory repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LaboratoryStore for LaboratoryRepository {
    async fn get_laboratory_by_id(&self, lab_id: LabId) -> AppResult<Option<Laboratory>> {
        sqlx::query_as::<_, Laboratory>(
            "SELECT id, name, duration_seconds, capacity FROM laboratories WHERE id = $1",
        )
        .bind(lab_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find laboratory", e))
    }
}
