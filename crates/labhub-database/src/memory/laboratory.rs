//! In-memory laboratory catalogue.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use labhub_core::result::AppResult;
use labhub_core::types::id::LabId;
use labhub_entity::Laboratory;

use crate::store::LaboratoryStore;

/// Laboratory lookups backed by a map.
#[derive(Debug, Default)]
pub struct MemoryLaboratoryStore {
    labs: RwLock<HashMap<LabId, Laboratory>>,
}

impl MemoryLaboratoryStore {
    /// Create an empty catalogue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a laboratory.
    pub async fn insert(&self, lab: Laboratory) {
        self.labs.write().await.insert(lab.id, lab);
    }
}

#[async_trait]
impl LaboratoryStore for MemoryLaboratoryStore {
    async fn get_laboratory_by_id(&self, lab_id: LabId) -> AppResult<Option<Laboratory>> {
        Ok(self.labs.read().await.get(&lab_id).cloned())
    }
}
