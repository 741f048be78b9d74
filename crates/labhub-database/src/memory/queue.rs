//! In-memory waiting queues.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use labhub_core::error::AppError;
use labhub_core::result::AppResult;
use labhub_core::types::id::{LabId, UserId};
use labhub_entity::QueueEntry;

use crate::store::QueueStore;

#[derive(Debug, Default)]
struct InnerState {
    /// Next insertion sequence number, shared across laboratories.
    next_order: i64,
    /// Per-laboratory queues, head first.
    queues: BTreeMap<LabId, VecDeque<QueueEntry>>,
}

/// Waiting queues behind a single Tokio mutex.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    state: Mutex<InnerState>,
}

impl MemoryQueueStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn add_to_queue(&self, lab_id: LabId, user_id: UserId) -> AppResult<QueueEntry> {
        let mut state = self.state.lock().await;

        if state
            .queues
            .get(&lab_id)
            .is_some_and(|q| q.iter().any(|e| e.user_id == user_id))
        {
            return Err(AppError::conflict(format!(
                "User {user_id} is already queued for laboratory {lab_id}"
            )));
        }

        state.next_order += 1;
        let entry = QueueEntry {
            lab_id,
            user_id,
            insertion_order: state.next_order,
            enqueued_at: Utc::now(),
        };
        state
            .queues
            .entry(lab_id)
            .or_default()
            .push_back(entry.clone());

        Ok(entry)
    }

    async fn pop_queue(&self, lab_id: LabId) -> AppResult<Option<UserId>> {
        let mut state = self.state.lock().await;
        let Some(queue) = state.queues.get_mut(&lab_id) else {
            return Ok(None);
        };

        let head = queue.pop_front().map(|e| e.user_id);
        if queue.is_empty() {
            state.queues.remove(&lab_id);
        }
        Ok(head)
    }

    async fn queue_position(&self, lab_id: LabId, user_id: UserId) -> AppResult<Option<u64>> {
        let state = self.state.lock().await;
        Ok(state.queues.get(&lab_id).and_then(|q| {
            q.iter()
                .position(|e| e.user_id == user_id)
                .map(|idx| idx as u64 + 1)
        }))
    }

    async fn list_queued(&self, lab_id: LabId) -> AppResult<Vec<UserId>> {
        let state = self.state.lock().await;
        Ok(state
            .queues
            .get(&lab_id)
            .map(|q| q.iter().map(|e| e.user_id).collect())
            .unwrap_or_default())
    }

    async fn remove_from_queue(&self, lab_id: LabId, user_id: UserId) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let Some(queue) = state.queues.get_mut(&lab_id) else {
            return Ok(false);
        };

        let before = queue.len();
        queue.retain(|e| e.user_id != user_id);
        let removed = queue.len() < before;
        if queue.is_empty() {
            state.queues.remove(&lab_id);
        }
        Ok(removed)
    }

    async fn labs_with_waiters(&self) -> AppResult<Vec<LabId>> {
        let state = self.state.lock().await;
        Ok(state.queues.keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use labhub_core::error::ErrorKind;

    use super::*;

    #[tokio::test]
    async fn test_pop_is_fifo() {
        let store = MemoryQueueStore::new();
        let lab = LabId::new();
        let users = [UserId::new(), UserId::new(), UserId::new()];
        for user in users {
            store.add_to_queue(lab, user).await.unwrap();
        }

        for user in users {
            assert_eq!(store.pop_queue(lab).await.unwrap(), Some(user));
        }
        assert_eq!(store.pop_queue(lab).await.unwrap(), None);
        assert!(store.labs_with_waiters().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_positions_track_removals() {
        let store = MemoryQueueStore::new();
        let lab = LabId::new();
        let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());
        for user in [a, b, c] {
            store.add_to_queue(lab, user).await.unwrap();
        }
        assert_eq!(store.queue_position(lab, c).await.unwrap(), Some(3));

        assert!(store.remove_from_queue(lab, b).await.unwrap());
        assert_eq!(store.queue_position(lab, c).await.unwrap(), Some(2));
        assert_eq!(store.queue_position(lab, b).await.unwrap(), None);
        assert_eq!(store.list_queued(lab).await.unwrap(), vec![a, c]);
    }

    #[tokio::test]
    async fn test_duplicate_entry_rejected() {
        let store = MemoryQueueStore::new();
        let lab = LabId::new();
        let user = UserId::new();
        store.add_to_queue(lab, user).await.unwrap();

        let err = store.add_to_queue(lab, user).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        // Same user may wait on a different laboratory.
        store.add_to_queue(LabId::new(), user).await.unwrap();
    }

    #[tokio::test]
    async fn test_insertion_order_increases() {
        let store = MemoryQueueStore::new();
        let lab = LabId::new();
        let first = store.add_to_queue(lab, UserId::new()).await.unwrap();
        let second = store.add_to_queue(lab, UserId::new()).await.unwrap();
        assert!(second.insertion_order > first.insertion_order);
    }
}
