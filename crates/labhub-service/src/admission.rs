//! Admission of a user into a laboratory.
//!
//! A user gets a slot right away when nobody is waiting and the laboratory
//! has room; otherwise they wait in the queue until promoted. Either way
//! the same client stream carries the queue positions and then the
//! session countdown.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use labhub_core::error::AppError;
use labhub_core::events::CompletionReason;
use labhub_core::result::AppResult;
use labhub_core::traits::EventEmitter;
use labhub_core::types::id::{LabId, SessionId, UserId};
use labhub_database::{LaboratoryStore, SessionStore};

use crate::queue::coordinator::{WaitOutcome, WaitingQueueCoordinator};
use crate::session::lifecycle::SessionLifecycleManager;

/// A finished admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// The session the user was given.
    pub session_id: SessionId,
    /// Whether the user waited in the queue first.
    pub queued: bool,
    /// How the session ended.
    pub reason: CompletionReason,
}

/// Admits users, queueing them when the laboratory is busy.
#[derive(Debug, Clone)]
pub struct AdmissionService {
    labs: Arc<dyn LaboratoryStore>,
    sessions: Arc<dyn SessionStore>,
    coordinator: WaitingQueueCoordinator,
    lifecycle: SessionLifecycleManager,
}

impl AdmissionService {
    /// Create a new admission service.
    pub fn new(
        labs: Arc<dyn LaboratoryStore>,
        sessions: Arc<dyn SessionStore>,
        coordinator: WaitingQueueCoordinator,
        lifecycle: SessionLifecycleManager,
    ) -> Self {
        Self {
            labs,
            sessions,
            coordinator,
            lifecycle,
        }
    }

    /// Admit `user_id` to `lab_id` and run their session to the end.
    ///
    /// Returns `None` if the client left while waiting in the queue.
    #[instrument(skip(self, emitter))]
    pub async fn admit(
        &self,
        lab_id: LabId,
        user_id: UserId,
        emitter: Arc<dyn EventEmitter>,
    ) -> AppResult<Option<Admission>> {
        let lab = self
            .labs
            .get_laboratory_by_id(lab_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Laboratory {lab_id} not found")))?;
        if lab.duration().is_none() {
            return Err(AppError::invalid_state(format!(
                "Laboratory {lab_id} has no session duration"
            )));
        }

        let nobody_waiting = self.coordinator.waiting(lab_id).await?.is_empty();
        let in_progress = self.sessions.count_in_progress(lab_id).await?;
        let pending = self.coordinator.pending_promotions(lab_id);
        let queued = !(nobody_waiting && lab.has_free_slot(in_progress + pending));

        let mut claim = None;
        if queued {
            info!(in_progress, pending, capacity = lab.capacity, "Laboratory busy, queueing user");
            match self
                .coordinator
                .enqueue(lab_id, user_id, Arc::clone(&emitter))
                .await?
            {
                WaitOutcome::Promoted => {
                    claim = Some(PromotionClaim::new(self.coordinator.clone(), lab_id, user_id));
                }
                WaitOutcome::Left => return Ok(None),
            }
        }

        let session = self
            .lifecycle
            .create_session(lab_id, user_id)
            .await
            .inspect_err(|e| {
                if claim.is_some() {
                    warn!(error = %e, "Promoted user could not start a session");
                }
            })?;
        if let Some(claim) = claim {
            claim.fulfil();
        }

        let reason = self
            .lifecycle
            .run_session(emitter, lab_id, session.id)
            .await?;

        Ok(Some(Admission {
            session_id: session.id,
            queued,
            reason,
        }))
    }
}

/// A promoted user's hold on a slot between promotion and session start.
///
/// Dropped without [`fulfil`](Self::fulfil), it gives the slot back.
struct PromotionClaim {
    coordinator: Option<WaitingQueueCoordinator>,
    lab_id: LabId,
    user_id: UserId,
}

impl PromotionClaim {
    fn new(coordinator: WaitingQueueCoordinator, lab_id: LabId, user_id: UserId) -> Self {
        Self {
            coordinator: Some(coordinator),
            lab_id,
            user_id,
        }
    }

    /// The session exists and now counts against capacity itself.
    fn fulfil(mut self) {
        if let Some(coordinator) = self.coordinator.take() {
            coordinator.settle(self.lab_id, self.user_id);
        }
    }
}

impl Drop for PromotionClaim {
    fn drop(&mut self) {
        if let Some(coordinator) = self.coordinator.take() {
            coordinator.settle(self.lab_id, self.user_id);
            coordinator.release_slot(self.lab_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::{Notify, Semaphore};
    use tokio_util::sync::CancellationToken;

    use labhub_core::config::{QueueConfig, SessionConfig};
    use labhub_core::events::{EventKind, MessageType, SessionEvent};
    use labhub_core::traits::MonotonicClock;
    use labhub_database::memory::{MemoryLaboratoryStore, MemoryQueueStore, MemorySessionStore};
    use labhub_database::QueueStore;
    use labhub_entity::{Laboratory, NewLabSession, QueueEntry, SessionState};
    use labhub_realtime::{ChannelEmitter, MemoryPubSub};

    use super::*;
    use crate::queue::promotion::PromotionListener;
    use crate::session::hooks::SessionHooks;

    /// Queue whose appends wait until the test lets them through.
    #[derive(Debug)]
    struct GatedQueue {
        inner: MemoryQueueStore,
        entered: Notify,
        gate: Semaphore,
    }

    impl GatedQueue {
        fn new() -> Self {
            Self {
                inner: MemoryQueueStore::new(),
                entered: Notify::new(),
                gate: Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl QueueStore for GatedQueue {
        async fn add_to_queue(&self, lab_id: LabId, user_id: UserId) -> AppResult<QueueEntry> {
            self.entered.notify_one();
            self.gate.acquire().await.unwrap().forget();
            self.inner.add_to_queue(lab_id, user_id).await
        }

        async fn pop_queue(&self, lab_id: LabId) -> AppResult<Option<UserId>> {
            self.inner.pop_queue(lab_id).await
        }

        async fn queue_position(&self, lab_id: LabId, user_id: UserId) -> AppResult<Option<u64>> {
            self.inner.queue_position(lab_id, user_id).await
        }

        async fn list_queued(&self, lab_id: LabId) -> AppResult<Vec<UserId>> {
            self.inner.list_queued(lab_id).await
        }

        async fn remove_from_queue(&self, lab_id: LabId, user_id: UserId) -> AppResult<bool> {
            self.inner.remove_from_queue(lab_id, user_id).await
        }

        async fn labs_with_waiters(&self) -> AppResult<Vec<LabId>> {
            self.inner.labs_with_waiters().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_freed_while_joining_queue_promotes() {
        let labs = Arc::new(MemoryLaboratoryStore::new());
        let sessions = Arc::new(MemorySessionStore::new());
        let queue = Arc::new(GatedQueue::new());
        let hooks = SessionHooks::default();
        let lab_id = LabId::new();
        labs.insert(Laboratory {
            id: lab_id,
            name: "Spectrum analyser".to_string(),
            duration_seconds: Some(60),
            capacity: 1,
        })
        .await;

        let now = Utc::now();
        let occupant = sessions
            .create_session(NewLabSession {
                lab_id,
                owner_id: UserId::new(),
                start_time: now,
                end_time: now + chrono::Duration::minutes(1),
                state: SessionState::InProgress,
            })
            .await
            .unwrap();

        let coordinator =
            WaitingQueueCoordinator::new(queue.clone(), Arc::new(MemoryPubSub::new(8)));
        let lifecycle = SessionLifecycleManager::new(
            labs.clone(),
            sessions.clone(),
            Arc::new(MonotonicClock::new()),
            hooks.clone(),
            SessionConfig::default(),
        );
        let admission = AdmissionService::new(
            labs.clone(),
            sessions.clone(),
            coordinator.clone(),
            lifecycle,
        );
        let listener =
            PromotionListener::new(coordinator, labs, sessions.clone(), QueueConfig::default());
        let cancel = CancellationToken::new();
        tokio::spawn(listener.run(hooks.subscribe(), cancel.clone()));

        let (emitter, mut stream) = ChannelEmitter::new(64);
        let user_id = UserId::new();
        let admit = {
            let admission = admission.clone();
            tokio::spawn(async move { admission.admit(lab_id, user_id, emitter).await })
        };

        // The user saw a full lab and is about to join the queue.
        queue.entered.notified().await;
        sessions.complete_session(occupant.id, Utc::now()).await.unwrap();
        hooks.publish(SessionEvent::Completed {
            session_id: occupant.id,
            lab_id,
            owner_id: occupant.owner_id,
            reason: CompletionReason::Disconnected,
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.gate.add_permits(1);

        let promoted = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(event) = stream.recv().await {
                if event.kind == EventKind::notice(MessageType::QueuePromoted) {
                    return true;
                }
            }
            false
        })
        .await
        .expect("waiter never promoted");
        assert!(promoted);

        let admission = admit.await.unwrap().unwrap().unwrap();
        assert!(admission.queued);
        assert_eq!(admission.reason, CompletionReason::Expired);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_dropped_claim_releases_slot() {
        let coordinator = WaitingQueueCoordinator::new(
            Arc::new(MemoryQueueStore::new()),
            Arc::new(MemoryPubSub::new(8)),
        );
        let mut vacancies = coordinator.subscribe_vacancies();
        let (lab_id, user_id) = (LabId::new(), UserId::new());

        let fulfilled = PromotionClaim::new(coordinator.clone(), lab_id, user_id);
        fulfilled.fulfil();
        assert!(vacancies.try_recv().is_err());

        drop(PromotionClaim::new(coordinator.clone(), lab_id, user_id));
        assert_eq!(vacancies.recv().await.unwrap(), lab_id);
        assert_eq!(coordinator.pending_promotions(lab_id), 0);
    }
}
