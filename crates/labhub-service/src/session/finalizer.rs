//! Terminal persistence for one running session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use labhub_core::events::{CompletionReason, SessionEvent};
use labhub_core::traits::Clock;
use labhub_database::SessionStore;
use labhub_entity::LabSession;

use super::hooks::SessionHooks;

/// Writes the `Completed` record for a session at most once, however many
/// termination paths race to do it.
#[derive(Debug)]
pub(crate) struct SessionFinalizer {
    session: LabSession,
    sessions: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    hooks: SessionHooks,
    finalized: AtomicBool,
}

impl SessionFinalizer {
    pub(crate) fn new(
        session: LabSession,
        sessions: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        hooks: SessionHooks,
    ) -> Self {
        Self {
            session,
            sessions,
            clock,
            hooks,
            finalized: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::SeqCst)
    }

    /// Mark the session `Completed` with `end_time = now`.
    ///
    /// Returns `true` if this call performed the transition. A record the
    /// sweeper completed first is left alone and nothing is published. Persistence failures
    /// are logged, never returned: the client-facing loop has already ended
    /// and the sweeper completes the record once it is overdue.
    pub(crate) async fn finalize(&self, reason: CompletionReason) -> bool {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return false;
        }

        let session_id = self.session.id;
        let end_time = self.end_time();
        match self.sessions.complete_session(session_id, end_time).await {
            Ok(true) => {
                info!(
                    %session_id,
                    lab_id = %self.session.lab_id,
                    owner_id = %self.session.owner_id,
                    ?reason,
                    %end_time,
                    "Session completed"
                );
                self.hooks.publish(SessionEvent::Completed {
                    session_id,
                    lab_id: self.session.lab_id,
                    owner_id: self.session.owner_id,
                    reason,
                });
                true
            }
            Ok(false) => {
                debug!(%session_id, "Session already completed elsewhere");
                false
            }
            Err(e) => {
                error!(%session_id, ?reason, error = %e, "Failed to persist session completion");
                false
            }
        }
    }

    /// `now`, kept strictly after the start time.
    fn end_time(&self) -> DateTime<Utc> {
        let floor = self.session.start_time + chrono::Duration::milliseconds(1);
        self.clock.now().max(floor)
    }
}

/// Completes the session from a spawned task if the run loop is dropped
/// before it finalized.
pub(crate) struct FinalizeOnDrop {
    finalizer: Arc<SessionFinalizer>,
}

impl FinalizeOnDrop {
    pub(crate) fn new(finalizer: Arc<SessionFinalizer>) -> Self {
        Self { finalizer }
    }
}

impl Drop for FinalizeOnDrop {
    fn drop(&mut self) {
        if self.finalizer.is_finalized() {
            return;
        }

        let finalizer = Arc::clone(&self.finalizer);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    finalizer.finalize(CompletionReason::Cancelled).await;
                });
            }
            Err(_) => {
                error!(
                    session_id = %self.finalizer.session.id,
                    "Session run cancelled outside a runtime; left for the sweeper"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use labhub_core::config::SessionConfig;
    use labhub_core::traits::MonotonicClock;
    use labhub_core::types::id::{LabId, UserId};
    use labhub_database::memory::MemorySessionStore;
    use labhub_entity::{NewLabSession, SessionState};

    use crate::session::sweeper::SessionSweeper;

    use super::*;

    async fn setup() -> (Arc<MemorySessionStore>, SessionFinalizer, SessionHooks) {
        let store = Arc::new(MemorySessionStore::new());
        let clock = Arc::new(MonotonicClock::new());
        let now = clock.now();
        let session = store
            .create_session(NewLabSession {
                lab_id: LabId::new(),
                owner_id: UserId::new(),
                start_time: now,
                end_time: now + chrono::Duration::seconds(300),
                state: SessionState::InProgress,
            })
            .await
            .unwrap();
        let hooks = SessionHooks::default();
        let finalizer = SessionFinalizer::new(session, store.clone(), clock, hooks.clone());
        (store, finalizer, hooks)
    }

    #[tokio::test]
    async fn test_finalize_runs_once() {
        let (store, finalizer, hooks) = setup().await;
        let mut events = hooks.subscribe();

        assert!(finalizer.finalize(CompletionReason::Disconnected).await);
        assert!(!finalizer.finalize(CompletionReason::Errored).await);

        let stored = store.all().await.pop().unwrap();
        assert_eq!(stored.state, SessionState::Completed);
        assert!(stored.end_time > stored.start_time);

        match events.recv().await.unwrap() {
            SessionEvent::Completed { reason, .. } => {
                assert_eq!(reason, CompletionReason::Disconnected)
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_finalize_after_sweep_publishes_nothing() {
        let store = Arc::new(MemorySessionStore::new());
        let clock = Arc::new(MonotonicClock::new());
        let now = clock.now();
        let scheduled_end = now - chrono::Duration::minutes(5);
        let session = store
            .create_session(NewLabSession {
                lab_id: LabId::new(),
                owner_id: UserId::new(),
                start_time: now - chrono::Duration::minutes(10),
                end_time: scheduled_end,
                state: SessionState::InProgress,
            })
            .await
            .unwrap();

        let hooks = SessionHooks::default();
        let mut events = hooks.subscribe();
        let finalizer =
            SessionFinalizer::new(session.clone(), store.clone(), clock.clone(), hooks.clone());
        let sweeper = SessionSweeper::new(
            store.clone(),
            clock,
            hooks,
            SessionConfig {
                sweep_grace_seconds: 0,
                ..SessionConfig::default()
            },
        );

        assert_eq!(sweeper.run_sweep().await.unwrap(), 1);
        assert!(!finalizer.finalize(CompletionReason::Disconnected).await);

        let stored = store.find_session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.state, SessionState::Completed);
        assert_eq!(stored.end_time, scheduled_end);

        match events.recv().await.unwrap() {
            SessionEvent::Completed { reason, .. } => assert_eq!(reason, CompletionReason::Swept),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_guard_completes_session() {
        let (store, finalizer, _hooks) = setup().await;
        let finalizer = Arc::new(finalizer);

        drop(FinalizeOnDrop::new(Arc::clone(&finalizer)));
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;

        assert!(finalizer.is_finalized());
        assert_eq!(store.all().await[0].state, SessionState::Completed);
    }
}
