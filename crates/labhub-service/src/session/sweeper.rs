//! Background completion of abandoned sessions.
//!
//! A session whose run loop died with its process stays `InProgress` and
//! keeps occupying a laboratory slot. The sweeper completes such records
//! once they are past their end time by more than the grace period, and
//! publishes the completion so waiting users get promoted.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use labhub_core::config::SessionConfig;
use labhub_core::events::{CompletionReason, SessionEvent};
use labhub_core::result::AppResult;
use labhub_core::traits::Clock;
use labhub_database::SessionStore;

use super::hooks::SessionHooks;

/// Periodically completes overdue sessions.
#[derive(Debug, Clone)]
pub struct SessionSweeper {
    sessions: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    hooks: SessionHooks,
    config: SessionConfig,
}

impl SessionSweeper {
    /// Create a new sweeper.
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        hooks: SessionHooks,
        config: SessionConfig,
    ) -> Self {
        Self {
            sessions,
            clock,
            hooks,
            config,
        }
    }

    /// Complete every overdue session once. Returns how many were completed.
    ///
    /// The record keeps its scheduled `end_time`.
    pub async fn run_sweep(&self) -> AppResult<u64> {
        let grace = chrono::Duration::from_std(self.config.sweep_grace())
            .unwrap_or_else(|_| chrono::Duration::zero());
        let cutoff = self.clock.now() - grace;
        let overdue = self.sessions.find_overdue(cutoff).await?;

        let mut completed = 0u64;
        for session in overdue {
            match self
                .sessions
                .complete_session(session.id, session.end_time)
                .await
            {
                Ok(true) => {
                    completed += 1;
                    info!(
                        session_id = %session.id,
                        lab_id = %session.lab_id,
                        end_time = %session.end_time,
                        "Swept overdue session"
                    );
                    self.hooks.publish(SessionEvent::Completed {
                        session_id: session.id,
                        lab_id: session.lab_id,
                        owner_id: session.owner_id,
                        reason: CompletionReason::Swept,
                    });
                }
                Ok(false) => {
                    debug!(session_id = %session.id, "Overdue session completed before sweep");
                }
                Err(e) => {
                    warn!(session_id = %session.id, error = %e, "Failed to sweep session");
                }
            }
        }

        Ok(completed)
    }

    /// Sweep every `sweep_interval` until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        let period = self.config.sweep_interval();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(?period, "Session sweeper started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    match self.run_sweep().await {
                        Ok(0) => {}
                        Ok(n) => info!(swept = n, "Session sweep finished"),
                        Err(e) => error!(error = %e, "Session sweep failed"),
                    }
                }
            }
        }

        info!("Session sweeper stopped");
    }
}
