//! Promotes the next waiter whenever a laboratory slot frees up.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use labhub_core::config::{PromotionMode, QueueConfig};
use labhub_core::error::ErrorKind;
use labhub_core::events::SessionEvent;
use labhub_core::result::AppResult;
use labhub_core::types::id::{LabId, UserId};
use labhub_database::{LaboratoryStore, SessionStore};

use super::coordinator::WaitingQueueCoordinator;

/// Couples session completion to queue promotion.
///
/// Reacts to `Completed` session events, released promotion slots, and new
/// waiters. In
/// [`PromotionMode::Poll`] it also re-checks every laboratory with waiters
/// on a fixed interval, which covers completions made by other nodes.
#[derive(Debug, Clone)]
pub struct PromotionListener {
    coordinator: WaitingQueueCoordinator,
    labs: Arc<dyn LaboratoryStore>,
    sessions: Arc<dyn SessionStore>,
    config: QueueConfig,
}

impl PromotionListener {
    /// Create a new listener.
    pub fn new(
        coordinator: WaitingQueueCoordinator,
        labs: Arc<dyn LaboratoryStore>,
        sessions: Arc<dyn SessionStore>,
        config: QueueConfig,
    ) -> Self {
        Self {
            coordinator,
            labs,
            sessions,
            config,
        }
    }

    /// Promote the head of `lab_id`'s queue if the laboratory has a free
    /// slot. Promoted users who have not started their session yet hold a
    /// slot. Returns the promoted user.
    pub async fn promote(&self, lab_id: LabId) -> AppResult<Option<UserId>> {
        let Some(lab) = self.labs.get_laboratory_by_id(lab_id).await? else {
            debug!(%lab_id, "Laboratory gone, nothing to promote");
            return Ok(None);
        };

        let in_progress = self.sessions.count_in_progress(lab_id).await?;
        let pending = self.coordinator.pending_promotions(lab_id);
        if !lab.has_free_slot(in_progress + pending) {
            debug!(%lab_id, in_progress, pending, capacity = lab.capacity, "Laboratory full");
            return Ok(None);
        }

        let user_id = match self.coordinator.dequeue_next(lab_id).await {
            Ok(user_id) => user_id,
            Err(e) if e.kind == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        if let Err(e) = self.coordinator.broadcast_positions(lab_id).await {
            warn!(%lab_id, error = %e, "Failed to refresh queue positions after promotion");
        }
        Ok(Some(user_id))
    }

    /// Run until cancelled.
    pub async fn run(
        self,
        mut events: broadcast::Receiver<SessionEvent>,
        cancel: CancellationToken,
    ) {
        let mut vacancies = self.coordinator.subscribe_vacancies();
        let mut poll = match self.config.promotion {
            PromotionMode::Poll => {
                let mut interval = tokio::time::interval(self.config.poll_interval());
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                Some(interval)
            }
            PromotionMode::OnCompletion => None,
        };

        info!(mode = %self.config.promotion, "Promotion listener started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Ok(SessionEvent::Completed { lab_id, .. }) => self.promote_logged(lab_id).await,
                    Ok(SessionEvent::Created { .. }) => {}
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Promotion listener lagged behind session events");
                        self.promote_all().await;
                    }
                    Err(RecvError::Closed) => break,
                },
                lab_id = vacancies.recv() => match lab_id {
                    Ok(lab_id) => self.promote_logged(lab_id).await,
                    Err(RecvError::Lagged(_)) => self.promote_all().await,
                    Err(RecvError::Closed) => break,
                },
                _ = tick(poll.as_mut()) => self.promote_all().await,
            }
        }

        info!("Promotion listener stopped");
    }

    async fn promote_logged(&self, lab_id: LabId) {
        match self.promote(lab_id).await {
            Ok(Some(user_id)) => debug!(%lab_id, %user_id, "Promotion sent"),
            Ok(None) => {}
            Err(e) => error!(%lab_id, error = %e, "Promotion failed"),
        }
    }

    async fn promote_all(&self) {
        match self.coordinator.labs_with_waiters().await {
            Ok(labs) => {
                for lab_id in labs {
                    self.promote_logged(lab_id).await;
                }
            }
            Err(e) => error!(error = %e, "Failed to list laboratories with waiters"),
        }
    }
}

async fn tick(interval: Option<&mut tokio::time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
