//! Session lifecycle manager.
//!
//! A session runs in two phases after an immediate warning:
//!
//! 1. **Warning**: every `notify_interval` a `session_warning` with the
//!    remaining time, until the remaining time reaches the countdown
//!    threshold. The last sleep is shortened so the phase ends exactly
//!    at `deadline - threshold`.
//! 2. **Countdown**: every `tick` a `session_ending` with the remaining
//!    seconds, until the deadline.
//!
//! On the deadline the owner receives `session_finished`, the stream is
//! completed, and the record is marked `Completed`. A disconnect, error,
//! or timeout reported by the emitter interrupts whatever the loop is
//! waiting on, a sleep or an emit into a full buffer, and completes the
//! record with `end_time = now`.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use labhub_core::config::SessionConfig;
use labhub_core::error::AppError;
use labhub_core::events::{CompletionReason, EventKind, MessageType, RemainingTime, SessionEvent};
use labhub_core::result::AppResult;
use labhub_core::traits::{Clock, EventEmitter};
use labhub_core::types::id::{LabId, SessionId, UserId};
use labhub_database::{LaboratoryStore, SessionStore};
use labhub_entity::{LabSession, Laboratory, NewLabSession, SessionState};

use super::finalizer::{FinalizeOnDrop, SessionFinalizer};
use super::hooks::SessionHooks;
use crate::signal::StopSignal;

/// How the countdown loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CountdownEnd {
    Expired,
    Stopped,
}

/// Creates sessions and runs their countdown against a client stream.
#[derive(Debug, Clone)]
pub struct SessionLifecycleManager {
    labs: Arc<dyn LaboratoryStore>,
    sessions: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    hooks: SessionHooks,
    config: SessionConfig,
}

impl SessionLifecycleManager {
    /// Create a new lifecycle manager.
    pub fn new(
        labs: Arc<dyn LaboratoryStore>,
        sessions: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        hooks: SessionHooks,
        config: SessionConfig,
    ) -> Self {
        Self {
            labs,
            sessions,
            clock,
            hooks,
            config,
        }
    }

    /// Hook on which session creation and completion are published.
    pub fn hooks(&self) -> &SessionHooks {
        &self.hooks
    }

    /// Start a session for `user_id` in `lab_id`, ending one laboratory
    /// duration from now.
    #[instrument(skip(self))]
    pub async fn create_session(&self, lab_id: LabId, user_id: UserId) -> AppResult<LabSession> {
        let lab = self.laboratory(lab_id).await?;
        let duration = session_duration(&lab)?;

        let start_time = self.clock.now();
        let end_time = start_time
            + chrono::Duration::from_std(duration)
                .map_err(|_| AppError::invalid_state("Laboratory duration out of range"))?;

        let session = self
            .sessions
            .create_session(NewLabSession {
                lab_id,
                owner_id: user_id,
                start_time,
                end_time,
                state: SessionState::InProgress,
            })
            .await?;

        info!(session_id = %session.id, %end_time, "Session created");
        self.hooks.publish(SessionEvent::Created {
            session_id: session.id,
            lab_id,
            owner_id: user_id,
        });

        Ok(session)
    }

    /// Run a session's countdown, streaming status events to its owner.
    ///
    /// Fails with `NotFound` or `InvalidState` before emitting anything when
    /// the laboratory or session is missing, the laboratory has no duration,
    /// or the session is already completed. Once the countdown starts every
    /// failure ends the session instead of being returned; the outcome says
    /// why it ended.
    ///
    /// Dropping the returned future mid-countdown still completes the
    /// session, from a spawned task.
    #[instrument(skip(self, emitter))]
    pub async fn run_session(
        &self,
        emitter: Arc<dyn EventEmitter>,
        lab_id: LabId,
        session_id: SessionId,
    ) -> AppResult<CompletionReason> {
        let lab = self.laboratory(lab_id).await?;
        let duration = session_duration(&lab)?;

        let session = self
            .sessions
            .find_session(session_id)
            .await?
            .filter(|s| s.lab_id == lab_id)
            .ok_or_else(|| {
                AppError::not_found(format!("Session {session_id} not found in laboratory {lab_id}"))
            })?;
        if !session.is_in_progress() {
            return Err(AppError::invalid_state(format!(
                "Session {session_id} is already {}",
                session.state
            )));
        }

        let deadline = self.clock.mark() + duration;
        let stop = Arc::new(StopSignal::new());
        register_stop_callbacks(emitter.as_ref(), &stop, session_id);

        let finalizer = Arc::new(SessionFinalizer::new(
            session,
            Arc::clone(&self.sessions),
            Arc::clone(&self.clock),
            self.hooks.clone(),
        ));
        let _guard = FinalizeOnDrop::new(Arc::clone(&finalizer));

        debug!(?duration, "Session countdown started");

        let reason = match self
            .countdown(emitter.as_ref(), deadline, duration, &stop)
            .await
        {
            Ok(CountdownEnd::Expired) => {
                match emit_unless_stopped(
                    emitter.as_ref(),
                    EventKind::notice(MessageType::SessionFinished),
                    &stop,
                )
                .await
                {
                    Ok(true) => {
                        emitter.complete();
                        CompletionReason::Expired
                    }
                    Ok(false) => stop.reason().unwrap_or(CompletionReason::Disconnected),
                    Err(e) => {
                        warn!(error = %e, "Could not deliver session_finished");
                        stop.stop(CompletionReason::Errored);
                        stop.reason().unwrap_or(CompletionReason::Errored)
                    }
                }
            }
            Ok(CountdownEnd::Stopped) => stop.reason().unwrap_or(CompletionReason::Disconnected),
            Err(e) => {
                warn!(error = %e, "Session countdown aborted");
                stop.stop(CompletionReason::Errored);
                stop.reason().unwrap_or(CompletionReason::Errored)
            }
        };

        finalizer.finalize(reason).await;
        Ok(reason)
    }

    async fn countdown(
        &self,
        emitter: &dyn EventEmitter,
        deadline: Instant,
        duration: Duration,
        stop: &StopSignal,
    ) -> AppResult<CountdownEnd> {
        let threshold = self.config.countdown_threshold();
        let interval = self.config.notify_interval();
        let tick = self.config.tick();

        let warning = EventKind::message(
            MessageType::SessionWarning,
            RemainingTime::for_warning(duration),
        );
        if !emit_unless_stopped(emitter, warning, stop).await? {
            return Ok(CountdownEnd::Stopped);
        }

        loop {
            let remaining = self.remaining(deadline);
            if remaining <= threshold {
                break;
            }
            if !nap(interval.min(remaining - threshold), stop).await {
                return Ok(CountdownEnd::Stopped);
            }
            let warning = EventKind::message(
                MessageType::SessionWarning,
                RemainingTime::for_warning(self.remaining(deadline)),
            );
            if !emit_unless_stopped(emitter, warning, stop).await? {
                return Ok(CountdownEnd::Stopped);
            }
        }

        debug!("Session entered countdown phase");

        let mut seconds_left = ceil_seconds(self.remaining(deadline));
        loop {
            let remaining = self.remaining(deadline);
            if remaining.is_zero() {
                break;
            }
            if !nap(tick.min(remaining), stop).await {
                return Ok(CountdownEnd::Stopped);
            }
            seconds_left = seconds_left.saturating_sub(tick.as_secs());
            let ending = EventKind::message(
                MessageType::SessionEnding,
                RemainingTime::seconds(seconds_left),
            );
            if !emit_unless_stopped(emitter, ending, stop).await? {
                return Ok(CountdownEnd::Stopped);
            }
        }

        if stop.is_stopped() {
            Ok(CountdownEnd::Stopped)
        } else {
            Ok(CountdownEnd::Expired)
        }
    }

    fn remaining(&self, deadline: Instant) -> Duration {
        deadline.saturating_duration_since(self.clock.mark())
    }

    async fn laboratory(&self, lab_id: LabId) -> AppResult<Laboratory> {
        self.labs
            .get_laboratory_by_id(lab_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Laboratory {lab_id} not found")))
    }
}

fn session_duration(lab: &Laboratory) -> AppResult<Duration> {
    lab.duration().ok_or_else(|| {
        AppError::invalid_state(format!("Laboratory {} has no session duration", lab.id))
    })
}

/// Stop the loop whenever the client goes away.
fn register_stop_callbacks(emitter: &dyn EventEmitter, stop: &Arc<StopSignal>, session_id: SessionId) {
    let signal = Arc::clone(stop);
    emitter.on_completion(Box::new(move || {
        if signal.stop(CompletionReason::Disconnected) {
            debug!(%session_id, "Client stream completed");
        }
    }));

    let signal = Arc::clone(stop);
    emitter.on_error(Box::new(move |err| {
        if signal.stop(CompletionReason::Errored) {
            warn!(%session_id, error = %err, "Client stream failed");
        }
    }));

    let signal = Arc::clone(stop);
    emitter.on_timeout(Box::new(move || {
        if signal.stop(CompletionReason::Disconnected) {
            debug!(%session_id, "Client stream timed out");
        }
    }));
}

/// Emit unless stopped first. Returns `false` when stopped, including while
/// the emit was waiting on a full client buffer.
async fn emit_unless_stopped(
    emitter: &dyn EventEmitter,
    event: EventKind,
    stop: &StopSignal,
) -> AppResult<bool> {
    match stop.unless_stopped(emitter.emit(event)).await {
        Some(result) => result.map(|()| true),
        None => Ok(false),
    }
}

/// Sleep for `period` unless stopped first. Returns `false` when stopped.
async fn nap(period: Duration, stop: &StopSignal) -> bool {
    if stop.is_stopped() {
        return false;
    }
    tokio::select! {
        _ = stop.stopped() => false,
        _ = tokio::time::sleep(period) => !stop.is_stopped(),
    }
}

fn ceil_seconds(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}
