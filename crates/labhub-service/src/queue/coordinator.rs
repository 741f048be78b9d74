//! Waiting-queue coordinator.
//!
//! Every waiter listens on its own channel, `lab:{lab}:queue:{user}`. Two
//! payloads travel there: `keep-in-queue` asks the waiter to re-read its
//! position and report it, anything else (the empty string in practice)
//! promotes it. Queue membership lives in the [`QueueStore`]; the bus only
//! carries wake-ups, so a waiter's reported position always comes from
//! persisted state.
//!
//! A promoted user holds a slot before their session exists. Those users
//! are tracked here as pending promotions until admission settles them.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use labhub_core::error::{AppError, ErrorKind};
use labhub_core::events::{CompletionReason, EventKind, MessageType};
use labhub_core::result::AppResult;
use labhub_core::traits::{EventEmitter, PubSub, Subscription};
use labhub_core::types::channel::{QueueChannel, QueueSignal};
use labhub_core::types::id::{LabId, UserId};
use labhub_database::QueueStore;

use crate::signal::StopSignal;

/// Buffer for the vacancy channel.
const VACANCY_CAPACITY: usize = 64;

/// How a wait in the queue ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The user reached the head and was handed a slot.
    Promoted,
    /// The client went away; the entry was withdrawn.
    Left,
}

/// FIFO waiting queues with live position updates.
#[derive(Debug, Clone)]
pub struct WaitingQueueCoordinator {
    queue: Arc<dyn QueueStore>,
    bus: Arc<dyn PubSub>,
    vacancies: broadcast::Sender<LabId>,
    pending: Arc<DashMap<LabId, HashSet<UserId>>>,
}

impl WaitingQueueCoordinator {
    /// Create a new coordinator.
    pub fn new(queue: Arc<dyn QueueStore>, bus: Arc<dyn PubSub>) -> Self {
        let (vacancies, _) = broadcast::channel(VACANCY_CAPACITY);
        Self {
            queue,
            bus,
            vacancies,
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Laboratories announced here may have a free slot and a waiter to
    /// fill it.
    pub fn subscribe_vacancies(&self) -> broadcast::Receiver<LabId> {
        self.vacancies.subscribe()
    }

    /// Announce that a slot reserved by a promotion went unused.
    pub fn release_slot(&self, lab_id: LabId) {
        debug!(%lab_id, "Promotion slot released");
        self.announce(lab_id);
    }

    /// Users of `lab_id` that were promoted but have not started a session.
    pub fn pending_promotions(&self, lab_id: LabId) -> u64 {
        self.pending
            .get(&lab_id)
            .map_or(0, |users| users.len() as u64)
    }

    /// Drop `user_id`'s pending promotion, once their session exists or
    /// will never exist.
    pub fn settle(&self, lab_id: LabId, user_id: UserId) {
        if let Some(mut users) = self.pending.get_mut(&lab_id) {
            users.remove(&user_id);
        }
        self.pending.remove_if(&lab_id, |_, users| users.is_empty());
    }

    fn announce(&self, lab_id: LabId) {
        let _ = self.vacancies.send(lab_id);
    }

    /// Wait in `lab_id`'s queue until promoted or the client leaves.
    ///
    /// The caller's position is pushed to `emitter` on arrival and after
    /// every `keep-in-queue` signal. On promotion a `queue_promoted` notice
    /// is pushed and the entry is already gone from the queue. If the
    /// client completes, errors, or times out, or the future is dropped,
    /// the entry is withdrawn and the remaining waiters are told to
    /// refresh their positions.
    #[instrument(skip(self, emitter))]
    pub async fn enqueue(
        &self,
        lab_id: LabId,
        user_id: UserId,
        emitter: Arc<dyn EventEmitter>,
    ) -> AppResult<WaitOutcome> {
        // Listen before joining so a promotion right after the append is
        // not lost.
        let channel = QueueChannel::new(lab_id, user_id);
        let mut subscription = self.bus.subscribe(&channel.name()).await?;

        let entry = self.queue.add_to_queue(lab_id, user_id).await?;
        info!(insertion_order = entry.insertion_order, "User joined waiting queue");

        // A slot may have freed up after the caller found the lab full and
        // before the append; have the promotion listener look again.
        self.announce(lab_id);

        let mut guard = WithdrawOnDrop::new(self.clone(), lab_id, user_id);

        let stop = Arc::new(StopSignal::new());
        register_leave_callbacks(emitter.as_ref(), &stop, lab_id, user_id);

        let outcome = self
            .wait_for_promotion(&mut subscription, emitter.as_ref(), lab_id, user_id, &stop)
            .await;
        subscription.unsubscribe();
        guard.disarm();

        match outcome {
            Ok(WaitOutcome::Promoted) => {
                info!("User promoted from waiting queue");
                if let Err(e) = emitter
                    .emit(EventKind::notice(MessageType::QueuePromoted))
                    .await
                {
                    debug!(error = %e, "Could not deliver queue_promoted");
                }
                Ok(WaitOutcome::Promoted)
            }
            Ok(WaitOutcome::Left) => {
                self.leave(lab_id, user_id).await;
                Ok(WaitOutcome::Left)
            }
            Err(e) if e.kind == ErrorKind::ClientDisconnected => {
                debug!(error = %e, "Waiter stream closed");
                self.leave(lab_id, user_id).await;
                Ok(WaitOutcome::Left)
            }
            Err(e) => {
                warn!(error = %e, "Waiting aborted");
                self.leave(lab_id, user_id).await;
                Err(e)
            }
        }
    }

    /// Pop the head of `lab_id`'s queue and signal it to proceed.
    ///
    /// The promoted user stays pending until [`settle`](Self::settle) is
    /// called for them. A head nobody is listening for any more is
    /// skipped. Fails with `NotFound` when no listening waiter remains.
    #[instrument(skip(self))]
    pub async fn dequeue_next(&self, lab_id: LabId) -> AppResult<UserId> {
        loop {
            let Some(user_id) = self.queue.pop_queue(lab_id).await? else {
                return Err(AppError::not_found(format!(
                    "No users waiting for laboratory {lab_id}"
                )));
            };

            // Counted before the signal so the waiter cannot settle first.
            self.pending.entry(lab_id).or_default().insert(user_id);

            let channel = QueueChannel::new(lab_id, user_id);
            let delivered = match self
                .bus
                .publish(&channel.name(), QueueSignal::Promote.as_payload())
                .await
            {
                Ok(delivered) => delivered,
                Err(e) => {
                    error!(%user_id, error = %e, "Dequeued user could not be signalled");
                    self.settle(lab_id, user_id);
                    return Err(e);
                }
            };

            if delivered > 0 {
                info!(%user_id, "Queue head promoted");
                return Ok(user_id);
            }
            warn!(%user_id, "Queue head is not listening, skipping");
            self.settle(lab_id, user_id);
        }
    }

    /// Ask every waiter of `lab_id` to refresh its position.
    ///
    /// Returns how many waiters were signalled. A failed publish to one
    /// waiter is logged and does not stop the others.
    pub async fn broadcast_positions(&self, lab_id: LabId) -> AppResult<usize> {
        let waiting = self.queue.list_queued(lab_id).await?;

        let mut signalled = 0;
        for user_id in &waiting {
            let channel = QueueChannel::new(lab_id, *user_id);
            match self
                .bus
                .publish(&channel.name(), QueueSignal::KeepInQueue.as_payload())
                .await
            {
                Ok(_) => signalled += 1,
                Err(e) => warn!(%lab_id, %user_id, error = %e, "Failed to signal waiter"),
            }
        }

        debug!(%lab_id, waiting = waiting.len(), "Queue positions broadcast");
        Ok(signalled)
    }

    /// Remove a user from `lab_id`'s queue and refresh everyone behind them.
    ///
    /// Returns `false` if the user was not queued.
    pub async fn withdraw(&self, lab_id: LabId, user_id: UserId) -> AppResult<bool> {
        let removed = self.queue.remove_from_queue(lab_id, user_id).await?;
        if removed {
            info!(%lab_id, %user_id, "User left waiting queue");
            if let Err(e) = self.broadcast_positions(lab_id).await {
                warn!(%lab_id, error = %e, "Failed to refresh queue positions");
            }
        }
        Ok(removed)
    }

    /// 1-based position of a user, if queued.
    pub async fn position(&self, lab_id: LabId, user_id: UserId) -> AppResult<Option<u64>> {
        self.queue.queue_position(lab_id, user_id).await
    }

    /// Users waiting for `lab_id`, head first.
    pub async fn waiting(&self, lab_id: LabId) -> AppResult<Vec<UserId>> {
        self.queue.list_queued(lab_id).await
    }

    /// Laboratories with at least one waiter.
    pub async fn labs_with_waiters(&self) -> AppResult<Vec<LabId>> {
        self.queue.labs_with_waiters().await
    }

    async fn wait_for_promotion(
        &self,
        subscription: &mut Subscription,
        emitter: &dyn EventEmitter,
        lab_id: LabId,
        user_id: UserId,
        stop: &StopSignal,
    ) -> AppResult<WaitOutcome> {
        if !self.report_unless_stopped(emitter, lab_id, user_id, stop).await? {
            return Ok(WaitOutcome::Left);
        }

        loop {
            let payload = tokio::select! {
                _ = stop.stopped() => return Ok(WaitOutcome::Left),
                payload = subscription.recv() => payload,
            };

            let Some(payload) = payload else {
                return Err(AppError::pubsub(format!(
                    "Subscription to {} closed",
                    subscription.channel()
                )));
            };

            match QueueSignal::from_payload(&payload) {
                QueueSignal::KeepInQueue => {
                    if !self.report_unless_stopped(emitter, lab_id, user_id, stop).await? {
                        return Ok(WaitOutcome::Left);
                    }
                }
                QueueSignal::Promote => return Ok(WaitOutcome::Promoted),
            }
        }
    }

    /// `false` when the client left before the report went out.
    async fn report_unless_stopped(
        &self,
        emitter: &dyn EventEmitter,
        lab_id: LabId,
        user_id: UserId,
        stop: &StopSignal,
    ) -> AppResult<bool> {
        match stop
            .unless_stopped(self.report_position(emitter, lab_id, user_id))
            .await
        {
            Some(result) => result.map(|()| true),
            None => Ok(false),
        }
    }

    async fn report_position(
        &self,
        emitter: &dyn EventEmitter,
        lab_id: LabId,
        user_id: UserId,
    ) -> AppResult<()> {
        match self.queue.queue_position(lab_id, user_id).await? {
            Some(position) => {
                emitter
                    .emit(EventKind::WaitingQueue { lab_id, position })
                    .await
            }
            // Popped; the promotion signal is on its way.
            None => Ok(()),
        }
    }

    /// Withdraw after the client left. If the entry was already popped the
    /// promotion meant for this user is wasted, so the slot is released.
    async fn leave(&self, lab_id: LabId, user_id: UserId) {
        match self.withdraw(lab_id, user_id).await {
            Ok(true) => {}
            Ok(false) => {
                self.settle(lab_id, user_id);
                self.release_slot(lab_id);
            }
            Err(e) => error!(%lab_id, %user_id, error = %e, "Failed to withdraw waiter"),
        }
    }
}

fn register_leave_callbacks(
    emitter: &dyn EventEmitter,
    stop: &Arc<StopSignal>,
    lab_id: LabId,
    user_id: UserId,
) {
    let signal = Arc::clone(stop);
    emitter.on_completion(Box::new(move || {
        if signal.stop(CompletionReason::Disconnected) {
            debug!(%lab_id, %user_id, "Waiter disconnected");
        }
    }));

    let signal = Arc::clone(stop);
    emitter.on_error(Box::new(move |err| {
        if signal.stop(CompletionReason::Errored) {
            debug!(%lab_id, %user_id, error = %err, "Waiter stream failed");
        }
    }));

    let signal = Arc::clone(stop);
    emitter.on_timeout(Box::new(move || {
        if signal.stop(CompletionReason::Disconnected) {
            debug!(%lab_id, %user_id, "Waiter stream timed out");
        }
    }));
}

/// Withdraws the entry from a spawned task if `enqueue` is dropped while
/// waiting.
struct WithdrawOnDrop {
    coordinator: Option<WaitingQueueCoordinator>,
    lab_id: LabId,
    user_id: UserId,
}

impl WithdrawOnDrop {
    fn new(coordinator: WaitingQueueCoordinator, lab_id: LabId, user_id: UserId) -> Self {
        Self {
            coordinator: Some(coordinator),
            lab_id,
            user_id,
        }
    }

    fn disarm(&mut self) {
        self.coordinator = None;
    }
}

impl Drop for WithdrawOnDrop {
    fn drop(&mut self) {
        let Some(coordinator) = self.coordinator.take() else {
            return;
        };
        let (lab_id, user_id) = (self.lab_id, self.user_id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { coordinator.leave(lab_id, user_id).await });
            }
            Err(_) => error!(%lab_id, %user_id, "Wait cancelled outside a runtime; entry left queued"),
        }
    }
}
