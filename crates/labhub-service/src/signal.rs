//! Stop signal shared between emitter callbacks and a waiting task.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

use labhub_core::events::CompletionReason;

/// Set once by whichever callback fires first; read by the loop it stops.
///
/// The flag is an atomic so a stop raised on a transport thread is never
/// missed by the loop, and the token wakes the loop out of any sleep or
/// channel wait.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: AtomicBool,
    reason: OnceLock<CompletionReason>,
    token: CancellationToken,
}

impl StopSignal {
    /// An unset signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal. Returns `true` for the call that raised it first;
    /// later calls keep the first reason.
    pub fn stop(&self, reason: CompletionReason) -> bool {
        let _ = self.reason.set(reason);
        let first = !self.stopped.swap(true, Ordering::SeqCst);
        self.token.cancel();
        first
    }

    /// Whether the signal was raised.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Reason given by the first `stop` call.
    pub fn reason(&self) -> Option<CompletionReason> {
        self.reason.get().copied()
    }

    /// Resolves once the signal is raised.
    pub async fn stopped(&self) {
        self.token.cancelled().await
    }

    /// Drive `fut` unless the signal is raised first, in which case `fut`
    /// is dropped and `None` is returned.
    pub async fn unless_stopped<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            output = fut => Some(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_reason_wins() {
        let signal = StopSignal::new();
        assert!(!signal.is_stopped());

        assert!(signal.stop(CompletionReason::Disconnected));
        assert!(!signal.stop(CompletionReason::Errored));

        assert!(signal.is_stopped());
        assert_eq!(signal.reason(), Some(CompletionReason::Disconnected));
        signal.stopped().await;
    }

    #[tokio::test]
    async fn test_stop_interrupts_pending_work() {
        let signal = std::sync::Arc::new(StopSignal::new());
        assert_eq!(signal.unless_stopped(async { 7 }).await, Some(7));

        let waiter = {
            let signal = std::sync::Arc::clone(&signal);
            tokio::spawn(async move { signal.unless_stopped(std::future::pending::<()>()).await })
        };
        tokio::task::yield_now().await;
        signal.stop(CompletionReason::Disconnected);

        assert_eq!(waiter.await.unwrap(), None);
        assert_eq!(signal.unless_stopped(async { 7 }).await, None);
    }
}
