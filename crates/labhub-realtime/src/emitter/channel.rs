//! An [`EventEmitter`] backed by a bounded Tokio channel.
//!
//! The transport layer owns the [`EventStream`] end and forwards events to
//! the wire. It reports what happened to the client through
//! [`ChannelEmitter::disconnect`], [`ChannelEmitter::fail`], and
//! [`ChannelEmitter::time_out`]; LabHub closes the stream with
//! [`EventEmitter::complete`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use labhub_core::error::AppError;
use labhub_core::events::client::{Event, EventKind};
use labhub_core::result::AppResult;
use labhub_core::traits::{CompletionCallback, ErrorCallback, EventEmitter};

/// How a stream ended.
#[derive(Debug, Clone)]
pub enum StreamTermination {
    /// Closed normally (by LabHub or by the client going away).
    Completed,
    /// Failed with an error.
    Errored(AppError),
    /// The transport gave up waiting.
    TimedOut,
}

#[derive(Default)]
struct Lifecycle {
    /// `None` while the stream is open.
    terminated: Option<StreamTermination>,
    completion: Vec<CompletionCallback>,
    error: Vec<ErrorCallback>,
    timeout: Vec<CompletionCallback>,
}

/// Receiving end of a [`ChannelEmitter`].
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::Receiver<Event>,
}

impl EventStream {
    /// Wait for the next event. `None` once the emitter is gone or closed.
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Take an already-buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }
}

/// Push channel to one client.
///
/// Events are stamped with a per-stream id starting at 1. Lifecycle
/// callbacks fire at most once, on the first termination; callbacks
/// registered afterwards fire immediately if they match how the stream
/// ended.
pub struct ChannelEmitter {
    sender: mpsc::Sender<Event>,
    next_id: AtomicU64,
    lifecycle: Mutex<Lifecycle>,
    /// Cancelled on termination; wakes emits blocked on a full buffer.
    closed: CancellationToken,
}

impl std::fmt::Debug for ChannelEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelEmitter")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("terminated", &self.termination())
            .finish()
    }
}

impl ChannelEmitter {
    /// Create an emitter and its stream.
    pub fn new(buffer_size: usize) -> (Arc<Self>, EventStream) {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        let emitter = Arc::new(Self {
            sender,
            next_id: AtomicU64::new(1),
            lifecycle: Mutex::new(Lifecycle::default()),
            closed: CancellationToken::new(),
        });
        (emitter, EventStream { receiver })
    }

    /// How the stream ended, if it has.
    pub fn termination(&self) -> Option<StreamTermination> {
        self.lock().terminated.clone()
    }

    /// Whether the stream is still open.
    pub fn is_open(&self) -> bool {
        self.lock().terminated.is_none()
    }

    /// The client closed the connection.
    pub fn disconnect(&self) {
        self.terminate(StreamTermination::Completed);
    }

    /// The transport failed.
    pub fn fail(&self, error: AppError) {
        self.terminate(StreamTermination::Errored(error));
    }

    /// The transport timed out.
    pub fn time_out(&self) {
        self.terminate(StreamTermination::TimedOut);
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn terminate(&self, how: StreamTermination) {
        let mut lifecycle = self.lock();
        if lifecycle.terminated.is_some() {
            return;
        }
        lifecycle.terminated = Some(how.clone());
        self.closed.cancel();

        let completion = std::mem::take(&mut lifecycle.completion);
        let error = std::mem::take(&mut lifecycle.error);
        let timeout = std::mem::take(&mut lifecycle.timeout);
        drop(lifecycle);

        tracing::debug!(termination = ?how, "Client stream terminated");

        match how {
            StreamTermination::Completed => completion.iter().for_each(|cb| cb()),
            StreamTermination::Errored(err) => error.iter().for_each(|cb| cb(&err)),
            StreamTermination::TimedOut => timeout.iter().for_each(|cb| cb()),
        }
    }
}

#[async_trait]
impl EventEmitter for ChannelEmitter {
    async fn emit(&self, event: EventKind) -> AppResult<()> {
        if !self.is_open() {
            return Err(AppError::client_disconnected("Client stream is closed"));
        }

        let event = Event {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            timestamp: Utc::now(),
            kind: event,
        };

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => {
                Err(AppError::client_disconnected("Client stream is closed"))
            }
            sent = self.sender.send(event) => {
                if sent.is_err() {
                    let err = AppError::client_disconnected("Client stream receiver dropped");
                    self.fail(err.clone());
                    return Err(err);
                }
                Ok(())
            }
        }
    }

    fn complete(&self) {
        self.terminate(StreamTermination::Completed);
    }

    fn on_completion(&self, callback: CompletionCallback) {
        let mut lifecycle = self.lock();
        match &lifecycle.terminated {
            None => lifecycle.completion.push(callback),
            Some(StreamTermination::Completed) => {
                drop(lifecycle);
                callback();
            }
            Some(_) => {}
        }
    }

    fn on_error(&self, callback: ErrorCallback) {
        let mut lifecycle = self.lock();
        match &lifecycle.terminated {
            None => lifecycle.error.push(callback),
            Some(StreamTermination::Errored(err)) => {
                let err = err.clone();
                drop(lifecycle);
                callback(&err);
            }
            Some(_) => {}
        }
    }

    fn on_timeout(&self, callback: CompletionCallback) {
        let mut lifecycle = self.lock();
        match &lifecycle.terminated {
            None => lifecycle.timeout.push(callback),
            Some(StreamTermination::TimedOut) => {
                drop(lifecycle);
                callback();
            }
            Some(_) => {}
        }
    }
}
