//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use labhub_core::config::AppConfig;
use labhub_core::events::EventKind;
use labhub_core::result::AppResult;
use labhub_core::traits::MonotonicClock;
use labhub_core::types::id::{LabId, UserId};
use labhub_database::memory::{MemoryLaboratoryStore, MemoryQueueStore, MemorySessionStore};
use labhub_entity::Laboratory;
use labhub_realtime::{ChannelEmitter, EventStream, MemoryPubSub};
use labhub::{LabHub, Stores};
use labhub_service::{Admission, AdmissionService, SessionSweeper, WaitingQueueCoordinator};

/// A client connected to the server.
pub struct Client {
    pub user_id: UserId,
    pub emitter: Arc<ChannelEmitter>,
    pub stream: EventStream,
    pub handle: JoinHandle<AppResult<Option<Admission>>>,
}

impl Client {
    /// Next event body. Panics if the stream ended.
    pub async fn next(&mut self) -> EventKind {
        self.stream
            .recv()
            .await
            .map(|e| e.kind)
            .expect("client stream ended")
    }

    /// Next queue position. Panics on any other event.
    pub async fn next_position(&mut self) -> u64 {
        match self.next().await {
            EventKind::WaitingQueue { position, .. } => position,
            other => panic!("expected a queue position, got {other:?}"),
        }
    }

    /// Everything already buffered.
    pub fn drain(&mut self) -> Vec<EventKind> {
        let mut events = Vec::new();
        while let Some(event) = self.stream.try_recv() {
            events.push(event.kind);
        }
        events
    }
}

/// In-memory LabHub wired the way the server wires it.
pub struct TestApp {
    pub hub: LabHub,
    pub labs: Arc<MemoryLaboratoryStore>,
    pub sessions: Arc<MemorySessionStore>,
    pub queue: Arc<MemoryQueueStore>,
    pub admission: AdmissionService,
    pub coordinator: WaitingQueueCoordinator,
    pub sweeper: SessionSweeper,
    cancel: CancellationToken,
}

impl TestApp {
    /// Build the application and start the promotion listener. The sweeper
    /// is left to the tests.
    pub async fn new() -> Self {
        let config = AppConfig::default();
        let labs = Arc::new(MemoryLaboratoryStore::new());
        let sessions = Arc::new(MemorySessionStore::new());
        let queue = Arc::new(MemoryQueueStore::new());
        let bus = Arc::new(MemoryPubSub::new(config.realtime.channel_buffer_size));

        let stores = Stores {
            labs: labs.clone(),
            sessions: sessions.clone(),
            queue: queue.clone(),
            pool: None,
        };
        let hub = LabHub::new(config, stores, bus, Arc::new(MonotonicClock::new()));

        let cancel = CancellationToken::new();
        tokio::spawn(
            hub.promotion
                .clone()
                .run(hub.hooks.subscribe(), cancel.clone()),
        );

        Self {
            admission: hub.admission.clone(),
            coordinator: hub.coordinator.clone(),
            sweeper: hub.sweeper.clone(),
            hub,
            labs,
            sessions,
            queue,
            cancel,
        }
    }

    /// Register a laboratory.
    pub async fn create_lab(&self, duration_seconds: i64, capacity: i32) -> LabId {
        let id = LabId::new();
        self.labs
            .insert(Laboratory {
                id,
                name: format!("Test lab {id}"),
                duration_seconds: Some(duration_seconds),
                capacity,
            })
            .await;
        id
    }

    /// Connect a new user and ask for a slot in `lab_id`.
    pub fn join(&self, lab_id: LabId) -> Client {
        let user_id = UserId::new();
        let (emitter, stream) = ChannelEmitter::new(self.hub.config.realtime.emitter_buffer_size);
        let handle = {
            let admission = self.admission.clone();
            let emitter = emitter.clone();
            tokio::spawn(async move { admission.admit(lab_id, user_id, emitter).await })
        };
        Client {
            user_id,
            emitter,
            stream,
            handle,
        }
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
