//! # labhub
//!
//! Application wiring for LabHub. [`LabHub`] holds every service built from
//! one [`AppConfig`]; a transport layer embeds it and hands each client
//! connection to [`AdmissionService::admit`].

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use labhub_core::config::AppConfig;
use labhub_core::result::AppResult;
use labhub_core::traits::{Clock, PubSub, SystemClock};
use labhub_database::memory::{MemoryLaboratoryStore, MemoryQueueStore, MemorySessionStore};
use labhub_database::{DatabasePool, LaboratoryStore, QueueStore, SessionStore};
use labhub_service::{
    AdmissionService, PromotionListener, SessionHooks, SessionLifecycleManager, SessionSweeper,
    WaitingQueueCoordinator,
};

/// Persistence handles shared by all services.
#[derive(Debug, Clone)]
pub struct Stores {
    pub labs: Arc<dyn LaboratoryStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub queue: Arc<dyn QueueStore>,
    /// Set when backed by PostgreSQL.
    pub pool: Option<DatabasePool>,
}

impl Stores {
    /// Connect to PostgreSQL and run migrations, or fall back to the
    /// in-memory stores when no database URL is configured.
    pub async fn open(config: &AppConfig) -> AppResult<Self> {
        if !config.database.is_configured() {
            warn!("database.url not set, using in-memory stores");
            return Ok(Self::in_memory());
        }

        let pool = DatabasePool::connect(&config.database).await?;

        info!("Running database migrations...");
        labhub_database::migration::run_migrations(pool.pool()).await?;
        info!("Database migrations complete");

        Ok(Self {
            labs: Arc::new(pool.laboratories()),
            sessions: Arc::new(pool.sessions()),
            queue: Arc::new(pool.queue()),
            pool: Some(pool),
        })
    }

    /// Fresh in-memory stores.
    pub fn in_memory() -> Self {
        Self {
            labs: Arc::new(MemoryLaboratoryStore::new()),
            sessions: Arc::new(MemorySessionStore::new()),
            queue: Arc::new(MemoryQueueStore::new()),
            pool: None,
        }
    }
}

/// Every LabHub service, wired together.
#[derive(Debug, Clone)]
pub struct LabHub {
    pub config: AppConfig,
    pub stores: Stores,
    pub hooks: SessionHooks,
    pub lifecycle: SessionLifecycleManager,
    pub coordinator: WaitingQueueCoordinator,
    pub admission: AdmissionService,
    pub sweeper: SessionSweeper,
    pub promotion: PromotionListener,
}

impl LabHub {
    /// Open stores and the message bus selected by `config`, then wire.
    pub async fn open(config: AppConfig) -> AppResult<Self> {
        let stores = Stores::open(&config).await?;
        let bus = labhub_realtime::build_pubsub(&config.realtime).await?;
        Ok(Self::new(config, stores, bus, Arc::new(SystemClock)))
    }

    /// Wire services over existing stores and bus.
    pub fn new(
        config: AppConfig,
        stores: Stores,
        bus: Arc<dyn PubSub>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let hooks = SessionHooks::default();

        let lifecycle = SessionLifecycleManager::new(
            Arc::clone(&stores.labs),
            Arc::clone(&stores.sessions),
            Arc::clone(&clock),
            hooks.clone(),
            config.session.clone(),
        );
        let coordinator = WaitingQueueCoordinator::new(Arc::clone(&stores.queue), bus);
        let admission = AdmissionService::new(
            Arc::clone(&stores.labs),
            Arc::clone(&stores.sessions),
            coordinator.clone(),
            lifecycle.clone(),
        );
        let sweeper = SessionSweeper::new(
            Arc::clone(&stores.sessions),
            clock,
            hooks.clone(),
            config.session.clone(),
        );
        let promotion = PromotionListener::new(
            coordinator.clone(),
            Arc::clone(&stores.labs),
            Arc::clone(&stores.sessions),
            config.queue.clone(),
        );

        Self {
            config,
            stores,
            hooks,
            lifecycle,
            coordinator,
            admission,
            sweeper,
            promotion,
        }
    }

    /// Start the promotion listener and the session sweeper.
    ///
    /// Both stop when `cancel` fires.
    pub fn spawn_background(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        let promotion = self.promotion.clone();
        let events = self.hooks.subscribe();
        let sweeper = self.sweeper.clone();

        vec![
            tokio::spawn(promotion.run(events, cancel.clone())),
            tokio::spawn(sweeper.run(cancel.clone())),
        ]
    }

    /// Release the database pool, if any.
    pub async fn close(&self) {
        if let Some(pool) = &self.stores.pool {
            pool.close().await;
        }
    }
}
