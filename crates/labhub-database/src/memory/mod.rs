//! In-memory store implementations for single-node deployments and tests.
//!
//! Each store guards its state with a Tokio lock, which serializes all
//! mutations on the store (and therefore on any one laboratory's queue).

pub mod laboratory;
pub mod queue;
pub mod session;

pub use laboratory::MemoryLaboratoryStore;
pub use queue::MemoryQueueStore;
pub use session::MemorySessionStore;
