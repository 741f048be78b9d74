//! # labhub-database
//!
//! Persistence for LabHub: the store traits the session lifecycle manager
//! and waiting-queue coordinator consume, their PostgreSQL implementations
//! (sqlx), and in-memory implementations for single-node deployments and
//! tests.

pub mod connection;
pub mod memory;
pub mod migration;
pub mod repositories;
pub mod store;

pub use connection::DatabasePool;
pub use store::{LaboratoryStore, QueueStore, SessionStore, SessionUpdate};
