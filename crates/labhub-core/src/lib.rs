//! # labhub-core
//!
//! Core crate for LabHub. Contains the capability traits consumed by the
//! session lifecycle manager and the waiting-queue coordinator, configuration
//! schemas, typed identifiers, the client event model, pub/sub channel
//! addressing, and the unified error system.
//!
//! This crate has **no** internal dependencies on other LabHub crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
