//! # labhub-entity
//!
//! Records persisted by LabHub. Every struct here is a database row or a
//! value stored in one; all derive `Debug`, `Clone`, `Serialize`,
//! `Deserialize`, and rows additionally derive `sqlx::FromRow`.

pub mod laboratory;
pub mod queue;
pub mod session;

pub use laboratory::Laboratory;
pub use queue::QueueEntry;
pub use session::{LabSession, NewLabSession, SessionState};
