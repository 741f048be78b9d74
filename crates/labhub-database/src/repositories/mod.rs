//! PostgreSQL implementations of the store traits.

pub mod laboratory;
pub mod queue;
pub mod session;

pub use laboratory::LaboratoryRepository;
pub use queue::QueueRepository;
pub use session::SessionRepository;

/// Whether a sqlx error is a unique-constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
