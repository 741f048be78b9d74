//! Convenience result type alias for LabHub.

use crate::error::AppError;

/// A specialized `Result` type for LabHub operations.
pub type AppResult<T> = Result<T, AppError>;
