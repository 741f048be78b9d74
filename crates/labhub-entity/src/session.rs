//! Laboratory session entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

use labhub_core::types::id::{LabId, SessionId, UserId};

/// Lifecycle state of a [`LabSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "session_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// The owner currently occupies the laboratory.
    InProgress,
    /// The session ended (deadline, disconnect, error, or sweep).
    Completed,
}

impl SessionState {
    /// Return the state as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    /// Check if the state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One user's time-bounded occupancy of a laboratory.
///
/// At most one `InProgress` session exists per (laboratory, owner), and
/// `end_time` is always after `start_time`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LabSession {
    /// Unique session identifier.
    pub id: SessionId,
    /// Laboratory being used.
    pub lab_id: LabId,
    /// User occupying the laboratory.
    pub owner_id: UserId,
    /// Admission time.
    pub start_time: DateTime<Utc>,
    /// Scheduled end; corrected to the actual end on termination.
    pub end_time: DateTime<Utc>,
    /// Current state.
    pub state: SessionState,
}

impl LabSession {
    /// Whether the session still occupies its laboratory.
    pub fn is_in_progress(&self) -> bool {
        self.state == SessionState::InProgress
    }

    /// Whether an InProgress session has outlived its scheduled end.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_in_progress() && self.end_time <= now
    }
}

/// Data required to create a new session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLabSession {
    /// Laboratory being used.
    pub lab_id: LabId,
    /// User occupying the laboratory.
    pub owner_id: UserId,
    /// Admission time.
    pub start_time: DateTime<Utc>,
    /// Scheduled end.
    pub end_time: DateTime<Utc>,
    /// Initial state (normally `InProgress`).
    pub state: SessionState,
}
