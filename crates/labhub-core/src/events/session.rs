//! Session-related domain events.

use serde::{Deserialize, Serialize};

use crate::types::id::{LabId, SessionId, UserId};

/// Why a session reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// The deadline passed and `session_finished` was delivered.
    Expired,
    /// The client completed, timed out, or errored the stream.
    Disconnected,
    /// An unexpected failure ended the run loop.
    Errored,
    /// The run task was cancelled.
    Cancelled,
    /// The sweeper found the session past its end time.
    Swept,
}

/// Events related to laboratory sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// A user was admitted and a session record was created.
    Created {
        /// The session ID.
        session_id: SessionId,
        /// The laboratory.
        lab_id: LabId,
        /// The session owner.
        owner_id: UserId,
    },
    /// A session was persisted as `Completed`; its laboratory has a free slot.
    Completed {
        /// The session ID.
        session_id: SessionId,
        /// The laboratory.
        lab_id: LabId,
        /// The session owner.
        owner_id: UserId,
        /// How the session ended.
        reason: CompletionReason,
    },
}

impl SessionEvent {
    /// The laboratory this event concerns.
    pub fn lab_id(&self) -> LabId {
        match self {
            Self::Created { lab_id, .. } | Self::Completed { lab_id, .. } => *lab_id,
        }
    }
}
