//! Pub/sub addressing for waiting-queue notifications.
//!
//! Every queued user owns exactly one channel, named
//! `lab:<labId>:queue:<userId>`. Publishers (the coordinator on any node)
//! address the user by name alone, so whichever process holds the user's
//! blocking `enqueue` call receives the signal.

use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

use super::id::{LabId, UserId};

/// Payload sent to a waiter to ask for a position refresh.
pub const KEEP_IN_QUEUE: &str = "keep-in-queue";

/// Deterministic channel address for one user waiting on one laboratory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueChannel {
    /// Laboratory the user is waiting for.
    pub lab_id: LabId,
    /// The waiting user.
    pub user_id: UserId,
}

impl QueueChannel {
    /// Address the channel for `user_id` in `lab_id`'s queue.
    pub fn new(lab_id: LabId, user_id: UserId) -> Self {
        Self { lab_id, user_id }
    }

    /// The wire name used on the bus.
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for QueueChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lab:{}:queue:{}", self.lab_id, self.user_id)
    }
}

impl FromStr for QueueChannel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AppError::validation(format!("Invalid queue channel name '{s}'"));

        let mut parts = s.split(':');
        match (parts.next(), parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("lab"), Some(lab), Some("queue"), Some(user), None) => Ok(Self {
                lab_id: lab.parse().map_err(|_| invalid())?,
                user_id: user.parse().map_err(|_| invalid())?,
            }),
            _ => Err(invalid()),
        }
    }
}

/// A decoded message received on a [`QueueChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueSignal {
    /// Stay in line and recompute the displayed position.
    KeepInQueue,
    /// Leave the queue: a slot was granted.
    Promote,
}

impl QueueSignal {
    /// Decode a raw bus payload. Anything other than the keep-in-queue
    /// marker (normally the empty string) is a promotion.
    pub fn from_payload(payload: &str) -> Self {
        if payload == KEEP_IN_QUEUE {
            Self::KeepInQueue
        } else {
            Self::Promote
        }
    }

    /// Encode for publishing.
    pub fn as_payload(&self) -> &'static str {
        match self {
            Self::KeepInQueue => KEEP_IN_QUEUE,
            Self::Promote => "",
        }
    }
}
