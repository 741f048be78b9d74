//! Waiting-queue entry entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use labhub_core::types::id::{LabId, UserId};

/// A pending request for laboratory access.
///
/// `insertion_order` is assigned from a single increasing sequence and is
/// the only ordering key; a user appears at most once per laboratory.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QueueEntry {
    /// Laboratory being waited on.
    pub lab_id: LabId,
    /// Waiting user.
    pub user_id: UserId,
    /// Arrival sequence number.
    pub insertion_order: i64,
    /// Arrival time.
    pub enqueued_at: DateTime<Utc>,
}
