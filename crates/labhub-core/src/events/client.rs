//! Client-facing event stream model.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::id::LabId;

/// A single message delivered to one client stream.
///
/// `id` is stamped by the emitter and never decreases within a stream. It
/// exists for client-side ordering and replay, not deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Per-stream sequence number.
    pub id: u64,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
    /// The event body.
    #[serde(flatten)]
    pub kind: EventKind,
}

/// The body of an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    /// A session lifecycle or informational message.
    Message {
        /// What the message announces.
        message_type: MessageType,
        /// Time left in the session, when relevant.
        #[serde(skip_serializing_if = "Option::is_none")]
        remaining_time: Option<RemainingTime>,
    },
    /// The user's current place in a laboratory's waiting queue (1-based).
    WaitingQueue {
        /// Laboratory being waited on.
        lab_id: LabId,
        /// 1-based position.
        position: u64,
    },
}

impl EventKind {
    /// A message with a remaining-time payload.
    pub fn message(message_type: MessageType, remaining: RemainingTime) -> Self {
        Self::Message {
            message_type,
            remaining_time: Some(remaining),
        }
    }

    /// A message without a payload.
    pub fn notice(message_type: MessageType) -> Self {
        Self::Message {
            message_type,
            remaining_time: None,
        }
    }

    /// The message type, if this is a message.
    pub fn message_type(&self) -> Option<MessageType> {
        match self {
            Self::Message { message_type, .. } => Some(*message_type),
            Self::WaitingQueue { .. } => None,
        }
    }
}

/// Message kinds carried by [`EventKind::Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Minute-granularity reminder during the bulk of the session.
    SessionWarning,
    /// Second-granularity countdown in the final window.
    SessionEnding,
    /// The session reached its deadline.
    SessionFinished,
    /// The user left the waiting queue and is being admitted.
    QueuePromoted,
}

/// Unit of a [`RemainingTime`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    /// Whole minutes.
    Minutes,
    /// Whole seconds.
    Seconds,
}

/// Remaining session time as shown to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemainingTime {
    /// Amount in `unit`.
    pub value: u64,
    /// Unit of `value`.
    pub unit: TimeUnit,
}

impl RemainingTime {
    /// Whole seconds.
    pub fn seconds(value: u64) -> Self {
        Self {
            value,
            unit: TimeUnit::Seconds,
        }
    }

    /// Minutes when at least one full minute is left, seconds otherwise.
    /// Minutes are truncated.
    pub fn for_warning(remaining: Duration) -> Self {
        let secs = remaining.as_secs();
        if secs >= 60 {
            Self {
                value: secs / 60,
                unit: TimeUnit::Minutes,
            }
        } else {
            Self::seconds(secs)
        }
    }

    /// Lower bound of the remaining time this value represents.
    pub fn as_duration(&self) -> Duration {
        match self.unit {
            TimeUnit::Minutes => Duration::from_secs(self.value * 60),
            TimeUnit::Seconds => Duration::from_secs(self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_units() {
        let five_min = RemainingTime::for_warning(Duration::from_secs(300));
        assert_eq!(five_min.unit, TimeUnit::Minutes);
        assert_eq!(five_min.value, 5);

        let partial = RemainingTime::for_warning(Duration::from_secs(119));
        assert_eq!(partial.value, 1);

        let tail = RemainingTime::for_warning(Duration::from_secs(15));
        assert_eq!(tail, RemainingTime::seconds(15));
        assert_eq!(tail.as_duration(), Duration::from_secs(15));
    }

    #[test]
    fn test_event_json_shape() {
        let event = Event {
            id: 3,
            timestamp: Utc::now(),
            kind: EventKind::message(MessageType::SessionEnding, RemainingTime::seconds(9)),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["event"], "message");
        assert_eq!(json["message_type"], "session_ending");
        assert_eq!(json["remaining_time"]["value"], 9);
        assert_eq!(json["remaining_time"]["unit"], "seconds");

        let notice = serde_json::to_value(EventKind::notice(MessageType::SessionFinished)).unwrap();
        assert!(notice.get("remaining_time").is_none());
    }

    #[test]
    fn test_waiting_queue_json_shape() {
        let lab_id = LabId::new();
        let json = serde_json::to_value(EventKind::WaitingQueue { lab_id, position: 2 }).unwrap();
        assert_eq!(json["event"], "waiting_queue");
        assert_eq!(json["position"], 2);
        assert_eq!(json["lab_id"], lab_id.to_string());
    }
}
