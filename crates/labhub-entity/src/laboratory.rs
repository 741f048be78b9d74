//! Laboratory entity.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use labhub_core::types::id::LabId;

/// A schedulable remote hardware resource.
///
/// Laboratories are owned by the administrative side of the platform;
/// LabHub only reads them.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Laboratory {
    /// Unique laboratory identifier.
    pub id: LabId,
    /// Display name.
    pub name: String,
    /// Allotted session length in seconds. `None` when not yet configured.
    pub duration_seconds: Option<i64>,
    /// How many sessions may run at the same time.
    pub capacity: i32,
}

impl Laboratory {
    /// Configured session length, if set and positive.
    pub fn duration(&self) -> Option<Duration> {
        self.duration_seconds
            .filter(|secs| *secs > 0)
            .map(|secs| Duration::from_secs(secs as u64))
    }

    /// Whether `in_progress` running sessions leave room for another.
    pub fn has_free_slot(&self, in_progress: u64) -> bool {
        in_progress < self.capacity.max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lab(duration_seconds: Option<i64>, capacity: i32) -> Laboratory {
        Laboratory {
            id: LabId::new(),
            name: "FPGA bench".to_string(),
            duration_seconds,
            capacity,
        }
    }

    #[test]
    fn test_duration_requires_positive_value() {
        assert_eq!(lab(Some(300), 1).duration(), Some(Duration::from_secs(300)));
        assert_eq!(lab(Some(0), 1).duration(), None);
        assert_eq!(lab(None, 1).duration(), None);
    }

    #[test]
    fn test_free_slot() {
        let lab = lab(Some(300), 2);
        assert!(lab.has_free_slot(1));
        assert!(!lab.has_free_slot(2));
    }
}
