use serde::{Deserialize, Serialize};

/// Admission policy applied when the offline queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePolicy {
    /// Refuse the incoming request; its caller receives `QueueCapacity`.
    RejectNewest,
    /// Evict the oldest queued request; its caller receives `QueueDiscarded`.
    #[default]
    EvictOldest,
}
