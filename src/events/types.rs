//! Event type definitions for progress reporting.

use crate::core::invoke::CacheStatus;
use crate::core::pipeline::TaskState;
use crate::error::TaskFailure;
use serde::{Deserialize, Serialize};

/// All events emitted while a batch runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Batch-level events
    Batch(BatchEvent),
    /// Per-image events
    Task(TaskEvent),
    /// Cache health events
    Cache(CacheEvent),
}

impl From<BatchEvent> for Event {
    fn from(event: BatchEvent) -> Self {
        Event::Batch(event)
    }
}

impl From<TaskEvent> for Event {
    fn from(event: TaskEvent) -> Self {
        Event::Task(event)
    }
}

impl From<CacheEvent> for Event {
    fn from(event: CacheEvent) -> Self {
        Event::Cache(event)
    }
}

/// Batch-level events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BatchEvent {
    /// Batch has started
    Started { total_images: usize, workers: usize },
    /// Progress update after each image finishes
    Progress(BatchProgress),
    /// Batch completed; per-image failures are counted, not fatal
    Completed { summary: BatchSummary },
    /// Cancellation was requested; unstarted images will fail
    Cancelled,
    /// Batch could not run at all
    Error { message: String },
}

/// Progress information while images are processed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProgress {
    /// Number of images finished so far, in either outcome
    pub completed: usize,
    /// Total number of images in the batch
    pub total: usize,
    /// Image that just finished
    pub current: String,
}

/// Per-image events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskEvent {
    /// Task moved to a new lifecycle state
    StateChanged { ordinal: usize, state: TaskState },
    /// One transform or detector step finished
    StepCompleted {
        ordinal: usize,
        operation: String,
        cache: CacheStatus,
    },
    /// Task failed; the batch continues
    Failed { ordinal: usize, failure: TaskFailure },
}

/// Cache health events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CacheEvent {
    /// A storage error was downgraded to a miss or a dropped write
    Degraded { operation: String, reason: String },
}

/// Summary of a finished batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_images: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cache_hits: usize,
    pub cache_writes: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    #[test]
    fn events_are_serializable() {
        let event = Event::Task(TaskEvent::StepCompleted {
            ordinal: 2,
            operation: "sharpen".to_string(),
            cache: CacheStatus::Hit,
        });

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: Event = serde_json::from_str(&json).unwrap();

        match deserialized {
            Event::Task(TaskEvent::StepCompleted { ordinal, cache, .. }) => {
                assert_eq!(ordinal, 2);
                assert_eq!(cache, CacheStatus::Hit);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn failure_event_keeps_step_and_kind() {
        let event = Event::Task(TaskEvent::Failed {
            ordinal: 1,
            failure: TaskFailure {
                step: "load".to_string(),
                kind: FailureKind::Io,
                message: "no such file".to_string(),
            },
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"load\""));
        assert!(json.contains("Io"));
    }

    #[test]
    fn summary_round_trips() {
        let summary = BatchSummary {
            total_images: 3,
            succeeded: 2,
            failed: 1,
            cache_hits: 0,
            cache_writes: 4,
            duration_ms: 12,
        };
        let json = serde_json::to_string(&Event::Batch(BatchEvent::Completed {
            summary: summary.clone(),
        }))
        .unwrap();

        match serde_json::from_str::<Event>(&json).unwrap() {
            Event::Batch(BatchEvent::Completed { summary: back }) => assert_eq!(back, summary),
            _ => panic!("Wrong event type"),
        }
    }
}
