//! Per-image task and result types.

use crate::core::buffer::{ImageSource, PixelBuffer};
use crate::core::detect::BoundingBox;
use crate::core::invoke::CacheStatus;
use crate::core::transform::TransformSpec;
use crate::error::TaskFailure;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One image's worth of work
#[derive(Debug, Clone)]
pub struct PipelineTask {
    /// Position of the image in the batch input
    pub ordinal: usize,
    pub source: ImageSource,
    /// Resolved transform sequence, shared by every task in a batch
    pub steps: Arc<[TransformSpec]>,
    /// Run the detector after the last transform
    pub detect: bool,
}

/// Lifecycle of a task
///
/// `Pending -> Running -> Succeeded | Failed`. Both outcomes are terminal.
/// A task cancelled before it starts goes straight from `Pending` to
/// `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }

    pub fn can_transition_to(self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Pending, TaskState::Running)
                | (TaskState::Pending, TaskState::Failed)
                | (TaskState::Running, TaskState::Succeeded)
                | (TaskState::Running, TaskState::Failed)
        )
    }
}

/// How one step of a task touched the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub operation: String,
    pub cache: CacheStatus,
}

/// The image a successful task produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutput {
    pub buffer: PixelBuffer,
    /// `None` when detection was not requested
    pub findings: Option<Vec<BoundingBox>>,
}

impl TaskOutput {
    pub fn faces_detected(&self) -> bool {
        self.findings.as_ref().is_some_and(|f| !f.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(TaskOutput),
    Failure(TaskFailure),
}

/// Result of one task, produced by a worker
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub ordinal: usize,
    /// Path or label of the source image
    pub source: String,
    /// Steps that completed before the task finished or failed
    pub steps: Vec<StepRecord>,
    pub outcome: Outcome,
}

impl PipelineResult {
    pub fn failed(ordinal: usize, source: String, steps: Vec<StepRecord>, failure: TaskFailure) -> Self {
        Self {
            ordinal,
            source,
            steps,
            outcome: Outcome::Failure(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    pub fn state(&self) -> TaskState {
        match self.outcome {
            Outcome::Success(_) => TaskState::Succeeded,
            Outcome::Failure(_) => TaskState::Failed,
        }
    }

    pub fn output(&self) -> Option<&TaskOutput> {
        match &self.outcome {
            Outcome::Success(output) => Some(output),
            Outcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&TaskFailure> {
        match &self.outcome {
            Outcome::Success(_) => None,
            Outcome::Failure(failure) => Some(failure),
        }
    }

    /// Cache status of the named step, if it ran
    pub fn step(&self, operation: &str) -> Option<CacheStatus> {
        self.steps
            .iter()
            .find(|s| s.operation == operation)
            .map(|s| s.cache)
    }
}

/// Put results back into input order
///
/// `labels[i]` is the source label of input `i`. A slot the pool never
/// filled becomes a failure, so the output always has one entry per input.
pub(crate) fn reassemble(labels: &[String], completed: Vec<PipelineResult>) -> Vec<PipelineResult> {
    let mut slots: Vec<Option<PipelineResult>> = (0..labels.len()).map(|_| None).collect();
    for result in completed {
        if let Some(slot) = slots.get_mut(result.ordinal) {
            *slot = Some(result);
        }
    }

    slots
        .into_iter()
        .zip(labels)
        .enumerate()
        .map(|(ordinal, (slot, label))| {
            slot.unwrap_or_else(|| {
                PipelineResult::failed(
                    ordinal,
                    label.clone(),
                    Vec::new(),
                    TaskFailure {
                        step: "worker".to_string(),
                        kind: crate::error::FailureKind::Kernel,
                        message: "worker returned no result".to_string(),
                    },
                )
            })
        })
        .collect()
}
