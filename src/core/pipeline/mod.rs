//! # Pipeline Module
//!
//! Orchestrates a batch: one task per input image, executed on the worker
//! pool, results put back in input order.
//!
//! ## Per-image steps
//! 1. **Load** - decode the source image
//! 2. **Transform** - apply each requested transform left to right, through
//!    the cache
//! 3. **Detect** - optionally run the detector last, through the cache
//!
//! Any failure in a step ends that image's task with a `Failure` result;
//! the rest of the batch is unaffected.

mod executor;
mod task;

pub use executor::{BatchResult, CancellationToken, Pipeline, PipelineBuilder, PipelineConfig};
pub use task::{Outcome, PipelineResult, PipelineTask, StepRecord, TaskOutput, TaskState};
