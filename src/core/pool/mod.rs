//! # Pool Module
//!
//! Runs independent per-image tasks on a fixed-size rayon thread pool.
//!
//! Each task runs under `catch_unwind`, so a panicking kernel turns into a
//! `Failure` result for that image only. Results are returned in completion
//! order; restoring input order is the orchestrator's job.

use crate::core::pipeline::{PipelineResult, PipelineTask};
use crate::error::{ConfigError, KernelError, TaskFailure};
use crossbeam_channel::unbounded;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error};

/// Default degree of parallelism: one worker per logical CPU
pub fn default_workers() -> usize {
    num_cpus::get().max(1)
}

/// Fixed-size pool of worker threads
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl WorkerPool {
    /// Create a pool with `workers` threads
    pub fn new(workers: usize) -> Result<Self, ConfigError> {
        if workers == 0 {
            return Err(ConfigError::InvalidWorkerCount { value: workers });
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("photolab-worker-{}", i))
            .build()
            .map_err(|e| ConfigError::WorkerPool(e.to_string()))?;

        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Execute every task, returning one result per task in completion order
    pub fn run<F>(&self, tasks: Vec<PipelineTask>, execute: F) -> Vec<PipelineResult>
    where
        F: Fn(PipelineTask) -> PipelineResult + Sync,
    {
        let total = tasks.len();
        let (sender, receiver) = unbounded();
        let execute = &execute;

        self.pool.scope(|scope| {
            for task in tasks {
                let sender = sender.clone();
                scope.spawn(move |_| {
                    let ordinal = task.ordinal;
                    let source = task.source.label();
                    let result = catch_unwind(AssertUnwindSafe(|| execute(task))).unwrap_or_else(|payload| {
                        let message = panic_message(payload.as_ref());
                        error!(ordinal, source = %source, "worker panicked: {}", message);
                        let failure = KernelError::Panicked {
                            operation: "worker".to_string(),
                            message,
                        };
                        PipelineResult::failed(ordinal, source, Vec::new(), TaskFailure::kernel("worker", &failure))
                    });
                    // Receiver outlives the scope
                    let _ = sender.send(result);
                });
            }
        });
        drop(sender);

        let results: Vec<PipelineResult> = receiver.iter().collect();
        debug!(total, returned = results.len(), workers = self.workers, "pool drained");
        results
    }
}

/// Extract the message from a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
