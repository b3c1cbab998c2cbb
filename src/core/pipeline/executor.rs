//! Pipeline execution implementation.

use super::task::{reassemble, Outcome, PipelineResult, PipelineTask, StepRecord, TaskOutput, TaskState};
use crate::core::buffer::ImageSource;
use crate::core::cache::{CacheStore, InMemoryStore};
use crate::core::detect::{Detector, SkinToneDetector};
use crate::core::digest::Fingerprint;
use crate::core::invoke::{CacheStatus, CachedInvoker, InvokeStats};
use crate::core::pool::{default_workers, panic_message, WorkerPool};
use crate::core::transform::{TransformCatalog, TransformRequest, TransformSpec};
use crate::error::{ConfigError, KernelError, PhotolabError, TaskFailure};
use crate::events::{BatchEvent, BatchProgress, BatchSummary, EventSender, TaskEvent, null_sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Result of a batch run
#[derive(Debug)]
pub struct BatchResult {
    /// One result per input image, in input order
    pub results: Vec<PipelineResult>,
    pub summary: BatchSummary,
    /// Cache counters for this run
    pub cache: InvokeStats,
}

impl BatchResult {
    pub fn succeeded(&self) -> usize {
        self.summary.succeeded
    }

    pub fn failed(&self) -> usize {
        self.summary.failed
    }
}

/// Configuration for the pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Transform sequence, applied left to right
    pub transforms: Vec<TransformRequest>,
    /// Run the detector after the last transform
    pub detect: bool,
    /// Worker threads
    pub workers: usize,
    /// When false no store is consulted and every step reports `Disabled`
    pub cache_enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            transforms: Vec::new(),
            detect: false,
            workers: default_workers(),
            cache_enabled: true,
        }
    }
}

/// Cooperative cancellation for a running batch
///
/// Tasks that have not started when the token is cancelled fail with kind
/// `Cancelled`; tasks already running finish normally.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Builder for pipeline configuration
pub struct PipelineBuilder {
    config: PipelineConfig,
    cache: Option<Arc<dyn CacheStore>>,
    catalog: Option<TransformCatalog>,
    detector: Option<Arc<dyn Detector>>,
    cancel: CancellationToken,
}

impl PipelineBuilder {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            cache: None,
            catalog: None,
            detector: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the transform sequence
    pub fn transforms(mut self, transforms: Vec<TransformRequest>) -> Self {
        self.config.transforms = transforms;
        self
    }

    /// Append one transform to the sequence
    pub fn transform(mut self, transform: TransformRequest) -> Self {
        self.config.transforms.push(transform);
        self
    }

    /// Run the detector as the last step
    pub fn detect(mut self, detect: bool) -> Self {
        self.config.detect = detect;
        self
    }

    /// Set the number of worker threads
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Set the cache store. Defaults to a fresh in-memory store.
    pub fn cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self.config.cache_enabled = true;
        self
    }

    /// Run without any cache
    pub fn no_cache(mut self) -> Self {
        self.cache = None;
        self.config.cache_enabled = false;
        self
    }

    /// Use a custom transform catalog instead of the built-in one
    pub fn catalog(mut self, catalog: TransformCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Use a custom detector instead of [`SkinToneDetector`]
    pub fn detector(mut self, detector: impl Detector + 'static) -> Self {
        self.detector = Some(Arc::new(detector));
        self
    }

    /// Share a cancellation token with the caller
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Resolve every transform request and build the pipeline
    pub fn build(self) -> Result<Pipeline, ConfigError> {
        let catalog = self.catalog.unwrap_or_default();
        let steps = self
            .config
            .transforms
            .iter()
            .map(|request| catalog.resolve(request))
            .collect::<Result<Vec<_>, _>>()?;
        let pool = WorkerPool::new(self.config.workers)?;

        let cache = if self.config.cache_enabled {
            Some(self.cache.unwrap_or_else(|| Arc::new(InMemoryStore::new())))
        } else {
            None
        };

        Ok(Pipeline {
            config: self.config,
            steps: Arc::from(steps),
            catalog,
            detector: self.detector.unwrap_or_else(|| Arc::new(SkinToneDetector::new())),
            cache,
            pool,
            cancel: self.cancel,
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The batch image pipeline
pub struct Pipeline {
    config: PipelineConfig,
    steps: Arc<[TransformSpec]>,
    catalog: TransformCatalog,
    detector: Arc<dyn Detector>,
    cache: Option<Arc<dyn CacheStore>>,
    pool: WorkerPool,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Create a new pipeline builder
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The resolved transform sequence
    pub fn steps(&self) -> &[TransformSpec] {
        &self.steps
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the pipeline without events
    pub fn run(&self, images: &[ImageSource]) -> Result<BatchResult, PhotolabError> {
        self.run_with_events(images, &null_sender())
    }

    /// Run the pipeline with event reporting
    ///
    /// Fails outright only when the cache cannot be reached at start-up.
    /// Every per-image problem is returned as a `Failure` in its slot.
    pub fn run_with_events(
        &self,
        images: &[ImageSource],
        events: &EventSender,
    ) -> Result<BatchResult, PhotolabError> {
        let start_time = Instant::now();

        if let Some(cache) = &self.cache {
            let reachable = Fingerprint::from_bytes(&[0; 32]).map_or(Ok(false), |fp| cache.contains(&fp));
            if let Err(e) = reachable {
                error!(error = %e, "cache unavailable at start-up");
                events.send(BatchEvent::Error {
                    message: e.to_string(),
                });
                return Err(e.into());
            }
        }

        let total = images.len();
        info!(
            images = total,
            workers = self.pool.workers(),
            steps = self.steps.len(),
            detect = self.config.detect,
            "batch started"
        );
        events.send(BatchEvent::Started {
            total_images: total,
            workers: self.pool.workers(),
        });

        let invoker = CachedInvoker::new(self.cache.clone()).with_events(events.clone());
        let labels: Vec<String> = images.iter().map(ImageSource::label).collect();
        let tasks: Vec<PipelineTask> = images
            .iter()
            .enumerate()
            .map(|(ordinal, source)| PipelineTask {
                ordinal,
                source: source.clone(),
                steps: Arc::clone(&self.steps),
                detect: self.config.detect,
            })
            .collect();

        let completed = AtomicUsize::new(0);
        let finished = self.pool.run(tasks, |task| {
            let result = self.execute(task, &invoker, events);
            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            events.send(BatchEvent::Progress(BatchProgress {
                completed: done,
                total,
                current: result.source.clone(),
            }));
            result
        });

        let results = reassemble(&labels, finished);
        let cache = invoker.stats();
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let summary = BatchSummary {
            total_images: total,
            succeeded,
            failed: total - succeeded,
            cache_hits: cache.hits,
            cache_writes: cache.writes,
            duration_ms: start_time.elapsed().as_millis() as u64,
        };

        if self.cancel.is_cancelled() {
            events.send(BatchEvent::Cancelled);
        }
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            cache_hits = summary.cache_hits,
            cache_writes = summary.cache_writes,
            duration_ms = summary.duration_ms,
            "batch finished"
        );
        events.send(BatchEvent::Completed {
            summary: summary.clone(),
        });

        Ok(BatchResult {
            results,
            summary,
            cache,
        })
    }

    /// Run one task to a terminal state
    fn execute(&self, task: PipelineTask, invoker: &CachedInvoker, events: &EventSender) -> PipelineResult {
        let ordinal = task.ordinal;
        let source = task.source.label();

        if self.cancel.is_cancelled() {
            return self.fail(ordinal, source, Vec::new(), TaskFailure::cancelled(), events);
        }

        self.transition(ordinal, TaskState::Running, events);
        let mut steps = Vec::with_capacity(task.steps.len() + 1);
        match self.run_steps(&task, invoker, events, &mut steps) {
            Ok(output) => {
                self.transition(ordinal, TaskState::Succeeded, events);
                PipelineResult {
                    ordinal,
                    source,
                    steps,
                    outcome: Outcome::Success(output),
                }
            }
            Err(failure) => self.fail(ordinal, source, steps, failure, events),
        }
    }

    fn run_steps(
        &self,
        task: &PipelineTask,
        invoker: &CachedInvoker,
        events: &EventSender,
        steps: &mut Vec<StepRecord>,
    ) -> Result<TaskOutput, TaskFailure> {
        let mut image = task.source.load().map_err(|e| TaskFailure::load(&e))?;

        for spec in task.steps.iter() {
            let (next, cache) = guarded(&spec.name, || invoker.apply(&self.catalog, spec, &[&image]))
                .map_err(|e| TaskFailure::kernel(&spec.name, &e))?;
            record_step(task.ordinal, &spec.name, cache, steps, events);
            image = next;
        }

        let findings = if task.detect {
            let name = self.detector.name();
            let (detection, cache) = guarded(name, || invoker.detect(self.detector.as_ref(), &image))
                .map_err(|e| TaskFailure::kernel(name, &e))?;
            record_step(task.ordinal, name, cache, steps, events);
            image = detection.annotated;
            Some(detection.findings)
        } else {
            None
        };

        Ok(TaskOutput {
            buffer: image,
            findings,
        })
    }

    fn fail(
        &self,
        ordinal: usize,
        source: String,
        steps: Vec<StepRecord>,
        failure: TaskFailure,
        events: &EventSender,
    ) -> PipelineResult {
        warn!(ordinal, source = %source, "{}", failure);
        events.send(TaskEvent::Failed {
            ordinal,
            failure: failure.clone(),
        });
        self.transition(ordinal, TaskState::Failed, events);
        PipelineResult::failed(ordinal, source, steps, failure)
    }

    fn transition(&self, ordinal: usize, state: TaskState, events: &EventSender) {
        events.send(TaskEvent::StateChanged { ordinal, state });
    }
}

fn record_step(
    ordinal: usize,
    operation: &str,
    cache: CacheStatus,
    steps: &mut Vec<StepRecord>,
    events: &EventSender,
) {
    steps.push(StepRecord {
        operation: operation.to_string(),
        cache,
    });
    events.send(TaskEvent::StepCompleted {
        ordinal,
        operation: operation.to_string(),
        cache,
    });
}

/// Run a kernel call, turning a panic into a `KernelError` for that step
fn guarded<T>(operation: &str, f: impl FnOnce() -> Result<T, KernelError>) -> Result<T, KernelError> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(KernelError::Panicked {
            operation: operation.to_string(),
            message: panic_message(payload.as_ref()),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::buffer::PixelBuffer;
    use crate::core::transform::{ParamValue, Params, Transform};
    use crate::error::FailureKind;
    use crate::events::{Event, EventChannel};
    use std::collections::HashMap;

    fn memory(label: &str, seed: u8) -> ImageSource {
        ImageSource::Memory {
            label: label.to_string(),
            buffer: PixelBuffer::from_fn(12, 10, 3, |x, y, px| {
                px.copy_from_slice(&[seed.wrapping_add(x as u8 * 9), y as u8 * 20, 128])
            })
            .unwrap(),
        }
    }

    struct Exploding;

    impl Transform for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        fn apply(&self, _: &[&PixelBuffer], _: &Params) -> Result<PixelBuffer, KernelError> {
            panic!("native state corrupted")
        }
    }

    #[test]
    fn builder_defaults() {
        let pipeline = Pipeline::builder().build().unwrap();

        assert!(pipeline.steps().is_empty());
        assert!(!pipeline.config().detect);
        assert!(pipeline.config().cache_enabled);
        assert_eq!(pipeline.config().workers, default_workers());
    }

    #[test]
    fn unknown_transform_is_rejected_at_build() {
        let result = Pipeline::builder()
            .transform(TransformRequest::named("posterize"))
            .build();

        assert!(matches!(result, Err(ConfigError::UnknownTransform { .. })));
    }

    #[test]
    fn invalid_parameter_is_rejected_at_build() {
        let result = Pipeline::builder()
            .transform(TransformRequest::named("gaussian_blur").with("kernel_size", ParamValue::Int(4)))
            .build();

        assert!(matches!(result, Err(ConfigError::InvalidParameter { .. })));
    }

    #[test]
    fn zero_workers_is_rejected_at_build() {
        let result = Pipeline::builder().workers(0).build();
        assert!(matches!(result, Err(ConfigError::InvalidWorkerCount { value: 0 })));
    }

    #[test]
    fn steps_thread_output_into_next_input() {
        let catalog = TransformCatalog::with_builtins();
        let pipeline = Pipeline::builder()
            .transform(TransformRequest::named("gaussian_blur"))
            .transform(TransformRequest::named("sharpen"))
            .workers(2)
            .build()
            .unwrap();
        let source = memory("a", 3);

        let batch = pipeline.run(std::slice::from_ref(&source)).unwrap();

        let input = source.load().unwrap();
        let blurred = catalog.apply(&pipeline.steps()[0], &[&input]).unwrap();
        let expected = catalog.apply(&pipeline.steps()[1], &[&blurred]).unwrap();
        assert_eq!(batch.results[0].output().unwrap().buffer, expected);
    }

    #[test]
    fn empty_batch_succeeds() {
        let pipeline = Pipeline::builder()
            .transform(TransformRequest::named("sharpen"))
            .build()
            .unwrap();

        let batch = pipeline.run(&[]).unwrap();

        assert!(batch.results.is_empty());
        assert_eq!(batch.summary.total_images, 0);
    }

    #[test]
    fn panicking_kernel_names_its_step() {
        let mut catalog = TransformCatalog::with_builtins();
        catalog.register(Exploding);
        let pipeline = Pipeline::builder()
            .catalog(catalog)
            .transform(TransformRequest::named("sharpen"))
            .transform(TransformRequest::named("exploding"))
            .build()
            .unwrap();

        let batch = pipeline.run(&[memory("a", 1)]).unwrap();

        let failure = batch.results[0].failure().unwrap();
        assert_eq!(failure.step, "exploding");
        assert_eq!(failure.kind, FailureKind::Kernel);
        assert!(failure.message.contains("native state corrupted"));
        assert_eq!(batch.results[0].step("sharpen"), Some(CacheStatus::Stored));
    }

    #[test]
    fn detection_attaches_findings() {
        let pipeline = Pipeline::builder().detect(true).build().unwrap();

        let batch = pipeline.run(&[memory("a", 1)]).unwrap();

        let output = batch.results[0].output().unwrap();
        assert!(output.findings.is_some());
        assert_eq!(batch.results[0].step("face_detect"), Some(CacheStatus::Stored));
    }

    #[test]
    fn no_cache_reports_disabled_steps() {
        let pipeline = Pipeline::builder()
            .transform(TransformRequest::named("sharpen"))
            .no_cache()
            .build()
            .unwrap();

        let batch = pipeline.run(&[memory("a", 1)]).unwrap();

        assert_eq!(batch.results[0].step("sharpen"), Some(CacheStatus::Disabled));
        assert_eq!(batch.summary.cache_writes, 0);
    }

    #[test]
    fn cancelled_batch_fails_unstarted_tasks() {
        let token = CancellationToken::new();
        let pipeline = Pipeline::builder()
            .transform(TransformRequest::named("sharpen"))
            .cancellation(token.clone())
            .build()
            .unwrap();
        token.cancel();

        let batch = pipeline.run(&[memory("a", 1), memory("b", 2)]).unwrap();

        assert_eq!(batch.failed(), 2);
        for result in &batch.results {
            assert_eq!(result.failure().unwrap().kind, FailureKind::Cancelled);
        }
    }

    #[test]
    fn task_events_follow_the_state_machine() {
        let pipeline = Pipeline::builder()
            .transform(TransformRequest::named("sharpen"))
            .workers(3)
            .build()
            .unwrap();
        let images = vec![
            memory("a", 1),
            ImageSource::Path("/definitely/missing.png".into()),
            memory("c", 3),
        ];
        let (sender, receiver) = EventChannel::new();

        pipeline.run_with_events(&images, &sender).unwrap();

        let mut states: HashMap<usize, TaskState> = HashMap::new();
        let mut completed = None;
        for event in receiver.drain() {
            match event {
                Event::Task(TaskEvent::StateChanged { ordinal, state }) => {
                    let previous = states.get(&ordinal).copied().unwrap_or(TaskState::Pending);
                    assert!(previous.can_transition_to(state), "{:?} -> {:?}", previous, state);
                    states.insert(ordinal, state);
                }
                Event::Batch(BatchEvent::Completed { summary }) => completed = Some(summary),
                _ => {}
            }
        }

        assert_eq!(states[&0], TaskState::Succeeded);
        assert_eq!(states[&1], TaskState::Failed);
        assert_eq!(states[&2], TaskState::Succeeded);
        let summary = completed.unwrap();
        assert_eq!((summary.succeeded, summary.failed), (2, 1));
    }
}
