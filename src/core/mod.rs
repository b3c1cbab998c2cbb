//! # Core Module
//!
//! The UI-agnostic image pipeline.
//!
//! ## Modules
//! - `buffer` - Pixel buffers, image loading and tiling
//! - `digest` - Content digests and cache fingerprints
//! - `cache` - Persistent and in-memory result stores
//! - `transform` - Named filters and their parameter schemas
//! - `detect` - Region detection
//! - `invoke` - Applying operations through the cache
//! - `pool` - Parallel task execution
//! - `pipeline` - Orchestrates the full workflow

pub mod buffer;
pub mod cache;
pub mod detect;
pub mod digest;
pub mod invoke;
pub mod pipeline;
pub mod pool;
pub mod transform;

// Re-export commonly used types
pub use buffer::{ImageSource, PixelBuffer};
pub use cache::{CacheStore, EvictionPolicy, InMemoryStore, SqliteStore};
pub use detect::{BoundingBox, Detection, Detector};
pub use invoke::CacheStatus;
pub use pipeline::{BatchResult, Outcome, Pipeline, PipelineResult};
pub use transform::{TransformCatalog, TransformRequest, TransformSpec};
