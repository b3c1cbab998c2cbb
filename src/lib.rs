//! # Photolab Express
//!
//! Batch image filtering with a content-addressed result cache.
//!
//! Each input image runs through a sequence of named filters and an
//! optional region detector. Deterministic steps are keyed by a fingerprint
//! of the operation, its parameters and the exact input bytes, so repeating
//! work on the same pixels is served from the cache instead of recomputed.
//!
//! ## Architecture
//! - `core` - The pipeline engine (UI-agnostic)
//! - `events` - Event-driven progress reporting
//! - `error` - Error taxonomy

pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{PhotolabError, Result};

/// Initialize tracing for the library
///
/// `RUST_LOG` controls the filter; `default_level` applies when it is unset.
/// Calling this twice is harmless; the second call leaves the first
/// subscriber in place.
pub fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
