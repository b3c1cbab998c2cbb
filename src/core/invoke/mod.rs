//! # Invoke Module
//!
//! The cached invocation protocol shared by transforms and the detector.
//!
//! For a deterministic operation:
//! 1. digest each input buffer
//! 2. build the fingerprint from the operation, its parameters and the digests
//! 3. look the fingerprint up; on a hit, decode and return without running
//!    the kernel
//! 4. on a miss, run the kernel, store the framed output, return it
//!
//! Non-deterministic operations skip steps 1-4 and never touch the store.
//!
//! The cache is fail-open: a storage error during a lookup is a miss and a
//! storage error during a write is dropped, so a broken disk slows a batch
//! down but never fails it.

use crate::core::buffer::PixelBuffer;
use crate::core::cache::{record, CacheStore};
use crate::core::detect::{Detection, Detector};
use crate::core::digest::{content_digest, Fingerprint, FingerprintBuilder};
use crate::core::transform::{TransformCatalog, TransformSpec};
use crate::error::{KernelError, StorageError};
use crate::events::{CacheEvent, EventSender, null_sender};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// How a single step interacted with the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheStatus {
    /// Served from the store; the kernel did not run
    Hit,
    /// Computed and written to the store
    Stored,
    /// Non-deterministic operation; the store was not consulted
    Uncached,
    /// Caching is switched off for this run
    Disabled,
    /// Computed, but the store failed and the write was dropped
    Degraded,
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheStatus::Hit => write!(f, "hit"),
            CacheStatus::Stored => write!(f, "stored"),
            CacheStatus::Uncached => write!(f, "uncached"),
            CacheStatus::Disabled => write!(f, "disabled"),
            CacheStatus::Degraded => write!(f, "degraded"),
        }
    }
}

/// Cache counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeStats {
    pub hits: usize,
    pub misses: usize,
    pub writes: usize,
    /// Storage errors that were downgraded to a miss or a dropped write
    pub degraded: usize,
}

/// Applies transforms and detectors through the cache
pub struct CachedInvoker {
    cache: Option<Arc<dyn CacheStore>>,
    events: EventSender,
    hits: AtomicUsize,
    misses: AtomicUsize,
    writes: AtomicUsize,
    degraded: AtomicUsize,
}

impl CachedInvoker {
    /// `None` disables caching for every operation
    pub fn new(cache: Option<Arc<dyn CacheStore>>) -> Self {
        Self {
            cache,
            events: null_sender(),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            degraded: AtomicUsize::new(0),
        }
    }

    /// Report fail-open downgrades on this channel
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    pub fn stats(&self) -> InvokeStats {
        InvokeStats {
            hits: self.hits.load(Ordering::SeqCst),
            misses: self.misses.load(Ordering::SeqCst),
            writes: self.writes.load(Ordering::SeqCst),
            degraded: self.degraded.load(Ordering::SeqCst),
        }
    }

    /// Apply a resolved transform to its inputs
    pub fn apply(
        &self,
        catalog: &TransformCatalog,
        spec: &TransformSpec,
        inputs: &[&PixelBuffer],
    ) -> Result<(PixelBuffer, CacheStatus), KernelError> {
        // The registered transform decides cacheability, not the spec's flag.
        let transform = catalog.checked(spec)?;
        if !transform.is_deterministic() {
            return catalog.apply(spec, inputs).map(|out| (out, CacheStatus::Uncached));
        }
        let Some(cache) = self.cache.as_deref() else {
            return catalog.apply(spec, inputs).map(|out| (out, CacheStatus::Disabled));
        };

        let keyed = TransformSpec {
            name: transform.name().to_string(),
            params: spec.params.clone(),
            deterministic: true,
        };
        let digests: Vec<_> = inputs.iter().map(|buffer| content_digest(buffer)).collect();
        let fingerprint = Self::fingerprint(&keyed, &digests)?;

        self.cached(
            cache,
            &keyed.name,
            &fingerprint,
            record::decode_buffer,
            record::encode_buffer,
            || catalog.apply(spec, inputs),
        )
    }

    /// Run the detector, keyed on its name, parameters and the image digest
    pub fn detect(
        &self,
        detector: &dyn Detector,
        image: &PixelBuffer,
    ) -> Result<(Detection, CacheStatus), KernelError> {
        let Some(cache) = self.cache.as_deref() else {
            return detector.detect(image).map(|out| (out, CacheStatus::Disabled));
        };

        let spec = TransformSpec {
            name: detector.name().to_string(),
            params: detector.parameters(),
            deterministic: true,
        };
        let fingerprint = Self::fingerprint(&spec, &[content_digest(image)])?;

        self.cached(
            cache,
            &spec.name,
            &fingerprint,
            record::decode_detection,
            record::encode_detection,
            || detector.detect(image),
        )
    }

    fn fingerprint(
        spec: &TransformSpec,
        digests: &[crate::core::digest::ContentDigest],
    ) -> Result<Fingerprint, KernelError> {
        FingerprintBuilder::fingerprint(spec, digests).map_err(|e| KernelError::Failed {
            operation: spec.name.clone(),
            reason: e.to_string(),
        })
    }

    fn cached<T>(
        &self,
        cache: &dyn CacheStore,
        operation: &str,
        fingerprint: &Fingerprint,
        decode: fn(&[u8]) -> Option<T>,
        encode: fn(&T) -> Vec<u8>,
        compute: impl FnOnce() -> Result<T, KernelError>,
    ) -> Result<(T, CacheStatus), KernelError> {
        match cache.get(fingerprint) {
            Ok(Some(bytes)) => match decode(&bytes) {
                Some(value) => {
                    self.hits.fetch_add(1, Ordering::SeqCst);
                    debug!(operation, fingerprint = %fingerprint.short(), "cache hit");
                    return Ok((value, CacheStatus::Hit));
                }
                None => {
                    warn!(operation, fingerprint = %fingerprint.short(), "cached record does not decode, recomputing");
                    if let Err(e) = cache.remove(fingerprint) {
                        self.degrade(operation, &e);
                    }
                }
            },
            Ok(None) => {}
            Err(e) => self.degrade(operation, &e),
        }

        self.misses.fetch_add(1, Ordering::SeqCst);
        debug!(operation, fingerprint = %fingerprint.short(), "cache miss");
        let value = compute()?;

        let status = match cache.put(fingerprint, &encode(&value)) {
            Ok(()) => {
                self.writes.fetch_add(1, Ordering::SeqCst);
                CacheStatus::Stored
            }
            Err(e) => {
                self.degrade(operation, &e);
                CacheStatus::Degraded
            }
        };
        Ok((value, status))
    }

    fn degrade(&self, operation: &str, error: &StorageError) {
        self.degraded.fetch_add(1, Ordering::SeqCst);
        warn!(operation, error = %error, "cache unavailable, continuing without it");
        self.events.send(CacheEvent::Degraded {
            operation: operation.to_string(),
            reason: error.to_string(),
        });
    }
}
