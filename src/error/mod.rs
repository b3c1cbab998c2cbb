//! # Error Module
//!
//! Error types for the batch image pipeline.
//!
//! ## Taxonomy
//! - [`ConfigError`] - caller misuse, rejected before any work starts
//! - [`LoadError`] - a source image could not be read (per-task)
//! - [`KernelError`] - a transform or detector failed (per-task)
//! - [`StorageError`] - the cache store is unusable
//!
//! Only configuration errors and a store that is unusable at start-up fail
//! a whole batch. Everything else is captured per image as a [`TaskFailure`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Batch-fatal and CLI errors.
///
/// Load and kernel errors never appear here; they stay inside the
/// [`TaskFailure`] of the image they belong to.
#[derive(Error, Debug)]
pub enum PhotolabError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cache storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to write output {path}: {reason}")]
    Output { path: PathBuf, reason: String },
}

/// Invalid transform requests and pipeline settings
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Unknown transform: {name}")]
    UnknownTransform { name: String },

    #[error("Transform {transform} has no parameter named {parameter}")]
    UnknownParameter { transform: String, parameter: String },

    #[error("Parameter {parameter} of {transform} expects {expected}, got {actual}")]
    WrongParameterType {
        transform: String,
        parameter: String,
        expected: &'static str,
        actual: String,
    },

    #[error("Invalid value for {parameter} of {transform}: {reason}")]
    InvalidParameter {
        transform: String,
        parameter: String,
        reason: String,
    },

    #[error("Malformed transform request {input:?}: {reason}")]
    MalformedRequest { input: String, reason: String },

    #[error("Invalid worker count: {value} (must be at least 1)")]
    InvalidWorkerCount { value: usize },

    #[error("Failed to start worker pool: {0}")]
    WorkerPool(String),

    #[error("{operation} is non-deterministic and cannot be fingerprinted")]
    NotCacheable { operation: String },
}

/// Errors that occur while loading a source image
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to open image file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode image {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Image is empty: {source_label}")]
    EmptyImage { source_label: String },

    #[error("Pixel data does not match {width}x{height}x{channels}: got {actual} bytes")]
    LayoutMismatch {
        width: u32,
        height: u32,
        channels: u8,
        actual: usize,
    },

    #[error("Unsupported channel count: {channels}")]
    UnsupportedChannels { channels: u8 },
}

/// Errors raised by a transform kernel or the detector
#[derive(Error, Debug)]
pub enum KernelError {
    #[error("{operation} failed: {reason}")]
    Failed { operation: String, reason: String },

    #[error("{operation} expects {expected} input(s), got {actual}")]
    Arity {
        operation: String,
        expected: usize,
        actual: usize,
    },

    #[error("{operation} is not registered in the catalog")]
    NotRegistered { operation: String },

    #[error("{operation} panicked: {message}")]
    Panicked { operation: String, message: String },

    /// A spec that never went through catalog resolution and does not validate
    #[error("Rejected spec: {0}")]
    Misconfigured(#[from] ConfigError),
}

/// Errors that occur with the cache store
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to open cache database at {path}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    #[error("Cache query failed: {0}")]
    QueryFailed(String),

    #[error("Cache lock poisoned for {path}. Delete this file and try again.")]
    Poisoned { path: PathBuf },
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::QueryFailed(e.to_string())
    }
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, PhotolabError>;

/// Classification of a per-task failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    Configuration,
    Io,
    Kernel,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Configuration => write!(f, "ConfigurationError"),
            FailureKind::Io => write!(f, "IOError"),
            FailureKind::Kernel => write!(f, "KernelError"),
            FailureKind::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// A per-image failure, returned as data rather than raised
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// The step that failed: `load`, a transform name, or the detector name
    pub step: String,
    pub kind: FailureKind,
    pub message: String,
}

impl TaskFailure {
    pub fn load(error: &LoadError) -> Self {
        Self {
            step: "load".to_string(),
            kind: FailureKind::Io,
            message: error.to_string(),
        }
    }

    pub fn kernel(step: &str, error: &KernelError) -> Self {
        let kind = match error {
            KernelError::Misconfigured(_) => FailureKind::Configuration,
            _ => FailureKind::Kernel,
        };
        Self {
            step: step.to_string(),
            kind,
            message: error.to_string(),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            step: "queue".to_string(),
            kind: FailureKind::Cancelled,
            message: "batch was cancelled before this image started".to_string(),
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at step '{}': {}", self.kind, self.step, self.message)
    }
}
