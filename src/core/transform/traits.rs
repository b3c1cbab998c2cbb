//! Transform trait definition.

use super::{ParamValue, Params};
use crate::core::buffer::PixelBuffer;
use crate::error::{ConfigError, KernelError};

/// One entry of a transform's parameter schema
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    /// Used when the caller does not override it; also fixes the type
    pub default: ParamValue,
}

impl ParamSpec {
    pub fn new(name: &'static str, default: ParamValue) -> Self {
        Self { name, default }
    }
}

/// Trait for named image operations held in the catalog
pub trait Transform: Send + Sync {
    /// Catalog name, used as the operation identity in fingerprints
    fn name(&self) -> &str;

    /// Whether bit-identical inputs and parameters always give bit-identical
    /// output. Only deterministic transforms are cached.
    fn is_deterministic(&self) -> bool {
        true
    }

    /// Parameters in canonical order, with defaults
    fn schema(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    /// Number of input buffers the transform consumes
    fn arity(&self) -> usize {
        1
    }

    /// Check fully resolved parameters before any work is scheduled
    fn validate(&self, _params: &Params) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Produce a new buffer; inputs are never modified
    fn apply(&self, inputs: &[&PixelBuffer], params: &Params) -> Result<PixelBuffer, KernelError>;
}
