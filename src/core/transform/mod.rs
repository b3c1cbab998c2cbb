//! # Transform Module
//!
//! The catalog of named image operations.
//!
//! ## Built-in Transforms
//! - `sobel` - gradient-magnitude edge map
//! - `canny` - Canny edge detector (`low`, `high`)
//! - `gaussian_blur` - Gaussian smoothing (`kernel_size`, `sigma`)
//! - `sharpen` - 3x3 sharpening kernel
//! - `random_hue_shift` - random hue rotation (non-deterministic, never cached)
//!
//! Requests are resolved against each transform's schema into a
//! [`TransformSpec`] with every parameter present in canonical order.
//! Caching is not a property of the kernels; the invoker decides based on
//! [`Transform::is_deterministic`].

pub mod kernels;
mod spec;
mod traits;

pub use spec::{ParamValue, Params, TransformRequest, TransformSpec};
pub use traits::{ParamSpec, Transform};

use crate::core::buffer::PixelBuffer;
use crate::error::{ConfigError, KernelError};
use kernels::{Canny, GaussianBlur, RandomHueShift, Sharpen, Sobel};
use std::collections::HashMap;
use std::sync::Arc;

/// Normalise a user-facing name: "Gaussian Blur" -> "gaussian_blur"
pub fn normalize_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Registry of transforms by name
#[derive(Clone)]
pub struct TransformCatalog {
    transforms: HashMap<String, Arc<dyn Transform>>,
}

impl TransformCatalog {
    /// An empty catalog
    pub fn new() -> Self {
        Self {
            transforms: HashMap::new(),
        }
    }

    /// A catalog holding the built-in filters
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register(Sobel);
        catalog.register(Canny);
        catalog.register(GaussianBlur);
        catalog.register(Sharpen);
        catalog.register(RandomHueShift);
        catalog
    }

    /// Add a transform, replacing any existing one with the same name
    pub fn register(&mut self, transform: impl Transform + 'static) {
        self.transforms
            .insert(normalize_name(transform.name()), Arc::new(transform));
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.transforms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn get(&self, name: &str) -> Option<&dyn Transform> {
        self.transforms.get(&normalize_name(name)).map(|t| t.as_ref())
    }

    /// Resolve a request into a complete, validated spec.
    ///
    /// Unknown names or parameters, mistyped values and values the
    /// transform rejects are all configuration errors. Nothing is clamped.
    pub fn resolve(&self, request: &TransformRequest) -> Result<TransformSpec, ConfigError> {
        let name = normalize_name(&request.name);
        let transform = self
            .transforms
            .get(&name)
            .ok_or_else(|| ConfigError::UnknownTransform {
                name: request.name.clone(),
            })?;

        let schema = transform.schema();
        for (parameter, _) in &request.overrides {
            if !schema.iter().any(|p| p.name == parameter) {
                return Err(ConfigError::UnknownParameter {
                    transform: name.clone(),
                    parameter: parameter.clone(),
                });
            }
        }

        let mut params = Params::new();
        for entry in &schema {
            // Last override wins when a parameter is repeated
            let value = match request.overrides.iter().rev().find(|(n, _)| n == entry.name) {
                Some((_, value)) => coerce(&name, entry, value)?,
                None => entry.default.clone(),
            };
            params = params.with(entry.name, value);
        }

        transform.validate(&params)?;

        Ok(TransformSpec {
            name,
            params,
            deterministic: transform.is_deterministic(),
        })
    }

    /// The registered transform behind a spec, with its parameters re-checked.
    ///
    /// Specs are plain data, so one built by hand is held to the same rules
    /// as one from [`resolve`](Self::resolve).
    pub fn checked(&self, spec: &TransformSpec) -> Result<&dyn Transform, KernelError> {
        let transform = self.get(&spec.name).ok_or_else(|| KernelError::NotRegistered {
            operation: spec.name.clone(),
        })?;
        transform.validate(&spec.params)?;
        Ok(transform)
    }

    /// Run the kernel for a resolved spec
    pub fn apply(
        &self,
        spec: &TransformSpec,
        inputs: &[&PixelBuffer],
    ) -> Result<PixelBuffer, KernelError> {
        let transform = self.checked(spec)?;

        if inputs.len() != transform.arity() {
            return Err(KernelError::Arity {
                operation: spec.name.clone(),
                expected: transform.arity(),
                actual: inputs.len(),
            });
        }

        transform.apply(inputs, &spec.params)
    }
}

impl Default for TransformCatalog {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Check an override against the schema's type, widening ints to floats
fn coerce(transform: &str, entry: &ParamSpec, value: &ParamValue) -> Result<ParamValue, ConfigError> {
    let coerced = match (&entry.default, value) {
        (ParamValue::Int(_), ParamValue::Int(v)) => Some(ParamValue::Int(*v)),
        (ParamValue::Float(_), v) => v.as_float().map(ParamValue::Float),
        (ParamValue::Bool(_), ParamValue::Bool(v)) => Some(ParamValue::Bool(*v)),
        (ParamValue::Text(_), v) => Some(ParamValue::Text(v.to_string())),
        _ => None,
    };

    coerced.ok_or_else(|| ConfigError::WrongParameterType {
        transform: transform.to_string(),
        parameter: entry.name.to_string(),
        expected: entry.default.kind_name(),
        actual: value.to_string(),
    })
}
