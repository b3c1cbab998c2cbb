//! Operation identity: names, parameter values and parsed requests.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Decimal places used when a float parameter is canonicalised
const FLOAT_PRECISION: usize = 6;

/// A primitive parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl ParamValue {
    /// Name of the value's type, for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            ParamValue::Int(_) => "an integer",
            ParamValue::Float(_) => "a number",
            ParamValue::Bool(_) => "a boolean",
            ParamValue::Text(_) => "text",
        }
    }

    /// Stable textual form used in fingerprints.
    ///
    /// Floats are printed at fixed precision so that values which only
    /// differ by representation noise hash identically.
    pub fn canonical(&self) -> String {
        match self {
            ParamValue::Int(v) => format!("i:{}", v),
            ParamValue::Float(v) => {
                let text = format!("{:.*}", FLOAT_PRECISION, v);
                // -0.000000 and 0.000000 are the same setting
                let text = if text.trim_start_matches('-').trim_matches(['0', '.']).is_empty() {
                    format!("{:.*}", FLOAT_PRECISION, 0.0)
                } else {
                    text
                };
                format!("f:{}", text)
            }
            ParamValue::Bool(v) => format!("b:{}", v),
            ParamValue::Text(v) => format!("s:{}", v),
        }
    }

    /// Interpret a literal from a request string
    pub fn parse_literal(text: &str) -> Self {
        let text = text.trim();
        if let Ok(v) = text.parse::<bool>() {
            ParamValue::Bool(v)
        } else if let Ok(v) = text.parse::<i64>() {
            ParamValue::Int(v)
        } else if let Ok(v) = text.parse::<f64>() {
            ParamValue::Float(v)
        } else {
            ParamValue::Text(text.to_string())
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Floats, with integers widened
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// Ordered list of named parameter values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Params(Vec<(String, ParamValue)>);

impl Params {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a parameter, builder style
    pub fn with(mut self, name: &str, value: ParamValue) -> Self {
        self.0.push((name.to_string(), value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ParamValue::as_int)
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ParamValue::as_float)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A fully resolved operation: identity for caching is (name, params)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformSpec {
    pub name: String,
    pub params: Params,
    pub deterministic: bool,
}

impl fmt::Display for TransformSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.params.is_empty() {
            let rendered: Vec<String> = self
                .params
                .iter()
                .map(|(n, v)| format!("{}={}", n, v))
                .collect();
            write!(f, "({})", rendered.join(", "))?;
        }
        Ok(())
    }
}

/// A transform as asked for by a caller, before catalog resolution.
///
/// Parsed from `name[:key=value[,key=value...]]`, e.g.
/// `gaussian_blur:kernel_size=7,sigma=1.5`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformRequest {
    pub name: String,
    pub overrides: Vec<(String, ParamValue)>,
}

impl TransformRequest {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            overrides: Vec::new(),
        }
    }

    pub fn with(mut self, parameter: &str, value: ParamValue) -> Self {
        self.overrides.push((parameter.to_string(), value));
        self
    }
}

impl FromStr for TransformRequest {
    type Err = ConfigError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| ConfigError::MalformedRequest {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let (name, rest) = match input.split_once(':') {
            Some((name, rest)) => (name.trim(), Some(rest)),
            None => (input.trim(), None),
        };
        if name.is_empty() {
            return Err(malformed("missing transform name"));
        }

        let mut overrides = Vec::new();
        for pair in rest.into_iter().flat_map(|r| r.split(',')) {
            if pair.trim().is_empty() {
                continue;
            }
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| malformed("expected key=value"))?;
            if key.trim().is_empty() {
                return Err(malformed("empty parameter name"));
            }
            overrides.push((key.trim().to_string(), ParamValue::parse_literal(value)));
        }

        Ok(Self {
            name: name.to_string(),
            overrides,
        })
    }
}
