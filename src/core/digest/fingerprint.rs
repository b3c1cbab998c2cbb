//! Cache keys for deterministic operations.

use super::ContentDigest;
use crate::core::transform::TransformSpec;
use crate::error::ConfigError;
use std::fmt;

/// Domain separator so fingerprints never collide with other BLAKE3 uses
const FINGERPRINT_DOMAIN: &[u8] = b"photolab.fingerprint.v1";

/// Cache key for one invocation of a deterministic operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Restore a fingerprint read back from storage
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        <[u8; 32]>::try_from(bytes).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        super::to_hex(&self.0)
    }

    /// First few hex characters, for log lines
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Derives fingerprints from an operation spec and its input digests
pub struct FingerprintBuilder;

impl FingerprintBuilder {
    /// Build the cache key for `spec` applied to inputs with `input_digests`.
    ///
    /// Every variable-length field is length-prefixed, so no two distinct
    /// (name, parameters, inputs) triples serialize to the same byte string.
    /// Parameters are hashed in the order the spec carries them; the catalog
    /// resolves requests into schema order, so equal settings always produce
    /// equal specs.
    ///
    /// Returns [`ConfigError::NotCacheable`] for non-deterministic specs:
    /// callers must skip the cache entirely for those.
    pub fn fingerprint(
        spec: &TransformSpec,
        input_digests: &[ContentDigest],
    ) -> Result<Fingerprint, ConfigError> {
        if !spec.deterministic {
            return Err(ConfigError::NotCacheable {
                operation: spec.name.clone(),
            });
        }

        let mut hasher = blake3::Hasher::new();
        hasher.update(FINGERPRINT_DOMAIN);
        write_field(&mut hasher, spec.name.as_bytes());

        hasher.update(&(spec.params.len() as u64).to_le_bytes());
        for (name, value) in spec.params.iter() {
            write_field(&mut hasher, name.as_bytes());
            write_field(&mut hasher, value.canonical().as_bytes());
        }

        hasher.update(&(input_digests.len() as u64).to_le_bytes());
        for digest in input_digests {
            hasher.update(digest.as_bytes());
        }

        Ok(Fingerprint(*hasher.finalize().as_bytes()))
    }
}

fn write_field(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::buffer::PixelBuffer;
    use crate::core::digest::content_digest;
    use crate::core::transform::{ParamValue, Params};

    fn spec(name: &str, params: Params) -> TransformSpec {
        TransformSpec {
            name: name.to_string(),
            params,
            deterministic: true,
        }
    }

    fn digest_of(value: u8) -> ContentDigest {
        content_digest(&PixelBuffer::new(1, 1, 1, vec![value]).unwrap())
    }

    #[test]
    fn same_inputs_same_fingerprint() {
        let params = Params::new().with("kernel_size", ParamValue::Int(5));
        let a = FingerprintBuilder::fingerprint(&spec("gaussian_blur", params.clone()), &[digest_of(1)]);
        let b = FingerprintBuilder::fingerprint(&spec("gaussian_blur", params), &[digest_of(1)]);
        assert_eq!(a.unwrap(), b.unwrap());
    }

    #[test]
    fn different_names_separate() {
        let d = digest_of(1);
        let a = FingerprintBuilder::fingerprint(&spec("sobel", Params::new()), &[d]).unwrap();
        let b = FingerprintBuilder::fingerprint(&spec("sharpen", Params::new()), &[d]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn different_parameters_separate() {
        let d = digest_of(1);
        let five = Params::new().with("kernel_size", ParamValue::Int(5));
        let seven = Params::new().with("kernel_size", ParamValue::Int(7));
        let a = FingerprintBuilder::fingerprint(&spec("gaussian_blur", five), &[d]).unwrap();
        let b = FingerprintBuilder::fingerprint(&spec("gaussian_blur", seven), &[d]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn different_digests_separate() {
        let s = spec("sharpen", Params::new());
        let a = FingerprintBuilder::fingerprint(&s, &[digest_of(1)]).unwrap();
        let b = FingerprintBuilder::fingerprint(&s, &[digest_of(2)]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn name_and_parameter_boundaries_do_not_alias() {
        // "ab" + param "c" must not hash like "a" + param "bc"
        let d = digest_of(1);
        let a = spec("ab", Params::new().with("c", ParamValue::Bool(true)));
        let b = spec("a", Params::new().with("bc", ParamValue::Bool(true)));
        assert_ne!(
            FingerprintBuilder::fingerprint(&a, &[d]).unwrap(),
            FingerprintBuilder::fingerprint(&b, &[d]).unwrap()
        );
    }

    #[test]
    fn float_formatting_is_canonical() {
        let d = digest_of(1);
        let a = spec("canny", Params::new().with("low", ParamValue::Float(100.0)));
        let b = spec("canny", Params::new().with("low", ParamValue::Float(100.000_000_01)));
        assert_eq!(
            FingerprintBuilder::fingerprint(&a, &[d]).unwrap(),
            FingerprintBuilder::fingerprint(&b, &[d]).unwrap()
        );
    }

    #[test]
    fn non_deterministic_spec_is_rejected() {
        let s = TransformSpec {
            name: "random_hue_shift".to_string(),
            params: Params::new(),
            deterministic: false,
        };
        let result = FingerprintBuilder::fingerprint(&s, &[digest_of(1)]);
        assert!(matches!(result, Err(ConfigError::NotCacheable { .. })));
    }

    #[test]
    fn from_bytes_restores_fingerprint() {
        let fp = FingerprintBuilder::fingerprint(&spec("sobel", Params::new()), &[digest_of(3)]).unwrap();
        assert_eq!(Fingerprint::from_bytes(fp.as_bytes()), Some(fp));
        assert_eq!(Fingerprint::from_bytes(&[1, 2, 3]), None);
    }
}
