//! Top-level error type returned by the builder and the decryption path.

use s3crypto_common::ProtocolError;
use thiserror::Error;

use crate::crypto::CipherError;
use crate::generator::{DeprecatedUsage, GeneratorError};

/// Errors from building a content cipher.
#[derive(Debug, Error)]
pub enum Error {
    /// The key generator reported a deprecated configuration; nothing was
    /// generated.
    #[error("deprecated configuration in use: {0}")]
    Deprecated(DeprecatedUsage),

    /// The key generator failed. The generator's error is kept as is.
    #[error(transparent)]
    Generator(#[from] GeneratorError),

    /// The cipher data cannot drive the content cipher.
    #[error(transparent)]
    Cipher(#[from] CipherError),

    /// Stored envelope metadata could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Stored cipher data names a scheme this content cipher does not implement.
    #[error("unsupported content encryption scheme: {cek_algorithm} with {tag_length}-bit tag")]
    UnsupportedScheme {
        /// CEK algorithm found in the stored metadata.
        cek_algorithm: String,
        /// Tag length found in the stored metadata.
        tag_length: String,
    },

    /// Stored envelope was wrapped with an algorithm this key generator cannot
    /// unwrap.
    #[error("unsupported key wrap algorithm: {0}")]
    UnsupportedWrapAlgorithm(String),

    /// The material description disagrees with the envelope's CEK algorithm.
    #[error(
        "CEK algorithm mismatch: envelope has {envelope:?}, material description has {material_description:?}"
    )]
    CekAlgorithmMismatch {
        /// CEK algorithm recorded in the envelope.
        envelope: String,
        /// CEK algorithm bound into the material description, if any.
        material_description: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deprecated_is_distinct_diagnostic() {
        let e = Error::Deprecated(DeprecatedUsage("kms wrap".into()));
        assert!(e.to_string().starts_with("deprecated configuration in use"));
    }

    #[test]
    fn generator_errors_display_verbatim() {
        let e = Error::from(GeneratorError::Cancelled);
        assert_eq!(e.to_string(), GeneratorError::Cancelled.to_string());
    }
}
