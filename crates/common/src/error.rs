//! Errors produced while encoding or decoding envelope metadata.

use thiserror::Error;

/// An envelope field could not be decoded.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A binary field is not valid base64.
    #[error("invalid base64 in {field}")]
    InvalidBase64 {
        /// Wire name of the offending field.
        field: &'static str,
        /// Underlying decode error.
        #[source]
        source: base64::DecodeError,
    },

    /// The material description is not a JSON object of strings.
    #[error("invalid material description: {0}")]
    InvalidMaterialDescription(#[from] serde_json::Error),

    /// The unencrypted content length is not a decimal integer.
    #[error("invalid unencrypted content length: {0}")]
    InvalidContentLength(String),
}
