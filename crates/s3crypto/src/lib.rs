//! Client-side content encryption for object storage.
//!
//! Objects are encrypted with AES-256-GCM under a fresh content key (CEK) per
//! object. A key generator produces the CEK, the IV and the wrapped form of the
//! key; the content cipher streams plaintext to `ciphertext || tag` and back.
//!
//! ```text
//! CipherDataGenerator ──▶ AesGcmContentCipherBuilder ──▶ AesGcmContentCipher
//!   (KMS, custom)          (deprecation check,             encrypt_contents(Read)
//!                           capability dispatch)           decrypt_contents(Read)
//! ```
//!
//! The scheme is fixed: 32-byte key, 12-byte IV, `AES/GCM/NoPadding`, 128-bit
//! tag. Streams are pull-based [`std::io::Read`] adapters that process each
//! chunk as it is read; only key generation is asynchronous.
//!
//! # Security invariants
//!
//! - Decrypted bytes are released before the tag is checked. Callers must
//!   treat output as untrusted until the reader returns end-of-stream; a tag
//!   mismatch surfaces as an [`std::io::ErrorKind::InvalidData`] error that
//!   [`crypto::is_authentication_failure`] recognises.
//! - A content cipher is consumed by its first stream, so one key/IV pair is
//!   never used twice through the same cipher.
//! - Plaintext keys are zeroed on drop and redacted from `Debug` output.

pub mod builder;
pub mod config;
pub mod content_cipher;
pub mod crypto;
pub mod error;
pub mod generator;
pub mod kms;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use builder::AesGcmContentCipherBuilder;
pub use config::KmsConfig;
pub use content_cipher::AesGcmContentCipher;
pub use error::Error;
pub use generator::{
    generate_cipher_data, CallShape, Capabilities, CipherDataGenerator,
    CipherDataGeneratorWithCekAlg, CipherDataGeneratorWithCekAlgWithContext,
    CipherDataGeneratorWithContext, DeprecatedFeatures, DeprecatedUsage, GeneratorError,
};
pub use kms::KmsKeyGenerator;
pub use s3crypto_common::{CipherData, ContentKey, Envelope, MaterialDescription};
