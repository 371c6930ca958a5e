//! AES-256-GCM streaming primitives.
//!
//! This module is free of AWS and key-management dependencies. It provides
//! the incremental GCM engine and the [`Read`](std::io::Read) adapters that
//! the content cipher hands out.
//!
//! # Ciphertext format
//!
//! ```text
//! AES-256-GCM(key, iv, plaintext) || tag (16 bytes)
//! ```
//!
//! There is no framing: the stream is exactly what a one-shot AES-GCM
//! encryption of the whole object would produce.

pub mod gcm;
pub mod reader;

pub use gcm::{AesGcm, CipherError, KEY_LEN, NONCE_LEN, TAG_LEN};
pub use reader::{is_authentication_failure, DecryptReader, EncryptReader};
