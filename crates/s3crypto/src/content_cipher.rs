//! [`AesGcmContentCipher`]: cipher data bound to a ready AES-256-GCM engine.

use std::io::Read;

use s3crypto_common::cipher_data::{AES_GCM_NO_PADDING, GCM_TAG_LENGTH_BITS};
use s3crypto_common::CipherData;
use tracing::warn;

use crate::crypto::{AesGcm, CipherError, DecryptReader, EncryptReader};
use crate::error::Error;

/// A content cipher for exactly one encrypt or decrypt operation.
///
/// The GCM engine is derived from the key and IV when the cipher is
/// constructed. [`encrypt_contents`](Self::encrypt_contents) and
/// [`decrypt_contents`](Self::decrypt_contents) consume the cipher, so a
/// key/IV pair cannot be used for a second stream by accident.
#[derive(Debug)]
pub struct AesGcmContentCipher {
    cipher_data: CipherData,
    engine: AesGcm,
}

impl AesGcmContentCipher {
    /// Fix the scheme metadata on `cd` and build the GCM engine.
    ///
    /// The CEK algorithm and tag length are always set to
    /// [`AES_GCM_NO_PADDING`] and [`GCM_TAG_LENGTH_BITS`], whatever the
    /// generator proposed.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidKeyLength`] or
    /// [`CipherError::InvalidNonceLength`] if the key is not 32 bytes or the
    /// IV is not 12 bytes.
    pub fn new(mut cd: CipherData) -> Result<Self, CipherError> {
        if !cd.cek_algorithm.is_empty() && cd.cek_algorithm != AES_GCM_NO_PADDING {
            warn!(
                proposed = %cd.cek_algorithm,
                enforced = AES_GCM_NO_PADDING,
                "key generator proposed a different CEK algorithm; overriding"
            );
        }
        cd.cek_algorithm = AES_GCM_NO_PADDING.to_owned();
        cd.tag_length = GCM_TAG_LENGTH_BITS.to_owned();

        let engine = AesGcm::new(cd.key.as_bytes(), &cd.iv)?;
        Ok(Self {
            cipher_data: cd,
            engine,
        })
    }

    /// Rebuild the cipher for a stored object from its persisted cipher data.
    ///
    /// Unlike [`new`](Self::new), the stored scheme is checked rather than
    /// overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedScheme`] if the stored metadata names a
    /// different algorithm or tag length, or [`Error::Cipher`] on a key or IV
    /// length mismatch.
    pub fn from_stored(cd: CipherData) -> Result<Self, Error> {
        if cd.cek_algorithm != AES_GCM_NO_PADDING || cd.tag_length != GCM_TAG_LENGTH_BITS {
            return Err(Error::UnsupportedScheme {
                cek_algorithm: cd.cek_algorithm,
                tag_length: cd.tag_length,
            });
        }
        Ok(Self::new(cd)?)
    }

    /// The cipher data to persist alongside the ciphertext.
    pub fn cipher_data(&self) -> &CipherData {
        &self.cipher_data
    }

    /// Wrap `src` in an encrypting reader that yields `ciphertext || tag`.
    pub fn encrypt_contents<R: Read>(self, src: R) -> EncryptReader<R> {
        EncryptReader::new(src, self.engine)
    }

    /// Wrap `src` (ending in the tag) in a decrypting reader.
    ///
    /// The returned reader owns `src`. Tag failures surface from `read` once
    /// the end of `src` is reached.
    pub fn decrypt_contents<R: Read>(self, src: R) -> DecryptReader<R> {
        DecryptReader::new(src, self.engine)
    }
}
