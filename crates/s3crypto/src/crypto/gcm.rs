//! Incremental AES-256-GCM.
//!
//! GCM is assembled from its parts so that a stream can be processed one
//! chunk at a time: `Ctr32BE<Aes256>` produces the keystream starting at
//! `J0 + 1`, and GHASH absorbs the ciphertext as it goes by. Output is
//! byte-identical to one-shot AES-256-GCM with empty associated data.
//!
//! Partial ciphertext blocks are buffered until 16 bytes are available, so
//! chunk boundaries never influence the tag.

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit, KeyIvInit, StreamCipher};
use aes::Aes256;
use ctr::Ctr32BE;
use ghash::{universal_hash::UniversalHash, GHash};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of a GCM nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Byte length of the GCM authentication tag (16 bytes = 128 bits).
pub const TAG_LEN: usize = 16;

const BLOCK_LEN: usize = 16;

/// Errors produced by the cipher layer.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The CEK is the wrong length.
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Required length.
        expected: usize,
        /// Supplied length.
        actual: usize,
    },

    /// The nonce is the wrong length.
    #[error("invalid nonce length: expected {expected} bytes, got {actual}")]
    InvalidNonceLength {
        /// Required length.
        expected: usize,
        /// Supplied length.
        actual: usize,
    },

    /// The tag did not verify (wrong key/nonce, tampered or truncated data).
    #[error("message authentication failed")]
    AuthenticationFailed,

    /// The stream exceeded the GCM limit of 2^32 - 2 keystream blocks.
    #[error("GCM stream length limit exceeded")]
    LimitExceeded,
}

/// One in-flight AES-256-GCM operation.
///
/// Constructed once per stream; [`finalize`](Self::finalize) and
/// [`verify`](Self::verify) consume it.
pub struct AesGcm {
    ctr: Ctr32BE<Aes256>,
    ghash: GHash,
    tag_mask: aes::Block,
    pending: [u8; BLOCK_LEN],
    pending_len: usize,
    ciphertext_len: u64,
}

impl AesGcm {
    /// Derive the hash key, tag mask, and keystream from `key` and `nonce`.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidKeyLength`] or
    /// [`CipherError::InvalidNonceLength`] if either input has the wrong size.
    pub fn new(key: &[u8], nonce: &[u8]) -> Result<Self, CipherError> {
        if key.len() != KEY_LEN {
            return Err(CipherError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: key.len(),
            });
        }
        if nonce.len() != NONCE_LEN {
            return Err(CipherError::InvalidNonceLength {
                expected: NONCE_LEN,
                actual: nonce.len(),
            });
        }

        let aes = Aes256::new(GenericArray::from_slice(key));

        let mut hash_key = aes::Block::default();
        aes.encrypt_block(&mut hash_key);

        // J0 = nonce || 0x00000001; the tag is masked with E(K, J0) and the
        // keystream starts one counter later.
        let mut j0 = [0u8; BLOCK_LEN];
        j0[..NONCE_LEN].copy_from_slice(nonce);
        j0[BLOCK_LEN - 1] = 1;
        let mut tag_mask = GenericArray::clone_from_slice(&j0);
        aes.encrypt_block(&mut tag_mask);

        let mut counter = j0;
        counter[BLOCK_LEN - 1] = 2;
        let ctr = Ctr32BE::<Aes256>::new(
            GenericArray::from_slice(key),
            GenericArray::from_slice(&counter),
        );

        Ok(Self {
            ctr,
            ghash: GHash::new(&hash_key),
            tag_mask,
            pending: [0u8; BLOCK_LEN],
            pending_len: 0,
            ciphertext_len: 0,
        })
    }

    /// Encrypt `buf` in place and authenticate the resulting ciphertext.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::LimitExceeded`] once the keystream is exhausted.
    pub fn encrypt_in_place(&mut self, buf: &mut [u8]) -> Result<(), CipherError> {
        self.ctr
            .try_apply_keystream(buf)
            .map_err(|_| CipherError::LimitExceeded)?;
        self.absorb(buf);
        Ok(())
    }

    /// Authenticate ciphertext `buf`, then decrypt it in place.
    ///
    /// The plaintext is unauthenticated until [`verify`](Self::verify) succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::LimitExceeded`] once the keystream is exhausted.
    pub fn decrypt_in_place(&mut self, buf: &mut [u8]) -> Result<(), CipherError> {
        self.absorb(buf);
        self.ctr
            .try_apply_keystream(buf)
            .map_err(|_| CipherError::LimitExceeded)
    }

    /// Compute the tag over everything processed so far.
    pub fn finalize(mut self) -> [u8; TAG_LEN] {
        if self.pending_len > 0 {
            self.ghash.update_padded(&self.pending[..self.pending_len]);
        }

        // Length block: 64-bit AAD bit length (always zero) || 64-bit
        // ciphertext bit length.
        let mut lengths = ghash::Block::default();
        lengths[8..].copy_from_slice(&(self.ciphertext_len * 8).to_be_bytes());
        self.ghash.update(&[lengths]);

        let hash = self.ghash.finalize();
        let mut tag = [0u8; TAG_LEN];
        for ((t, h), m) in tag.iter_mut().zip(hash.iter()).zip(self.tag_mask.iter()) {
            *t = h ^ m;
        }
        tag
    }

    /// Compare the computed tag against `expected` in constant time.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::AuthenticationFailed`] on mismatch.
    pub fn verify(self, expected: &[u8]) -> Result<(), CipherError> {
        let tag = self.finalize();
        if bool::from(tag[..].ct_eq(expected)) {
            Ok(())
        } else {
            Err(CipherError::AuthenticationFailed)
        }
    }

    fn absorb(&mut self, mut data: &[u8]) {
        self.ciphertext_len += data.len() as u64;

        if self.pending_len > 0 {
            let take = (BLOCK_LEN - self.pending_len).min(data.len());
            self.pending[self.pending_len..self.pending_len + take].copy_from_slice(&data[..take]);
            self.pending_len += take;
            data = &data[take..];
            if self.pending_len < BLOCK_LEN {
                return;
            }
            self.ghash
                .update(&[GenericArray::clone_from_slice(&self.pending)]);
            self.pending_len = 0;
        }

        let mut blocks = data.chunks_exact(BLOCK_LEN);
        for block in &mut blocks {
            self.ghash.update(&[GenericArray::clone_from_slice(block)]);
        }
        let rest = blocks.remainder();
        self.pending[..rest.len()].copy_from_slice(rest);
        self.pending_len = rest.len();
    }
}

impl std::fmt::Debug for AesGcm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcm")
            .field("ciphertext_len", &self.ciphertext_len)
            .finish_non_exhaustive()
    }
}
