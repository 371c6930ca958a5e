//! [`CipherData`]: everything needed to decrypt one object's content stream.

use std::collections::BTreeMap;

use zeroize::Zeroize;

/// CEK algorithm identifier for AES-GCM without padding.
pub const AES_GCM_NO_PADDING: &str = "AES/GCM/NoPadding";

/// Authentication tag length, in bits, used with [`AES_GCM_NO_PADDING`].
pub const GCM_TAG_LENGTH_BITS: &str = "128";

/// Wrap algorithm of the legacy KMS key generator.
pub const KMS_WRAP: &str = "kms";

/// Wrap algorithm of the KMS key generator that binds the CEK algorithm into
/// the encryption context.
pub const KMS_CONTEXT_WRAP: &str = "kms+context";

/// Encryption-context key carrying the CEK algorithm for [`KMS_CONTEXT_WRAP`].
pub const CEK_ALG_CONTEXT_KEY: &str = "aws:x-amz-cek-alg";

/// Material description: string pairs describing how the CEK was wrapped.
///
/// A `BTreeMap` keeps the serialised form stable.
pub type MaterialDescription = BTreeMap<String, String>;

/// Raw content encryption key bytes.
///
/// The buffer is overwritten with zeroes on drop and is never printed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ContentKey(Vec<u8>);

impl ContentKey {
    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Key length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no key material is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for ContentKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for ContentKey {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl Zeroize for ContentKey {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl Drop for ContentKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ContentKey([REDACTED])")
    }
}

/// Key, IV, and algorithm metadata for one content-encryption operation.
///
/// Produced by a key generator, finalised by a content cipher builder, and
/// persisted (with the key wrapped) as an [`Envelope`](crate::Envelope).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CipherData {
    /// Raw content encryption key.
    pub key: ContentKey,
    /// Nonce for the content cipher. Must never repeat under the same key.
    pub iv: Vec<u8>,
    /// How `encrypted_key` was produced (e.g. [`KMS_CONTEXT_WRAP`]).
    pub wrap_algorithm: String,
    /// Content cipher identifier (e.g. [`AES_GCM_NO_PADDING`]).
    pub cek_algorithm: String,
    /// Authentication tag length in bits, as a decimal string.
    pub tag_length: String,
    /// Generator-specific wrapping metadata.
    pub material_description: MaterialDescription,
    /// The CEK as wrapped by the key-management service.
    pub encrypted_key: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroize_wipes_key_material() {
        let mut key = ContentKey::from(vec![0x42; 32]);
        key.zeroize();
        assert!(key.is_empty());
        assert_eq!(key, ContentKey::default());
    }

    #[test]
    fn content_key_redacted_in_debug() {
        let cd = CipherData {
            key: ContentKey::from(vec![0xAB; 32]),
            ..Default::default()
        };
        let printed = format!("{cd:?}");
        assert!(printed.contains("REDACTED"));
        assert!(!printed.contains("171"));
    }

    #[test]
    fn content_key_accessors() {
        let key = ContentKey::from(&[1u8, 2, 3][..]);
        assert_eq!(key.len(), 3);
        assert!(!key.is_empty());
        assert_eq!(key.as_bytes(), &[1, 2, 3]);
        assert!(ContentKey::default().is_empty());
    }
}
