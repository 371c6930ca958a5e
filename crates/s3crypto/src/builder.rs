//! [`AesGcmContentCipherBuilder`]: turns a key generator into content ciphers.

use s3crypto_common::cipher_data::AES_GCM_NO_PADDING;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::content_cipher::AesGcmContentCipher;
use crate::crypto::{KEY_LEN, NONCE_LEN};
use crate::error::Error;
use crate::generator::{generate_cipher_data, CipherDataGenerator, DeprecatedUsage};

/// Builds AES-256-GCM content ciphers from cipher data produced by `G`.
///
/// Key length (32 bytes), nonce length (12 bytes) and CEK algorithm
/// (`AES/GCM/NoPadding`) are fixed; a different scheme is a different builder.
#[derive(Debug, Clone)]
pub struct AesGcmContentCipherBuilder<G> {
    generator: G,
}

impl<G: CipherDataGenerator> AesGcmContentCipherBuilder<G> {
    /// Create a builder around `generator`.
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    /// The underlying key generator.
    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Ask the generator whether it is configured in a deprecated way.
    ///
    /// # Errors
    ///
    /// Returns the generator's diagnostic; a generator without the deprecation
    /// capability never fails.
    pub fn check_deprecated_features(&self) -> Result<(), DeprecatedUsage> {
        self.generator.capabilities().check_deprecated_features()
    }

    /// Build a content cipher with a context that is never cancelled.
    ///
    /// # Errors
    ///
    /// See [`content_cipher_with_context`](Self::content_cipher_with_context).
    pub async fn content_cipher(&self) -> Result<AesGcmContentCipher, Error> {
        self.content_cipher_with_context(&CancellationToken::new())
            .await
    }

    /// Build a content cipher; `ctx` is forwarded to context-aware generators.
    ///
    /// # Errors
    ///
    /// - [`Error::Deprecated`] if the generator reports deprecated usage. The
    ///   check happens before any key material is generated.
    /// - [`Error::Generator`] with the generator's own error.
    /// - [`Error::Cipher`] if the generated key or IV has the wrong length.
    pub async fn content_cipher_with_context(
        &self,
        ctx: &CancellationToken,
    ) -> Result<AesGcmContentCipher, Error> {
        if let Err(e) = self.check_deprecated_features() {
            warn!(error = %e, "key generator uses deprecated features");
            return Err(Error::Deprecated(e));
        }

        let cd = generate_cipher_data(&self.generator, ctx, KEY_LEN, NONCE_LEN, AES_GCM_NO_PADDING)
            .await?;
        Ok(AesGcmContentCipher::new(cd)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CipherError;
    use crate::generator::{CallShape, GeneratorError};
    use crate::testing::{FakeGenerator, Shapes};
    use s3crypto_common::cipher_data::GCM_TAG_LENGTH_BITS;
    use s3crypto_common::{CipherData, ContentKey};
    use std::io::Read;
    use std::sync::Arc;

    #[tokio::test]
    async fn requests_fixed_lengths_and_algorithm() {
        let generator = Arc::new(FakeGenerator::new(Shapes::new(true, true, true)));
        let builder = AesGcmContentCipherBuilder::new(Arc::clone(&generator));
        let cipher = builder.content_cipher().await.unwrap();

        assert!(Arc::ptr_eq(builder.generator(), &generator));
        assert_eq!(generator.calls(), vec![CallShape::CekAlgWithContext]);
        assert_eq!(generator.last_cek_alg().as_deref(), Some(AES_GCM_NO_PADDING));
        assert_eq!(cipher.cipher_data().key.len(), KEY_LEN);
        assert_eq!(cipher.cipher_data().iv.len(), NONCE_LEN);
    }

    #[tokio::test]
    async fn overrides_generator_scheme_metadata() {
        let generator = FakeGenerator::new(Shapes::new(false, true, false)).returning(CipherData {
            cek_algorithm: "AES/CTR/NoPadding".into(),
            tag_length: "32".into(),
            wrap_algorithm: "kms+context".into(),
            ..Default::default()
        });
        let cipher = AesGcmContentCipherBuilder::new(generator)
            .content_cipher()
            .await
            .unwrap();
        let cd = cipher.cipher_data();
        assert_eq!(cd.cek_algorithm, AES_GCM_NO_PADDING);
        assert_eq!(cd.tag_length, GCM_TAG_LENGTH_BITS);
        assert_eq!(cd.wrap_algorithm, "kms+context");
    }

    #[tokio::test]
    async fn deprecation_reported_before_generation() {
        let generator = Arc::new(FakeGenerator::new(Shapes::new(true, false, false)).deprecated("legacy"));
        let builder = AesGcmContentCipherBuilder::new(Arc::clone(&generator));

        let err = builder.content_cipher().await.unwrap_err();
        assert!(matches!(err, Error::Deprecated(DeprecatedUsage(ref m)) if m == "legacy"));
        assert_eq!(generator.deprecation_checks(), 1);
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn generator_error_propagates_unchanged() {
        let generator = FakeGenerator::new(Shapes::new(false, false, true)).failing();
        let err = AesGcmContentCipherBuilder::new(generator)
            .content_cipher()
            .await
            .unwrap_err();
        match err {
            Error::Generator(GeneratorError::Other(e)) => {
                assert_eq!(e.to_string(), "upstream key service unavailable");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn bad_generator_output_builds_nothing() {
        let generator = FakeGenerator::new(Shapes::new(false, false, false)).returning(CipherData {
            key: ContentKey::from(vec![0u8; 16]),
            ..Default::default()
        });
        let err = AesGcmContentCipherBuilder::new(generator)
            .content_cipher()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Cipher(CipherError::InvalidKeyLength { actual: 16, .. })
        ));
    }

    #[tokio::test]
    async fn context_is_forwarded() {
        let generator = Arc::new(FakeGenerator::new(Shapes::new(false, false, true)));
        let builder = AesGcmContentCipherBuilder::new(Arc::clone(&generator));
        let token = CancellationToken::new();
        token.cancel();
        builder.content_cipher_with_context(&token).await.unwrap();
        assert_eq!(generator.saw_cancelled(), Some(true));

        builder.content_cipher().await.unwrap();
        assert_eq!(generator.saw_cancelled(), Some(false));
    }

    #[tokio::test]
    async fn built_ciphers_round_trip() {
        let builder =
            AesGcmContentCipherBuilder::new(FakeGenerator::new(Shapes::new(false, true, false)));
        let cipher = builder.content_cipher().await.unwrap();
        let cd = cipher.cipher_data().clone();

        let mut sealed = Vec::new();
        cipher
            .encrypt_contents(&b"object body"[..])
            .read_to_end(&mut sealed)
            .unwrap();

        let mut opened = Vec::new();
        AesGcmContentCipher::from_stored(cd)
            .unwrap()
            .decrypt_contents(sealed.as_slice())
            .read_to_end(&mut opened)
            .unwrap();
        assert_eq!(opened, b"object body");
    }
}
