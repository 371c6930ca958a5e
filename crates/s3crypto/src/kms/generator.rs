//! [`KmsKeyGenerator`]: content keys generated and wrapped by KMS.

use std::future::Future;

use aes_gcm::aead::{rand_core::RngCore, OsRng};
use async_trait::async_trait;
use s3crypto_common::cipher_data::{CEK_ALG_CONTEXT_KEY, KMS_CONTEXT_WRAP, KMS_WRAP};
use s3crypto_common::{CipherData, ContentKey, Envelope, MaterialDescription};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::KmsConfig;
use crate::error::Error;
use crate::generator::{
    Capabilities, CipherDataGenerator, CipherDataGeneratorWithCekAlg,
    CipherDataGeneratorWithCekAlgWithContext, CipherDataGeneratorWithContext, DeprecatedFeatures,
    DeprecatedUsage, GeneratorError,
};
use crate::kms::client::{AwsKms, KmsApi, KmsError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wrap {
    /// `"kms+context"`: the CEK algorithm is bound into the encryption context.
    Context,
    /// `"kms"`: the encryption context is the material description alone.
    Legacy,
}

/// Key generator that asks KMS for a data key per object.
///
/// [`new`](Self::new) wraps with `"kms+context"` and advertises the
/// algorithm-aware call shapes. [`new_legacy`](Self::new_legacy) wraps with
/// `"kms"`, advertises the cancellation-aware shape only, and reports itself as
/// deprecated, so builders refuse it.
///
/// The material description must not contain `aws:x-amz-cek-alg`; generation
/// fails with [`GeneratorError::ReservedContextKey`] before KMS is called.
pub struct KmsKeyGenerator<K> {
    kms: K,
    cmk_id: String,
    material_description: MaterialDescription,
    wrap: Wrap,
}

impl<K> std::fmt::Debug for KmsKeyGenerator<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KmsKeyGenerator")
            .field("cmk_id", &self.cmk_id)
            .field("wrap_algorithm", &self.wrap_algorithm())
            .field("material_description", &self.material_description)
            .finish_non_exhaustive()
    }
}

impl<K> KmsKeyGenerator<K> {
    /// Wrap algorithm recorded in the cipher data this generator produces.
    pub fn wrap_algorithm(&self) -> &'static str {
        match self.wrap {
            Wrap::Context => KMS_CONTEXT_WRAP,
            Wrap::Legacy => KMS_WRAP,
        }
    }

    /// The customer master key that wraps content keys.
    pub fn cmk_id(&self) -> &str {
        &self.cmk_id
    }
}

impl<K: KmsApi> KmsKeyGenerator<K> {
    /// A `"kms+context"` generator.
    pub fn new(
        kms: K,
        cmk_id: impl Into<String>,
        material_description: MaterialDescription,
    ) -> Self {
        Self {
            kms,
            cmk_id: cmk_id.into(),
            material_description,
            wrap: Wrap::Context,
        }
    }

    /// A deprecated `"kms"` generator, for readers that predate
    /// `"kms+context"`.
    pub fn new_legacy(
        kms: K,
        cmk_id: impl Into<String>,
        material_description: MaterialDescription,
    ) -> Self {
        Self {
            kms,
            cmk_id: cmk_id.into(),
            material_description,
            wrap: Wrap::Legacy,
        }
    }

    /// Build the generator `cfg` describes around an existing KMS client.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured material description does not parse.
    pub fn with_config(kms: K, cfg: &KmsConfig) -> anyhow::Result<Self> {
        let md = cfg.parsed_material_description()?;
        if cfg.legacy_wrap {
            warn!(cmk_id = %cfg.kms_key_id, "legacy \"kms\" key wrapping configured");
            Ok(Self::new_legacy(kms, cfg.kms_key_id.clone(), md))
        } else {
            Ok(Self::new(kms, cfg.kms_key_id.clone(), md))
        }
    }

    async fn generate(
        &self,
        ctx: Option<&CancellationToken>,
        key_len: usize,
        nonce_len: usize,
        cek_alg: Option<&str>,
    ) -> Result<CipherData, GeneratorError> {
        if self.material_description.contains_key(CEK_ALG_CONTEXT_KEY) {
            return Err(GeneratorError::ReservedContextKey(CEK_ALG_CONTEXT_KEY));
        }

        let mut encryption_context = self.material_description.clone();
        if self.wrap == Wrap::Context {
            let alg = cek_alg.ok_or_else(|| {
                GeneratorError::Unsupported(format!(
                    "{KMS_CONTEXT_WRAP} wrapping needs the CEK algorithm"
                ))
            })?;
            encryption_context.insert(CEK_ALG_CONTEXT_KEY.to_owned(), alg.to_owned());
        }

        debug!(cmk_id = %self.cmk_id, wrap = self.wrap_algorithm(), key_len, "generating data key");
        let round_trip = self
            .kms
            .generate_data_key(&self.cmk_id, &encryption_context, key_len);
        let data_key = cancellable(ctx, round_trip).await??;

        if data_key.plaintext.len() != key_len {
            return Err(GeneratorError::InvalidMaterial(format!(
                "KMS returned a {}-byte key, expected {key_len}",
                data_key.plaintext.len()
            )));
        }

        let mut iv = vec![0u8; nonce_len];
        OsRng.fill_bytes(&mut iv);

        Ok(CipherData {
            key: data_key.plaintext,
            iv,
            wrap_algorithm: self.wrap_algorithm().to_owned(),
            cek_algorithm: cek_alg.unwrap_or_default().to_owned(),
            tag_length: String::new(),
            material_description: encryption_context,
            encrypted_key: data_key.ciphertext_blob,
        })
    }

    /// Recover the cipher data for a stored object from its envelope.
    ///
    /// The wrapped key is sent to KMS with the envelope's material description
    /// as the encryption context. Both `"kms+context"` and `"kms"` envelopes are
    /// accepted, whichever way this generator wraps new keys.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedWrapAlgorithm`] for any other wrap algorithm.
    /// - [`Error::CekAlgorithmMismatch`] if a `"kms+context"` material
    ///   description does not name the envelope's CEK algorithm, or a `"kms"`
    ///   material description names one at all.
    /// - [`Error::Protocol`] for malformed envelope fields.
    /// - [`Error::Generator`] if KMS fails or `ctx` is cancelled.
    pub async fn cipher_data_from_envelope(
        &self,
        ctx: &CancellationToken,
        envelope: &Envelope,
    ) -> Result<CipherData, Error> {
        let md = envelope.material_description()?;
        let bound = md.get(CEK_ALG_CONTEXT_KEY);
        match envelope.wrap_algorithm.as_str() {
            KMS_CONTEXT_WRAP if bound == Some(&envelope.cek_algorithm) => {}
            KMS_WRAP if bound.is_none() => {}
            KMS_CONTEXT_WRAP | KMS_WRAP => {
                return Err(Error::CekAlgorithmMismatch {
                    envelope: envelope.cek_algorithm.clone(),
                    material_description: bound.cloned(),
                });
            }
            other => return Err(Error::UnsupportedWrapAlgorithm(other.to_owned())),
        }

        let blob = envelope.encrypted_key()?;
        debug!(cmk_id = %self.cmk_id, wrap = %envelope.wrap_algorithm, "unwrapping content key");
        let key: ContentKey = cancellable(Some(ctx), self.kms.decrypt(&self.cmk_id, &blob, &md))
            .await?
            .map_err(GeneratorError::from)?;

        Ok(envelope.into_cipher_data(key)?)
    }
}

impl KmsKeyGenerator<AwsKms> {
    /// Build an AWS-backed generator from `cfg`.
    ///
    /// # Errors
    ///
    /// Returns an error if the AWS client or the material description cannot
    /// be set up.
    pub async fn from_config(cfg: &KmsConfig) -> anyhow::Result<Self> {
        let kms = AwsKms::from_config(cfg).await?;
        Self::with_config(kms, cfg)
    }
}

/// Race `round_trip` against `ctx`; the round trip is dropped on cancellation.
async fn cancellable<T>(
    ctx: Option<&CancellationToken>,
    round_trip: impl Future<Output = Result<T, KmsError>>,
) -> Result<Result<T, KmsError>, GeneratorError> {
    match ctx {
        Some(ctx) => tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(GeneratorError::Cancelled),
            r = round_trip => Ok(r),
        },
        None => Ok(round_trip.await),
    }
}

#[async_trait]
impl<K: KmsApi> CipherDataGenerator for KmsKeyGenerator<K> {
    async fn generate_cipher_data(
        &self,
        key_len: usize,
        nonce_len: usize,
    ) -> Result<CipherData, GeneratorError> {
        self.generate(None, key_len, nonce_len, None).await
    }

    fn capabilities(&self) -> Capabilities<'_> {
        match self.wrap {
            Wrap::Context => Capabilities {
                with_cek_alg_with_context: Some(self),
                with_cek_alg: Some(self),
                ..Capabilities::default()
            },
            Wrap::Legacy => Capabilities {
                with_context: Some(self),
                deprecated_features: Some(self),
                ..Capabilities::default()
            },
        }
    }
}

#[async_trait]
impl<K: KmsApi> CipherDataGeneratorWithContext for KmsKeyGenerator<K> {
    async fn generate_cipher_data_with_context(
        &self,
        ctx: &CancellationToken,
        key_len: usize,
        nonce_len: usize,
    ) -> Result<CipherData, GeneratorError> {
        self.generate(Some(ctx), key_len, nonce_len, None).await
    }
}

#[async_trait]
impl<K: KmsApi> CipherDataGeneratorWithCekAlg for KmsKeyGenerator<K> {
    async fn generate_cipher_data_with_cek_alg(
        &self,
        key_len: usize,
        nonce_len: usize,
        cek_alg: &str,
    ) -> Result<CipherData, GeneratorError> {
        self.generate(None, key_len, nonce_len, Some(cek_alg)).await
    }
}

#[async_trait]
impl<K: KmsApi> CipherDataGeneratorWithCekAlgWithContext for KmsKeyGenerator<K> {
    async fn generate_cipher_data_with_cek_alg_with_context(
        &self,
        ctx: &CancellationToken,
        key_len: usize,
        nonce_len: usize,
        cek_alg: &str,
    ) -> Result<CipherData, GeneratorError> {
        self.generate(Some(ctx), key_len, nonce_len, Some(cek_alg))
            .await
    }
}

impl<K: KmsApi> DeprecatedFeatures for KmsKeyGenerator<K> {
    fn check_deprecated_features(&self) -> Result<(), DeprecatedUsage> {
        match self.wrap {
            Wrap::Context => Ok(()),
            Wrap::Legacy => Err(DeprecatedUsage(format!(
                "{KMS_WRAP:?} key wrapping does not bind the CEK algorithm; use {KMS_CONTEXT_WRAP:?}"
            ))),
        }
    }
}
