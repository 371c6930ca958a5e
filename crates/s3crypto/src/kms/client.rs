//! [`KmsApi`]: the two KMS calls the key generator needs, and the AWS SDK
//! implementation behind them.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_kms::error::DisplayErrorContext;
use aws_sdk_kms::primitives::Blob;
use s3crypto_common::{ContentKey, MaterialDescription};
use thiserror::Error;
use tracing::debug;

use crate::config::KmsConfig;

/// Errors produced by the KMS layer.
#[derive(Debug, Error)]
pub enum KmsError {
    /// The KMS request failed.
    #[error("KMS request failed: {0}")]
    Service(String),

    /// The KMS response lacked a field the request requires.
    #[error("KMS response contained no {0}")]
    MissingField(&'static str),

    /// The request could not be expressed as a KMS call.
    #[error("invalid KMS request: {0}")]
    InvalidRequest(String),
}

/// A freshly generated data key: plaintext for encryption, blob for storage.
#[derive(Debug)]
pub struct DataKey {
    /// Plaintext content key. Zeroed on drop.
    pub plaintext: ContentKey,
    /// The same key wrapped under the customer master key.
    pub ciphertext_blob: Vec<u8>,
}

/// Key-management operations used to wrap and unwrap content keys.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KmsApi: Send + Sync {
    /// Generate a `key_len`-byte data key under `key_id`, bound to
    /// `encryption_context`.
    async fn generate_data_key(
        &self,
        key_id: &str,
        encryption_context: &MaterialDescription,
        key_len: usize,
    ) -> Result<DataKey, KmsError>;

    /// Unwrap `ciphertext_blob`. The encryption context must match the one
    /// used when the key was generated.
    async fn decrypt(
        &self,
        key_id: &str,
        ciphertext_blob: &[u8],
        encryption_context: &MaterialDescription,
    ) -> Result<ContentKey, KmsError>;
}

/// [`KmsApi`] backed by the AWS SDK.
#[derive(Debug, Clone)]
pub struct AwsKms {
    client: aws_sdk_kms::Client,
}

impl AwsKms {
    /// Wrap an existing SDK client.
    pub fn new(client: aws_sdk_kms::Client) -> Self {
        Self { client }
    }

    /// Build a client from the default AWS credential and region chain.
    ///
    /// `cfg.kms_endpoint_url`, when set, overrides the service endpoint
    /// (local KMS emulators, VPC endpoints).
    ///
    /// # Errors
    ///
    /// Currently infallible; kept fallible so endpoint resolution can report
    /// errors without an API change.
    pub async fn from_config(cfg: &KmsConfig) -> anyhow::Result<Self> {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;

        let mut builder = aws_sdk_kms::config::Builder::from(&sdk_config);
        if let Some(url) = &cfg.kms_endpoint_url {
            builder = builder.endpoint_url(url);
        }

        Ok(Self::new(aws_sdk_kms::Client::from_conf(builder.build())))
    }
}

/// KMS rejects an empty encryption context map, so omit it instead.
fn sdk_context(ctx: &MaterialDescription) -> Option<HashMap<String, String>> {
    if ctx.is_empty() {
        None
    } else {
        Some(ctx.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

#[async_trait]
impl KmsApi for AwsKms {
    async fn generate_data_key(
        &self,
        key_id: &str,
        encryption_context: &MaterialDescription,
        key_len: usize,
    ) -> Result<DataKey, KmsError> {
        let number_of_bytes = i32::try_from(key_len)
            .map_err(|_| KmsError::InvalidRequest(format!("key length {key_len} out of range")))?;

        debug!(key_id, key_len, "KMS GenerateDataKey");
        let resp = self
            .client
            .generate_data_key()
            .key_id(key_id)
            .number_of_bytes(number_of_bytes)
            .set_encryption_context(sdk_context(encryption_context))
            .send()
            .await
            .map_err(|e| KmsError::Service(DisplayErrorContext(&e).to_string()))?;

        let plaintext = resp
            .plaintext()
            .ok_or(KmsError::MissingField("plaintext"))?;
        let ciphertext_blob = resp
            .ciphertext_blob()
            .ok_or(KmsError::MissingField("ciphertext blob"))?;

        Ok(DataKey {
            plaintext: ContentKey::from(plaintext.as_ref()),
            ciphertext_blob: ciphertext_blob.as_ref().to_vec(),
        })
    }

    async fn decrypt(
        &self,
        key_id: &str,
        ciphertext_blob: &[u8],
        encryption_context: &MaterialDescription,
    ) -> Result<ContentKey, KmsError> {
        debug!(key_id, "KMS Decrypt");
        let resp = self
            .client
            .decrypt()
            .key_id(key_id)
            .ciphertext_blob(Blob::new(ciphertext_blob))
            .set_encryption_context(sdk_context(encryption_context))
            .send()
            .await
            .map_err(|e| KmsError::Service(DisplayErrorContext(&e).to_string()))?;

        let plaintext = resp
            .plaintext()
            .ok_or(KmsError::MissingField("plaintext"))?;
        Ok(ContentKey::from(plaintext.as_ref()))
    }
}
