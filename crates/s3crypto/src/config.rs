//! Configuration for the KMS-backed key generator.
//!
//! Values are read from `S3CRYPTO_`-prefixed environment variables. Embedding
//! applications call [`KmsConfig::from_env`] once at startup; a missing or
//! invalid value is reported with the variable's name.

use anyhow::{Context, Result};
use s3crypto_common::cipher_data::CEK_ALG_CONTEXT_KEY;
use s3crypto_common::MaterialDescription;
use serde::Deserialize;

/// Prefix shared by every environment variable this crate reads.
pub const ENV_PREFIX: &str = "S3CRYPTO";

/// Validated key generator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct KmsConfig {
    /// KMS key ID, ARN or alias that wraps content keys. **Required.**
    pub kms_key_id: String,

    /// Override for the KMS endpoint, e.g. a local emulator.
    #[serde(default)]
    pub kms_endpoint_url: Option<String>,

    /// Material description as a JSON object of strings. Becomes the KMS
    /// encryption context.
    #[serde(default = "default_material_description")]
    pub material_description: String,

    /// Wrap keys with the deprecated `"kms"` algorithm instead of
    /// `"kms+context"`. Only for interoperating with old readers.
    #[serde(default)]
    pub legacy_wrap: bool,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_material_description() -> String {
    "{}".into()
}
fn default_log_level() -> String {
    "info".into()
}

impl KmsConfig {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `S3CRYPTO_KMS_KEY_ID` is absent or any variable
    /// fails validation.
    pub fn from_env() -> Result<Self> {
        Self::load(config::Environment::with_prefix(ENV_PREFIX))
    }

    fn load(env: config::Environment) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(env)
            .build()
            .context("failed to build configuration from environment")?;

        let c: KmsConfig = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Parse [`material_description`](Self::material_description).
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a JSON object of strings.
    pub fn parsed_material_description(&self) -> Result<MaterialDescription> {
        serde_json::from_str(&self.material_description)
            .context("S3CRYPTO_MATERIAL_DESCRIPTION must be a JSON object of strings")
    }

    fn validate(&self) -> Result<()> {
        if self.kms_key_id.trim().is_empty() {
            anyhow::bail!("S3CRYPTO_KMS_KEY_ID is required and must not be empty");
        }
        if let Some(url) = &self.kms_endpoint_url {
            if url.trim().is_empty() {
                anyhow::bail!("S3CRYPTO_KMS_ENDPOINT_URL must not be empty when set");
            }
        }
        let md = self.parsed_material_description()?;
        if md.contains_key(CEK_ALG_CONTEXT_KEY) {
            anyhow::bail!(
                "S3CRYPTO_MATERIAL_DESCRIPTION must not contain the reserved key {CEK_ALG_CONTEXT_KEY:?}"
            );
        }
        Ok(())
    }
}
