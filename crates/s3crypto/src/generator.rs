//! Key generators and call-shape dispatch.
//!
//! A key generator produces the [`CipherData`] for one object. Every generator
//! implements the baseline [`CipherDataGenerator`] call; richer call shapes are
//! optional and advertised through a [`Capabilities`] descriptor. The
//! dispatcher picks the richest advertised shape, in this order:
//!
//! 1. [`CallShape::CekAlgWithContext`]: cancellation token and CEK algorithm.
//! 2. [`CallShape::CekAlg`]: CEK algorithm only.
//! 3. [`CallShape::Context`]: cancellation token only.
//! 4. [`CallShape::Baseline`]: key and nonce lengths only.
//!
//! Exactly one shape is called per request. A failing call is returned as is;
//! lower shapes are only used when richer ones are absent, never as a retry.

use std::sync::Arc;

use async_trait::async_trait;
use s3crypto_common::CipherData;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::kms::KmsError;

/// Errors returned by key generators.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// The cancellation token fired before generation completed.
    #[error("cipher data generation cancelled")]
    Cancelled,

    /// The key-management service call failed.
    #[error(transparent)]
    Kms(#[from] KmsError),

    /// The generator produced unusable key material.
    #[error("generated key material is invalid: {0}")]
    InvalidMaterial(String),

    /// The material description already carries a key the generator adds
    /// itself.
    #[error("material description must not contain the reserved key {0:?}")]
    ReservedContextKey(&'static str),

    /// The generator cannot serve this call shape.
    #[error("unsupported key generator call: {0}")]
    Unsupported(String),

    /// Any other generator-specific failure.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// A deprecated or insecure generator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DeprecatedUsage(pub String);

/// Baseline key generator: key and nonce lengths in, [`CipherData`] out.
#[async_trait]
pub trait CipherDataGenerator: Send + Sync {
    /// Generate cipher data without cancellation or algorithm negotiation.
    async fn generate_cipher_data(
        &self,
        key_len: usize,
        nonce_len: usize,
    ) -> Result<CipherData, GeneratorError>;

    /// Advertise the optional call shapes this generator supports.
    ///
    /// The default advertises none, so only the baseline call is used.
    fn capabilities(&self) -> Capabilities<'_> {
        Capabilities::default()
    }
}

/// Generation that can be aborted through a cancellation token.
#[async_trait]
pub trait CipherDataGeneratorWithContext: Send + Sync {
    /// Generate cipher data, giving up once `ctx` is cancelled.
    async fn generate_cipher_data_with_context(
        &self,
        ctx: &CancellationToken,
        key_len: usize,
        nonce_len: usize,
    ) -> Result<CipherData, GeneratorError>;
}

/// Generation that is told which CEK algorithm the data will be used with.
#[async_trait]
pub trait CipherDataGeneratorWithCekAlg: Send + Sync {
    /// Generate cipher data for `cek_alg`.
    async fn generate_cipher_data_with_cek_alg(
        &self,
        key_len: usize,
        nonce_len: usize,
        cek_alg: &str,
    ) -> Result<CipherData, GeneratorError>;
}

/// Cancellable generation that is told the CEK algorithm.
#[async_trait]
pub trait CipherDataGeneratorWithCekAlgWithContext: Send + Sync {
    /// Generate cipher data for `cek_alg`, giving up once `ctx` is cancelled.
    async fn generate_cipher_data_with_cek_alg_with_context(
        &self,
        ctx: &CancellationToken,
        key_len: usize,
        nonce_len: usize,
        cek_alg: &str,
    ) -> Result<CipherData, GeneratorError>;
}

/// Reports whether a generator is configured in a deprecated way.
pub trait DeprecatedFeatures: Send + Sync {
    /// Returns the deprecation diagnostic, if any.
    fn check_deprecated_features(&self) -> Result<(), DeprecatedUsage>;
}

/// Optional capabilities of a key generator.
///
/// Each slot is either empty or points back at the generator through the
/// corresponding trait. Generators usually fill the slots with `Some(self)`.
#[derive(Default, Clone, Copy)]
pub struct Capabilities<'a> {
    /// Cancellation-aware, algorithm-aware generation.
    pub with_cek_alg_with_context: Option<&'a dyn CipherDataGeneratorWithCekAlgWithContext>,
    /// Algorithm-aware generation.
    pub with_cek_alg: Option<&'a dyn CipherDataGeneratorWithCekAlg>,
    /// Cancellation-aware generation.
    pub with_context: Option<&'a dyn CipherDataGeneratorWithContext>,
    /// Deprecation diagnostics.
    pub deprecated_features: Option<&'a dyn DeprecatedFeatures>,
}

impl<'a> Capabilities<'a> {
    /// The call shape the dispatcher will use.
    pub fn call_shape(&self) -> CallShape {
        match self.select() {
            Selected::CekAlgWithContext(_) => CallShape::CekAlgWithContext,
            Selected::CekAlg(_) => CallShape::CekAlg,
            Selected::Context(_) => CallShape::Context,
            Selected::Baseline => CallShape::Baseline,
        }
    }

    fn select(&self) -> Selected<'a> {
        if let Some(g) = self.with_cek_alg_with_context {
            Selected::CekAlgWithContext(g)
        } else if let Some(g) = self.with_cek_alg {
            Selected::CekAlg(g)
        } else if let Some(g) = self.with_context {
            Selected::Context(g)
        } else {
            Selected::Baseline
        }
    }

    /// Run the deprecation check, if the generator offers one.
    ///
    /// # Errors
    ///
    /// Returns the generator's [`DeprecatedUsage`] diagnostic.
    pub fn check_deprecated_features(&self) -> Result<(), DeprecatedUsage> {
        match self.deprecated_features {
            Some(features) => features.check_deprecated_features(),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Capabilities<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("with_cek_alg_with_context", &self.with_cek_alg_with_context.is_some())
            .field("with_cek_alg", &self.with_cek_alg.is_some())
            .field("with_context", &self.with_context.is_some())
            .field("deprecated_features", &self.deprecated_features.is_some())
            .finish()
    }
}

/// The generator call used for one request, richest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallShape {
    /// `(ctx, key_len, nonce_len, cek_alg)`
    CekAlgWithContext,
    /// `(key_len, nonce_len, cek_alg)`
    CekAlg,
    /// `(ctx, key_len, nonce_len)`
    Context,
    /// `(key_len, nonce_len)`
    Baseline,
}

enum Selected<'a> {
    CekAlgWithContext(&'a dyn CipherDataGeneratorWithCekAlgWithContext),
    CekAlg(&'a dyn CipherDataGeneratorWithCekAlg),
    Context(&'a dyn CipherDataGeneratorWithContext),
    Baseline,
}

/// Generate cipher data through the richest call shape `generator` offers.
///
/// `ctx` reaches the generator only through the context-aware shapes;
/// `cek_alg` only through the algorithm-aware ones.
///
/// # Errors
///
/// Returns the generator's error unchanged.
pub async fn generate_cipher_data<G>(
    generator: &G,
    ctx: &CancellationToken,
    key_len: usize,
    nonce_len: usize,
    cek_alg: &str,
) -> Result<CipherData, GeneratorError>
where
    G: CipherDataGenerator + ?Sized,
{
    let caps = generator.capabilities();
    debug!(shape = ?caps.call_shape(), key_len, nonce_len, "generating cipher data");

    match caps.select() {
        Selected::CekAlgWithContext(g) => {
            g.generate_cipher_data_with_cek_alg_with_context(ctx, key_len, nonce_len, cek_alg)
                .await
        }
        Selected::CekAlg(g) => {
            g.generate_cipher_data_with_cek_alg(key_len, nonce_len, cek_alg)
                .await
        }
        Selected::Context(g) => {
            g.generate_cipher_data_with_context(ctx, key_len, nonce_len)
                .await
        }
        Selected::Baseline => generator.generate_cipher_data(key_len, nonce_len).await,
    }
}

#[async_trait]
impl<T: CipherDataGenerator + ?Sized> CipherDataGenerator for Box<T> {
    async fn generate_cipher_data(
        &self,
        key_len: usize,
        nonce_len: usize,
    ) -> Result<CipherData, GeneratorError> {
        (**self).generate_cipher_data(key_len, nonce_len).await
    }

    fn capabilities(&self) -> Capabilities<'_> {
        (**self).capabilities()
    }
}

#[async_trait]
impl<T: CipherDataGenerator + ?Sized> CipherDataGenerator for Arc<T> {
    async fn generate_cipher_data(
        &self,
        key_len: usize,
        nonce_len: usize,
    ) -> Result<CipherData, GeneratorError> {
        (**self).generate_cipher_data(key_len, nonce_len).await
    }

    fn capabilities(&self) -> Capabilities<'_> {
        (**self).capabilities()
    }
}
