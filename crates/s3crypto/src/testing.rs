//! Test doubles shared by unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use s3crypto_common::{CipherData, ContentKey};
use tokio_util::sync::CancellationToken;

use crate::generator::{
    CallShape, Capabilities, CipherDataGenerator, CipherDataGeneratorWithCekAlg,
    CipherDataGeneratorWithCekAlgWithContext, CipherDataGeneratorWithContext, DeprecatedFeatures,
    DeprecatedUsage, GeneratorError,
};

/// Which optional call shapes a [`FakeGenerator`] advertises.
#[derive(Debug, Clone, Copy)]
pub struct Shapes {
    pub cek_alg_with_context: bool,
    pub cek_alg: bool,
    pub context: bool,
}

impl Shapes {
    pub const fn new(cek_alg_with_context: bool, cek_alg: bool, context: bool) -> Self {
        Self {
            cek_alg_with_context,
            cek_alg,
            context,
        }
    }
}

#[derive(Default)]
struct Record {
    calls: Vec<CallShape>,
    cek_alg: Option<String>,
    cancelled: Option<bool>,
    deprecation_checks: usize,
}

/// Generator that records every call and returns configurable cipher data.
pub struct FakeGenerator {
    shapes: Shapes,
    deprecated: Option<String>,
    fail: bool,
    output: CipherData,
    record: Mutex<Record>,
}

impl FakeGenerator {
    pub fn new(shapes: Shapes) -> Self {
        Self {
            shapes,
            deprecated: None,
            fail: false,
            output: CipherData::default(),
            record: Mutex::new(Record::default()),
        }
    }

    /// Report `message` from the deprecation check.
    pub fn deprecated(mut self, message: &str) -> Self {
        self.deprecated = Some(message.to_owned());
        self
    }

    /// Fail every generation call.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Return exactly `output` instead of zeroed material of the requested size.
    pub fn returning(mut self, output: CipherData) -> Self {
        self.output = output;
        self
    }

    pub fn calls(&self) -> Vec<CallShape> {
        self.record.lock().unwrap().calls.clone()
    }

    pub fn last_cek_alg(&self) -> Option<String> {
        self.record.lock().unwrap().cek_alg.clone()
    }

    pub fn saw_cancelled(&self) -> Option<bool> {
        self.record.lock().unwrap().cancelled
    }

    pub fn deprecation_checks(&self) -> usize {
        self.record.lock().unwrap().deprecation_checks
    }

    fn respond(
        &self,
        shape: CallShape,
        ctx: Option<&CancellationToken>,
        key_len: usize,
        nonce_len: usize,
        cek_alg: Option<&str>,
    ) -> Result<CipherData, GeneratorError> {
        {
            let mut record = self.record.lock().unwrap();
            record.calls.push(shape);
            record.cek_alg = cek_alg.map(str::to_owned);
            record.cancelled = ctx.map(CancellationToken::is_cancelled);
        }
        if self.fail {
            return Err(GeneratorError::Other("upstream key service unavailable".into()));
        }
        let mut cd = self.output.clone();
        if cd.key.is_empty() {
            cd.key = ContentKey::from(vec![0u8; key_len]);
        }
        if cd.iv.is_empty() {
            cd.iv = vec![0u8; nonce_len];
        }
        Ok(cd)
    }
}

#[async_trait]
impl CipherDataGenerator for FakeGenerator {
    async fn generate_cipher_data(
        &self,
        key_len: usize,
        nonce_len: usize,
    ) -> Result<CipherData, GeneratorError> {
        self.respond(CallShape::Baseline, None, key_len, nonce_len, None)
    }

    fn capabilities(&self) -> Capabilities<'_> {
        Capabilities {
            with_cek_alg_with_context: self
                .shapes
                .cek_alg_with_context
                .then_some(self as &dyn CipherDataGeneratorWithCekAlgWithContext),
            with_cek_alg: self
                .shapes
                .cek_alg
                .then_some(self as &dyn CipherDataGeneratorWithCekAlg),
            with_context: self
                .shapes
                .context
                .then_some(self as &dyn CipherDataGeneratorWithContext),
            deprecated_features: self
                .deprecated
                .is_some()
                .then_some(self as &dyn DeprecatedFeatures),
        }
    }
}

#[async_trait]
impl CipherDataGeneratorWithContext for FakeGenerator {
    async fn generate_cipher_data_with_context(
        &self,
        ctx: &CancellationToken,
        key_len: usize,
        nonce_len: usize,
    ) -> Result<CipherData, GeneratorError> {
        self.respond(CallShape::Context, Some(ctx), key_len, nonce_len, None)
    }
}

#[async_trait]
impl CipherDataGeneratorWithCekAlg for FakeGenerator {
    async fn generate_cipher_data_with_cek_alg(
        &self,
        key_len: usize,
        nonce_len: usize,
        cek_alg: &str,
    ) -> Result<CipherData, GeneratorError> {
        self.respond(CallShape::CekAlg, None, key_len, nonce_len, Some(cek_alg))
    }
}

#[async_trait]
impl CipherDataGeneratorWithCekAlgWithContext for FakeGenerator {
    async fn generate_cipher_data_with_cek_alg_with_context(
        &self,
        ctx: &CancellationToken,
        key_len: usize,
        nonce_len: usize,
        cek_alg: &str,
    ) -> Result<CipherData, GeneratorError> {
        self.respond(
            CallShape::CekAlgWithContext,
            Some(ctx),
            key_len,
            nonce_len,
            Some(cek_alg),
        )
    }
}

impl DeprecatedFeatures for FakeGenerator {
    fn check_deprecated_features(&self) -> Result<(), DeprecatedUsage> {
        self.record.lock().unwrap().deprecation_checks += 1;
        match &self.deprecated {
            Some(message) => Err(DeprecatedUsage(message.clone())),
            None => Ok(()),
        }
    }
}
