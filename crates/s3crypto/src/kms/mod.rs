//! KMS key wrapping.
//!
//! [`KmsKeyGenerator`] asks KMS for a fresh data key per object and records
//! the wrapped copy in the cipher data. The KMS encryption context is the
//! material description; with `"kms+context"` wrapping it also carries
//! `aws:x-amz-cek-alg`, so a stored key cannot be unwrapped for a different
//! content algorithm.
//!
//! [`KmsApi`] is the seam to the service; [`AwsKms`] implements it over the
//! AWS SDK.

pub mod client;
pub mod generator;

pub use client::{AwsKms, DataKey, KmsApi, KmsError};
pub use generator::KmsKeyGenerator;
