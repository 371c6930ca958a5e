//! Common types, envelope metadata, and errors shared across `s3crypto` crates.

pub mod cipher_data;
pub mod error;
pub mod protocol;

pub use cipher_data::{CipherData, ContentKey, MaterialDescription};
pub use error::ProtocolError;
pub use protocol::Envelope;
