//! Envelope metadata stored alongside an encrypted object.
//!
//! The envelope is the persisted form of [`CipherData`]: the wrapped key and
//! IV are base64-encoded, the material description is a JSON object string,
//! and everything else is carried verbatim. The raw key never appears here.
//!
//! Field names match the object metadata headers used by S3 client-side
//! encryption, so an envelope serialised with `serde_json` is also a valid
//! instruction file.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::cipher_data::{CipherData, ContentKey, MaterialDescription};
use crate::error::ProtocolError;

/// Wire name of the wrapped key field.
pub const KEY_V2_HEADER: &str = "x-amz-key-v2";
/// Wire name of the IV field.
pub const IV_HEADER: &str = "x-amz-iv";
/// Wire name of the material description field.
pub const MATDESC_HEADER: &str = "x-amz-matdesc";
/// Wire name of the wrap algorithm field.
pub const WRAP_ALG_HEADER: &str = "x-amz-wrap-alg";
/// Wire name of the CEK algorithm field.
pub const CEK_ALG_HEADER: &str = "x-amz-cek-alg";
/// Wire name of the tag length field.
pub const TAG_LEN_HEADER: &str = "x-amz-tag-len";
/// Wire name of the plaintext length field.
pub const UNENCRYPTED_CONTENT_LENGTH_HEADER: &str = "x-amz-unencrypted-content-length";

/// Self-describing metadata needed to decrypt one stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64 of the wrapped content encryption key.
    #[serde(rename = "x-amz-key-v2")]
    pub cipher_key: String,

    /// Base64 of the IV.
    #[serde(rename = "x-amz-iv")]
    pub iv: String,

    /// JSON object string of the material description.
    #[serde(rename = "x-amz-matdesc")]
    pub material_description: String,

    /// Key wrap algorithm.
    #[serde(rename = "x-amz-wrap-alg")]
    pub wrap_algorithm: String,

    /// Content cipher algorithm.
    #[serde(rename = "x-amz-cek-alg")]
    pub cek_algorithm: String,

    /// Tag length in bits.
    #[serde(rename = "x-amz-tag-len")]
    pub tag_length: String,

    /// Plaintext length in bytes, when known at upload time.
    #[serde(
        rename = "x-amz-unencrypted-content-length",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub unencrypted_content_length: Option<String>,
}

impl Envelope {
    /// Build the persisted form of `cd`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidMaterialDescription`] if the material
    /// description cannot be serialised.
    pub fn from_cipher_data(
        cd: &CipherData,
        unencrypted_content_length: Option<u64>,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            cipher_key: STANDARD.encode(&cd.encrypted_key),
            iv: STANDARD.encode(&cd.iv),
            material_description: serde_json::to_string(&cd.material_description)?,
            wrap_algorithm: cd.wrap_algorithm.clone(),
            cek_algorithm: cd.cek_algorithm.clone(),
            tag_length: cd.tag_length.clone(),
            unencrypted_content_length: unencrypted_content_length.map(|n| n.to_string()),
        })
    }

    /// Decode the wrapped key.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidBase64`] if the field is malformed.
    pub fn encrypted_key(&self) -> Result<Vec<u8>, ProtocolError> {
        decode_field(KEY_V2_HEADER, &self.cipher_key)
    }

    /// Decode the IV.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidBase64`] if the field is malformed.
    pub fn iv(&self) -> Result<Vec<u8>, ProtocolError> {
        decode_field(IV_HEADER, &self.iv)
    }

    /// Parse the material description. An empty string is an empty map.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidMaterialDescription`] if the field is
    /// not a JSON object of strings.
    pub fn material_description(&self) -> Result<MaterialDescription, ProtocolError> {
        if self.material_description.trim().is_empty() {
            return Ok(MaterialDescription::new());
        }
        Ok(serde_json::from_str(&self.material_description)?)
    }

    /// Parse the plaintext length, if recorded.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidContentLength`] if the field is present
    /// but not a decimal integer.
    pub fn unencrypted_content_length(&self) -> Result<Option<u64>, ProtocolError> {
        self.unencrypted_content_length
            .as_deref()
            .map(|s| {
                s.parse()
                    .map_err(|_| ProtocolError::InvalidContentLength(s.to_owned()))
            })
            .transpose()
    }

    /// Rebuild [`CipherData`] from this envelope and the unwrapped key.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] if any encoded field is malformed.
    pub fn into_cipher_data(&self, key: ContentKey) -> Result<CipherData, ProtocolError> {
        Ok(CipherData {
            key,
            iv: self.iv()?,
            wrap_algorithm: self.wrap_algorithm.clone(),
            cek_algorithm: self.cek_algorithm.clone(),
            tag_length: self.tag_length.clone(),
            material_description: self.material_description()?,
            encrypted_key: self.encrypted_key()?,
        })
    }
}

fn decode_field(field: &'static str, value: &str) -> Result<Vec<u8>, ProtocolError> {
    STANDARD
        .decode(value)
        .map_err(|source| ProtocolError::InvalidBase64 { field, source })
}
