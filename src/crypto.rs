//! HMAC key handling for probe authentication.
//!
//! A key comes either from a hex string given on the command line or from
//! the HMAC block of an OpenVPN static (tls-auth) key file.

use std::{fmt, path::Path};

use thiserror::Error;

use crate::{
    digest::{DigestAlgorithm, DigestSpec},
    key_file::{self, KeyFileError},
};

/// Errors that can occur while building an HMAC key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HmacError {
    /// The key has no bytes.
    #[error("HMAC key is empty")]
    EmptyKey,

    /// Invalid hexadecimal string.
    #[error("Invalid hex key: {0}")]
    InvalidHex(String),
}

/// HMAC key for probe authentication.
///
/// The bytes are never printed; `Debug` only shows the length.
#[derive(Clone, PartialEq, Eq)]
pub struct HmacKey(Vec<u8>);

impl HmacKey {
    /// Creates a new HmacKey from raw bytes.
    ///
    /// # Errors
    /// Returns `HmacError::EmptyKey` if `key` is empty.
    pub fn new(key: Vec<u8>) -> Result<Self, HmacError> {
        if key.is_empty() {
            return Err(HmacError::EmptyKey);
        }
        Ok(Self(key))
    }

    /// Creates a new HmacKey from a hexadecimal string.
    ///
    /// # Errors
    /// Returns `HmacError::InvalidHex` if the string is not valid hex.
    /// Returns `HmacError::EmptyKey` if the string is empty.
    pub fn from_hex(hex_str: &str) -> Result<Self, HmacError> {
        let key = hex::decode(hex_str.trim())
            .map_err(|e| HmacError::InvalidHex(describe_hex_error(&e)))?;
        Self::new(key)
    }

    /// Reads the client HMAC key out of an OpenVPN static key file.
    ///
    /// `digest.size` bytes are taken starting at
    /// [`key_file::HMAC_CLIENT_KEY_START`].
    ///
    /// # Errors
    /// Returns a `KeyFileError` if the file cannot be read, is not delimited
    /// properly, or holds too little key material.
    pub fn from_tls_auth_file(path: &Path, digest: DigestSpec) -> Result<Self, KeyFileError> {
        let content = key_file::read_key_file(path)?;
        let block = key_file::extract_key_block(&content)?;
        key_file::tls_auth_key(&block, digest.size)
    }

    /// Computes the HMAC of `fields`, concatenated in order, with `algorithm`.
    #[must_use]
    pub fn compute(&self, algorithm: DigestAlgorithm, fields: &[&[u8]]) -> Vec<u8> {
        algorithm.hmac(&self.0, fields)
    }

    /// Returns the key length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the key is empty (should never happen after construction).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Describes a hex decoding failure without echoing the offending character.
pub(crate) fn describe_hex_error(e: &hex::FromHexError) -> String {
    match e {
        hex::FromHexError::InvalidHexCharacter { index, .. } => {
            format!("invalid character at position {}", index)
        }
        hex::FromHexError::OddLength => "odd number of digits".to_string(),
        hex::FromHexError::InvalidStringLength => "invalid length".to_string(),
    }
}

impl fmt::Debug for HmacKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "HmacKey({} bytes)", self.0.len())
    }
}
