//! OpenVPN static key file parsing.
//!
//! A static key file looks like:
//!
//! ```text
//! #
//! # 2048 bit OpenVPN static key
//! #
//! -----BEGIN OpenVPN Static key V1-----
//! e6854d3c6b9e4f40e5d1d0f1a8a4b1c6
//! ...
//! -----END OpenVPN Static key V1-----
//! ```
//!
//! The 256 bytes between the markers are four 64-byte blocks: cipher and
//! HMAC keys for one direction, then cipher and HMAC keys for the other. A
//! client probe signs with the HMAC key of the second half.

use std::{fs, path::Path};

use thiserror::Error;

use crate::crypto::{describe_hex_error, HmacKey};

/// Byte offset of the client HMAC key inside the static key material.
pub const HMAC_CLIENT_KEY_START: usize = 192;

/// Errors that can occur while reading a static key file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyFileError {
    /// Failed to read the key file.
    #[error("Cannot read key file: {0}")]
    Read(String),

    /// The file is not a delimited hex key block.
    #[error("Malformed key file: {0}")]
    Format(String),

    /// The key block is too short for the requested window.
    #[error("Key file holds {available} key bytes, {required} required")]
    Range { available: usize, required: usize },
}

/// Reads the key file into memory.
pub fn read_key_file(path: &Path) -> Result<String, KeyFileError> {
    fs::read_to_string(path).map_err(|e| KeyFileError::Read(e.kind().to_string()))
}

/// Returns the hex payload between the first two `-`-prefixed lines.
///
/// Whitespace inside the block is dropped, so a key wrapped over several
/// lines comes back as one contiguous string.
///
/// ```
/// use openvpn_probe::key_file::extract_key_block;
/// let block = extract_key_block("junk\n-----\nAABBCC\nDDEE\n-----\nmore junk").unwrap();
/// assert_eq!(block, "AABBCCDDEE");
/// ```
///
/// # Errors
/// Returns `KeyFileError::Format` if the opening or closing delimiter is missing.
pub fn extract_key_block(content: &str) -> Result<String, KeyFileError> {
    let mut lines = content.lines();

    lines
        .by_ref()
        .find(|line| line.starts_with('-'))
        .ok_or_else(|| KeyFileError::Format("no opening delimiter".to_string()))?;

    let mut block = String::new();
    for line in lines {
        if line.starts_with('-') {
            return Ok(block);
        }
        block.extend(line.chars().filter(|c| !c.is_whitespace()));
    }

    Err(KeyFileError::Format("no closing delimiter".to_string()))
}

/// Decodes the client HMAC key of `digest_size` bytes from a hex key block.
///
/// The window is `[HMAC_CLIENT_KEY_START, HMAC_CLIENT_KEY_START + digest_size)`
/// in bytes, i.e. twice that in hex characters. Bounds are checked before
/// anything is decoded.
///
/// # Errors
/// Returns `KeyFileError::Range` if the block is too short and
/// `KeyFileError::Format` if the window is not valid hex.
pub fn tls_auth_key(hex_block: &str, digest_size: usize) -> Result<HmacKey, KeyFileError> {
    let required = HMAC_CLIENT_KEY_START.saturating_add(digest_size);
    let start = HMAC_CLIENT_KEY_START * 2;
    let end = required
        .checked_mul(2)
        .filter(|end| *end <= hex_block.len())
        .ok_or(KeyFileError::Range {
            available: hex_block.len() / 2,
            required,
        })?;

    let window = hex_block
        .get(start..end)
        .ok_or_else(|| KeyFileError::Format("key block is not ASCII hex".to_string()))?;
    let bytes = hex::decode(window).map_err(|e| KeyFileError::Format(describe_hex_error(&e)))?;

    HmacKey::new(bytes).map_err(|e| KeyFileError::Format(e.to_string()))
}
