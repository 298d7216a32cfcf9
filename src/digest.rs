//! Digest algorithm selection for probe authentication.
//!
//! OpenVPN names its `--auth` digests the way OpenSSL does (`SHA1`, `SHA256`,
//! `SHA3-256`, `SHA512-256`). Lookup is case-insensitive and also takes the
//! underscored spellings of hash library names (`sha3_256`, `sha512_256`).

use std::{fmt, str::FromStr};

use hmac::{digest::KeyInit, Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512, Sha512_224, Sha512_256};
use sha3::{Sha3_224, Sha3_256, Sha3_384, Sha3_512};
use thiserror::Error;

/// Errors raised while selecting a digest.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DigestError {
    /// The requested algorithm is not available.
    #[error("Unsupported digest algorithm: {0}")]
    Unsupported(String),

    /// The requested output size is zero.
    #[error("Digest size must be positive")]
    ZeroSize,
}

/// Hash algorithms usable for the tls-auth HMAC.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Sha512_224,
    Sha512_256,
    Sha3_224,
    Sha3_256,
    Sha3_384,
    Sha3_512,
}

impl DigestAlgorithm {
    /// Every supported algorithm.
    pub const ALL: [DigestAlgorithm; 12] = [
        DigestAlgorithm::Md5,
        DigestAlgorithm::Sha1,
        DigestAlgorithm::Sha224,
        DigestAlgorithm::Sha256,
        DigestAlgorithm::Sha384,
        DigestAlgorithm::Sha512,
        DigestAlgorithm::Sha512_224,
        DigestAlgorithm::Sha512_256,
        DigestAlgorithm::Sha3_224,
        DigestAlgorithm::Sha3_256,
        DigestAlgorithm::Sha3_384,
        DigestAlgorithm::Sha3_512,
    ];

    /// Looks an algorithm up by name.
    ///
    /// The name is lower-cased and `_` is read as `-`, then matched against
    /// the canonical name and its aliases. `SHA-256`, `sha256`, `sha3_256`
    /// and `SHA512-256` all resolve.
    ///
    /// ```
    /// use openvpn_probe::digest::DigestAlgorithm;
    /// assert_eq!(DigestAlgorithm::lookup("SHA256"), Some(DigestAlgorithm::Sha256));
    /// assert_eq!(DigestAlgorithm::lookup("sha3_256"), Some(DigestAlgorithm::Sha3_256));
    /// assert_eq!(DigestAlgorithm::lookup("whirlpool"), None);
    /// ```
    pub fn lookup(name: &str) -> Option<Self> {
        let normalized = name.trim().to_lowercase().replace('_', "-");

        Self::ALL.iter().copied().find(|alg| {
            alg.name() == normalized || alg.aliases().iter().any(|alias| *alias == normalized)
        })
    }

    /// Canonical lower-case name.
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "md5",
            DigestAlgorithm::Sha1 => "sha1",
            DigestAlgorithm::Sha224 => "sha224",
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha384 => "sha384",
            DigestAlgorithm::Sha512 => "sha512",
            DigestAlgorithm::Sha512_224 => "sha512-224",
            DigestAlgorithm::Sha512_256 => "sha512-256",
            DigestAlgorithm::Sha3_224 => "sha3-224",
            DigestAlgorithm::Sha3_256 => "sha3-256",
            DigestAlgorithm::Sha3_384 => "sha3-384",
            DigestAlgorithm::Sha3_512 => "sha3-512",
        }
    }

    /// Other accepted spellings, already normalized.
    fn aliases(&self) -> &'static [&'static str] {
        match self {
            DigestAlgorithm::Md5 => &[],
            DigestAlgorithm::Sha1 => &["sha-1"],
            DigestAlgorithm::Sha224 => &["sha-224", "sha2-224"],
            DigestAlgorithm::Sha256 => &["sha-256", "sha2-256"],
            DigestAlgorithm::Sha384 => &["sha-384", "sha2-384"],
            DigestAlgorithm::Sha512 => &["sha-512", "sha2-512"],
            DigestAlgorithm::Sha512_224 => &["sha-512/224", "sha512/224"],
            DigestAlgorithm::Sha512_256 => &["sha-512/256", "sha512/256"],
            DigestAlgorithm::Sha3_224 => &[],
            DigestAlgorithm::Sha3_256 => &[],
            DigestAlgorithm::Sha3_384 => &[],
            DigestAlgorithm::Sha3_512 => &[],
        }
    }

    /// Natural output length in bytes.
    pub fn output_size(&self) -> usize {
        match self {
            DigestAlgorithm::Md5 => 16,
            DigestAlgorithm::Sha1 => 20,
            DigestAlgorithm::Sha224 | DigestAlgorithm::Sha512_224 | DigestAlgorithm::Sha3_224 => 28,
            DigestAlgorithm::Sha256 | DigestAlgorithm::Sha512_256 | DigestAlgorithm::Sha3_256 => 32,
            DigestAlgorithm::Sha384 | DigestAlgorithm::Sha3_384 => 48,
            DigestAlgorithm::Sha512 | DigestAlgorithm::Sha3_512 => 64,
        }
    }

    /// Computes the HMAC of `fields` concatenated in order.
    ///
    /// The full natural-length digest is returned; callers decide whether to
    /// shorten it.
    #[must_use]
    pub fn hmac(&self, key: &[u8], fields: &[&[u8]]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Md5 => compute::<Hmac<Md5>>(key, fields),
            DigestAlgorithm::Sha1 => compute::<Hmac<Sha1>>(key, fields),
            DigestAlgorithm::Sha224 => compute::<Hmac<Sha224>>(key, fields),
            DigestAlgorithm::Sha256 => compute::<Hmac<Sha256>>(key, fields),
            DigestAlgorithm::Sha384 => compute::<Hmac<Sha384>>(key, fields),
            DigestAlgorithm::Sha512 => compute::<Hmac<Sha512>>(key, fields),
            DigestAlgorithm::Sha512_224 => compute::<Hmac<Sha512_224>>(key, fields),
            DigestAlgorithm::Sha512_256 => compute::<Hmac<Sha512_256>>(key, fields),
            DigestAlgorithm::Sha3_224 => compute::<Hmac<Sha3_224>>(key, fields),
            DigestAlgorithm::Sha3_256 => compute::<Hmac<Sha3_256>>(key, fields),
            DigestAlgorithm::Sha3_384 => compute::<Hmac<Sha3_384>>(key, fields),
            DigestAlgorithm::Sha3_512 => compute::<Hmac<Sha3_512>>(key, fields),
        }
    }
}

fn compute<M: Mac + KeyInit>(key: &[u8], fields: &[&[u8]]) -> Vec<u8> {
    let mut mac =
        <M as KeyInit>::new_from_slice(key).expect("HMAC can take key of any size");
    for field in fields {
        Mac::update(&mut mac, field);
    }
    mac.finalize().into_bytes().to_vec()
}

impl FromStr for DigestAlgorithm {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::lookup(s).ok_or_else(|| DigestError::Unsupported(s.to_string()))
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Selected algorithm together with the key window size in bytes.
///
/// `size` only governs how much key material is taken from a tls-auth file.
/// The HMAC embedded in the packet always has the algorithm's natural length.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DigestSpec {
    pub algorithm: DigestAlgorithm,
    pub size: usize,
}

impl DigestSpec {
    /// Creates a digest spec, defaulting `size` to the natural digest length.
    ///
    /// # Errors
    /// Returns `DigestError::ZeroSize` if an override of 0 is given.
    pub fn new(algorithm: DigestAlgorithm, size: Option<usize>) -> Result<Self, DigestError> {
        match size {
            Some(0) => Err(DigestError::ZeroSize),
            Some(size) => Ok(Self { algorithm, size }),
            None => Ok(Self::natural(algorithm)),
        }
    }

    /// Spec using the natural digest length.
    pub fn natural(algorithm: DigestAlgorithm) -> Self {
        Self {
            algorithm,
            size: algorithm.output_size(),
        }
    }
}

impl Default for DigestSpec {
    fn default() -> Self {
        Self::natural(DigestAlgorithm::Sha1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_case_insensitive() {
        assert_eq!(DigestAlgorithm::lookup("sha1"), Some(DigestAlgorithm::Sha1));
        assert_eq!(DigestAlgorithm::lookup("SHA1"), Some(DigestAlgorithm::Sha1));
        assert_eq!(DigestAlgorithm::lookup("Sha512"), Some(DigestAlgorithm::Sha512));
        assert_eq!(DigestAlgorithm::lookup("MD5"), Some(DigestAlgorithm::Md5));
    }

    #[test]
    fn test_lookup_dashed_names() {
        assert_eq!(DigestAlgorithm::lookup("SHA-256"), Some(DigestAlgorithm::Sha256));
        assert_eq!(DigestAlgorithm::lookup("sha_384"), Some(DigestAlgorithm::Sha384));
    }

    #[test]
    fn test_lookup_sha3_and_truncated_sha512() {
        assert_eq!(DigestAlgorithm::lookup("sha3_256"), Some(DigestAlgorithm::Sha3_256));
        assert_eq!(DigestAlgorithm::lookup("SHA3-512"), Some(DigestAlgorithm::Sha3_512));
        assert_eq!(DigestAlgorithm::lookup("sha3_224"), Some(DigestAlgorithm::Sha3_224));
        assert_eq!(DigestAlgorithm::lookup("sha512_256"), Some(DigestAlgorithm::Sha512_256));
        assert_eq!(DigestAlgorithm::lookup("SHA512-224"), Some(DigestAlgorithm::Sha512_224));
        assert_eq!(DigestAlgorithm::lookup("SHA-512/256"), Some(DigestAlgorithm::Sha512_256));
        assert_eq!(DigestAlgorithm::lookup("sha3256"), None);
    }

    #[test]
    fn test_lookup_unknown() {
        assert_eq!(DigestAlgorithm::lookup("whirlpool"), None);
        assert_eq!(DigestAlgorithm::lookup(""), None);
        assert!(matches!(
            "blake3".parse::<DigestAlgorithm>(),
            Err(DigestError::Unsupported(name)) if name == "blake3"
        ));
    }

    #[test]
    fn test_name_roundtrip() {
        for alg in DigestAlgorithm::ALL {
            assert_eq!(alg.to_string().parse::<DigestAlgorithm>().unwrap(), alg);
        }
    }

    #[test]
    fn test_output_size_matches_hmac_length() {
        for alg in DigestAlgorithm::ALL {
            assert_eq!(alg.hmac(b"key", &[b"data"]).len(), alg.output_size());
        }
    }

    #[test]
    fn test_hmac_md5_rfc2104_vector() {
        let key = [0x0b; 16];
        let mac = DigestAlgorithm::Md5.hmac(&key, &[b"Hi There"]);
        assert_eq!(hex::encode(mac), "9294727a3638bb1c13f48ef8158bfc9d");
    }

    #[test]
    fn test_hmac_sha1_rfc2202_vector() {
        let key = [0x0b; 20];
        let mac = DigestAlgorithm::Sha1.hmac(&key, &[b"Hi There"]);
        assert_eq!(hex::encode(mac), "b617318655057264e28bc0b6fb378c8ef146be00");
    }

    #[test]
    fn test_hmac_sha256_rfc4231_vector() {
        let key = [0x0b; 20];
        let mac = DigestAlgorithm::Sha256.hmac(&key, &[b"Hi There"]);
        assert_eq!(
            hex::encode(mac),
            "b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7"
        );
    }

    #[test]
    fn test_hmac_sha3_and_truncated_sha512_match_hmac_crate() {
        let key = [0x0b; 20];

        let mut sha3 = <Hmac<Sha3_256> as KeyInit>::new_from_slice(&key).unwrap();
        Mac::update(&mut sha3, b"Hi There");
        assert_eq!(
            DigestAlgorithm::Sha3_256.hmac(&key, &[b"Hi", b" There"]),
            sha3.finalize().into_bytes().to_vec()
        );

        let mut sha512_256 = <Hmac<Sha512_256> as KeyInit>::new_from_slice(&key).unwrap();
        Mac::update(&mut sha512_256, b"Hi There");
        assert_eq!(
            DigestAlgorithm::Sha512_256.hmac(&key, &[b"Hi", b" There"]),
            sha512_256.finalize().into_bytes().to_vec()
        );
    }

    #[test]
    fn test_hmac_fields_are_concatenated() {
        let key = [0x0b; 20];
        let whole = DigestAlgorithm::Sha1.hmac(&key, &[b"Hi There"]);
        let split = DigestAlgorithm::Sha1.hmac(&key, &[b"Hi", b" ", b"There"]);
        assert_eq!(whole, split);
    }

    #[test]
    fn test_spec_defaults_to_natural_size() {
        let spec = DigestSpec::new(DigestAlgorithm::Sha256, None).unwrap();
        assert_eq!(spec.size, 32);
        assert_eq!(DigestSpec::default().algorithm, DigestAlgorithm::Sha1);
        assert_eq!(DigestSpec::default().size, 20);
    }

    #[test]
    fn test_spec_size_override() {
        let spec = DigestSpec::new(DigestAlgorithm::Sha1, Some(16)).unwrap();
        assert_eq!(spec.size, 16);
        assert_eq!(
            DigestSpec::new(DigestAlgorithm::Sha1, Some(0)),
            Err(DigestError::ZeroSize)
        );
    }
}
