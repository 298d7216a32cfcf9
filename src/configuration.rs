use std::{path::PathBuf, time::Duration};

pub use clap::Parser;
use thiserror::Error;

use crate::{
    digest::{DigestAlgorithm, DigestError, DigestSpec},
    probe::Transport,
};

/// Default OpenVPN port.
pub const DEFAULT_PORT: u16 = 1194;

/// Argument errors, detected before any network activity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("--digest-size must be positive, got {0}")]
    InvalidDigestSize(i64),

    #[error("--tls-auth and --digest-key are mutually exclusive")]
    ConflictingKeys,

    #[error("--timeout must be positive")]
    InvalidTimeout,

    #[error(transparent)]
    Digest(#[from] DigestError),
}

/// Command line of the OpenVPN check.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(
    author,
    version,
    about = "Checks that an OpenVPN server answers a hard reset probe",
    long_about = None
)]
pub struct Configuration {
    /// OpenVPN server hostname or IP address
    pub host: String,
    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Use TCP instead of UDP
    #[arg(short, long)]
    pub tcp: bool,
    /// Timeout in seconds, applied to connect, send and receive
    #[arg(long, default_value_t = 5)]
    pub timeout: u64,
    /// HMAC digest algorithm (md5, sha1, sha224, sha256, sha384, sha512)
    #[arg(long, default_value = "sha1")]
    pub digest: String,
    /// Number of key bytes taken from the tls-auth file (defaults to the digest length)
    #[arg(long, allow_negative_numbers = true)]
    pub digest_size: Option<i64>,
    /// HMAC key as a hex string
    #[arg(long)]
    pub digest_key: Option<String>,
    /// OpenVPN static key file used for tls-auth
    #[arg(long)]
    pub tls_auth: Option<PathBuf>,
}

impl Configuration {
    /// Validates option combinations and values.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if let Some(size) = self.digest_size {
            if size <= 0 {
                return Err(ConfigurationError::InvalidDigestSize(size));
            }
        }

        if self.tls_auth.is_some() && self.digest_key.is_some() {
            return Err(ConfigurationError::ConflictingKeys);
        }

        if self.timeout == 0 {
            return Err(ConfigurationError::InvalidTimeout);
        }

        self.digest_algorithm()?;

        Ok(())
    }

    /// Resolves `--digest` to a supported algorithm.
    pub fn digest_algorithm(&self) -> Result<DigestAlgorithm, ConfigurationError> {
        Ok(self.digest.to_lowercase().parse::<DigestAlgorithm>()?)
    }

    /// Digest algorithm and key window size selected on the command line.
    pub fn digest_spec(&self) -> Result<DigestSpec, ConfigurationError> {
        let algorithm = self.digest_algorithm()?;
        let size = match self.digest_size {
            Some(size) => Some(
                usize::try_from(size)
                    .ok()
                    .filter(|size| *size > 0)
                    .ok_or(ConfigurationError::InvalidDigestSize(size))?,
            ),
            None => None,
        };
        Ok(DigestSpec::new(algorithm, size)?)
    }

    pub fn transport(&self) -> Transport {
        if self.tcp {
            Transport::Tcp
        } else {
            Transport::Udp
        }
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}
