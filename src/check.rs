//! Runs one probe and turns its outcome into a monitoring status line.

use std::fmt;

use thiserror::Error;

use crate::{
    configuration::{Configuration, ConfigurationError},
    crypto::{HmacError, HmacKey},
    digest::DigestSpec,
    key_file::KeyFileError,
    packets,
    probe::{self, ProbeError, ProbeReply, Transport},
};

/// Monitoring states emitted by the check.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    Critical,
}

impl CheckStatus {
    /// Process exit code expected by the monitoring supervisor.
    pub fn exit_code(&self) -> u8 {
        match self {
            CheckStatus::Ok => 0,
            CheckStatus::Critical => 2,
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CheckStatus::Ok => write!(f, "OK"),
            CheckStatus::Critical => write!(f, "CRIT"),
        }
    }
}

/// Final outcome of the check, printed as `<STATUS>: <message>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckResult {
    pub status: CheckStatus,
    pub message: String,
}

impl CheckResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Ok,
            message: message.into(),
        }
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Critical,
            message: message.into(),
        }
    }

    /// Reports a command line that clap could not parse.
    ///
    /// Only the first line of clap's message is kept, without its `error:`
    /// prefix, so the output stays a single line.
    pub fn from_parse_error(err: &clap::Error) -> Self {
        let rendered = err.to_string();
        let first_line = rendered.lines().next().unwrap_or_default();
        let reason = first_line.trim_start_matches("error:").trim();
        Self::critical(format!("Invalid arguments: {}", reason))
    }

    pub fn exit_code(&self) -> u8 {
        self.status.exit_code()
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

/// Any failure of the check.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error("Invalid arguments: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Invalid --digest-key: {0}")]
    Key(#[from] HmacError),

    #[error(transparent)]
    KeyFile(#[from] KeyFileError),

    #[error(transparent)]
    Probe(#[from] ProbeError),
}

/// Loads the HMAC key from `--digest-key` or `--tls-auth`, if either is set.
pub fn load_hmac_key(
    conf: &Configuration,
    digest: DigestSpec,
) -> Result<Option<HmacKey>, CheckError> {
    if let Some(ref hex_key) = conf.digest_key {
        let key = HmacKey::from_hex(hex_key)?;
        log::info!("Using {} byte HMAC key from command line", key.len());
        return Ok(Some(key));
    }

    if let Some(ref path) = conf.tls_auth {
        let key = HmacKey::from_tls_auth_file(path, digest)?;
        log::info!(
            "Using {} byte HMAC key from {}",
            key.len(),
            path.display()
        );
        return Ok(Some(key));
    }

    Ok(None)
}

/// Validates the configuration, sends one probe and waits for the reply.
///
/// Arguments and key material are checked before any socket is opened.
pub async fn check(conf: &Configuration) -> Result<ProbeReply, CheckError> {
    conf.validate()?;

    let digest = conf.digest_spec()?;
    let key = load_hmac_key(conf, digest)?;
    if key.is_some() {
        log::info!("HMAC authentication enabled ({})", digest.algorithm);
    }

    let transport = conf.transport();
    let limit = conf.timeout_duration();
    let packet = packets::build(transport.is_stream(), key.as_ref(), digest);

    let addr = probe::resolve(&conf.host, conf.port, limit).await?;
    let reply = probe::probe(transport, addr, &packet, limit).await?;

    Ok(reply)
}

/// Runs the check and reports the outcome. Never fails.
pub async fn run_check(conf: &Configuration) -> CheckResult {
    match check(conf).await {
        Ok(reply) => CheckResult::ok(describe_reply(&reply, conf.transport())),
        Err(e) => {
            log::warn!("Check failed: {}", e);
            CheckResult::critical(e.to_string())
        }
    }
}

fn describe_reply(reply: &ProbeReply, transport: Transport) -> String {
    let what = match reply.opcode(transport) {
        Some(opcode) => opcode.name().to_string(),
        None => format!("{} bytes", reply.data.len()),
    };
    format!(
        "OpenVPN server {}/{} responded with {} in {} ms",
        reply.peer,
        transport,
        what,
        reply.elapsed.as_millis()
    )
}
