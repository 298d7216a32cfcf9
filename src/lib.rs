//! OpenVPN probe - checks that an OpenVPN server answers on UDP or TCP.
//!
//! The probe sends a single `P_CONTROL_HARD_RESET_CLIENT_V2` packet,
//! optionally signed with a tls-auth HMAC, and waits for any reply. It is
//! meant to run as a monitoring plugin printing one status line.
//!
//! # Usage
//!
//! Plain UDP check:
//! ```bash
//! check_openvpn vpn.example.com
//! ```
//!
//! TCP check with a tls-auth key:
//! ```bash
//! check_openvpn -t -p 443 --digest sha256 --tls-auth /etc/openvpn/ta.key vpn.example.com
//! ```

/// Probe orchestration and status reporting.
pub mod check;
/// Command-line configuration and validation.
pub mod configuration;
/// HMAC key handling.
pub mod crypto;
/// Digest algorithm lookup and HMAC computation.
pub mod digest;
/// OpenVPN static key file parsing.
pub mod key_file;
/// Probe packet structure and serialization.
pub mod packets;
/// UDP and TCP transport for the probe.
pub mod probe;
/// Session id generation.
pub mod session;
/// Timestamp generation utilities.
pub mod time;
