//! Sends the probe packet and waits for a single reply.
//!
//! Each blocking step (resolve, connect, send, receive) is bounded by the
//! same timeout. There are no retries; the first failure ends the probe.

use std::{
    fmt,
    future::Future,
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    time::{Duration, Instant},
};

use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{lookup_host, TcpSocket, UdpSocket},
    time::timeout,
};

use crate::packets::{Opcode, STREAM_LENGTH_PREFIX};

const RECV_BUF_SIZE: usize = 2048;

/// Transport used to reach the server.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
}

impl Transport {
    /// Whether packets need the 2-byte length prefix.
    pub fn is_stream(&self) -> bool {
        matches!(self, Transport::Tcp)
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Transport::Udp => write!(f, "udp"),
            Transport::Tcp => write!(f, "tcp"),
        }
    }
}

/// Failures of the probe, one per stage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Cannot resolve {host}: {reason}")]
    Resolve { host: String, reason: String },

    #[error("No address found for {0}")]
    NoAddress(String),

    #[error("Cannot create socket: {0}")]
    SocketCreation(String),

    #[error("Cannot connect to {addr}: {reason}")]
    Connect { addr: SocketAddr, reason: String },

    #[error("Cannot send probe: {0}")]
    Send(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("Connection closed without response")]
    EmptyReply,
}

/// Short description of an I/O error without OS error codes.
fn describe(e: &io::Error) -> String {
    e.kind().to_string()
}

/// Reply received from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReply {
    pub peer: SocketAddr,
    pub data: Vec<u8>,
    pub elapsed: Duration,
}

impl ProbeReply {
    /// Opcode of the reply, if its first packet byte is a known one.
    ///
    /// TCP replies are skipped past their length prefix when long enough.
    pub fn opcode(&self, transport: Transport) -> Option<Opcode> {
        let type_byte = if transport.is_stream() {
            self.data.get(STREAM_LENGTH_PREFIX)
        } else {
            self.data.first()
        };
        type_byte.copied().and_then(Opcode::from_type_byte)
    }
}

/// Resolves `host:port`, keeping the first address (IPv4 or IPv6).
pub async fn resolve(host: &str, port: u16, limit: Duration) -> Result<SocketAddr, ProbeError> {
    first_address(host, lookup_host((host, port)), limit).await
}

async fn first_address<F, I>(
    host: &str,
    lookup: F,
    limit: Duration,
) -> Result<SocketAddr, ProbeError>
where
    F: Future<Output = io::Result<I>>,
    I: Iterator<Item = SocketAddr>,
{
    let resolve_error = |reason: String| ProbeError::Resolve {
        host: host.to_string(),
        reason,
    };

    let mut addrs = timeout(limit, lookup)
        .await
        .map_err(|_| resolve_error("timed out".to_string()))?
        .map_err(|e| resolve_error(describe(&e)))?;

    let addr = addrs
        .next()
        .ok_or_else(|| ProbeError::NoAddress(host.to_string()))?;
    log::debug!("Resolved {} to {}", host, addr);
    Ok(addr)
}

/// Sends `packet` to `addr` and waits for one reply.
pub async fn probe(
    transport: Transport,
    addr: SocketAddr,
    packet: &[u8],
    limit: Duration,
) -> Result<ProbeReply, ProbeError> {
    log::info!("Probing {}/{} with {} bytes", addr, transport, packet.len());
    match transport {
        Transport::Udp => probe_udp(addr, packet, limit).await,
        Transport::Tcp => probe_tcp(addr, packet, limit).await,
    }
}

async fn probe_udp(
    addr: SocketAddr,
    packet: &[u8],
    limit: Duration,
) -> Result<ProbeReply, ProbeError> {
    let local_addr: SocketAddr = if addr.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };

    let socket = UdpSocket::bind(local_addr)
        .await
        .map_err(|e| ProbeError::SocketCreation(describe(&e)))?;

    socket.connect(addr).await.map_err(|e| ProbeError::Connect {
        addr,
        reason: describe(&e),
    })?;

    let start = Instant::now();
    timeout(limit, socket.send(packet))
        .await
        .map_err(|_| ProbeError::Timeout(limit))?
        .map_err(|e| ProbeError::Send(describe(&e)))?;

    let mut recv_buf = [0u8; RECV_BUF_SIZE];
    let len = timeout(limit, socket.recv(&mut recv_buf))
        .await
        .map_err(|_| ProbeError::Timeout(limit))?
        .map_err(|e| ProbeError::Receive(describe(&e)))?;

    log::debug!("Received {} bytes from {}", len, addr);
    Ok(ProbeReply {
        peer: addr,
        data: recv_buf[..len].to_vec(),
        elapsed: start.elapsed(),
    })
}

async fn probe_tcp(
    addr: SocketAddr,
    packet: &[u8],
    limit: Duration,
) -> Result<ProbeReply, ProbeError> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(|e| ProbeError::SocketCreation(describe(&e)))?;

    let start = Instant::now();
    let mut stream = timeout(limit, socket.connect(addr))
        .await
        .map_err(|_| ProbeError::Timeout(limit))?
        .map_err(|e| ProbeError::Connect {
            addr,
            reason: describe(&e),
        })?;

    timeout(limit, stream.write_all(packet))
        .await
        .map_err(|_| ProbeError::Timeout(limit))?
        .map_err(|e| ProbeError::Send(describe(&e)))?;

    let mut recv_buf = [0u8; RECV_BUF_SIZE];
    let len = timeout(limit, stream.read(&mut recv_buf))
        .await
        .map_err(|_| ProbeError::Timeout(limit))?
        .map_err(|e| ProbeError::Receive(describe(&e)))?;

    if len == 0 {
        return Err(ProbeError::EmptyReply);
    }

    log::debug!("Received {} bytes from {}", len, addr);
    Ok(ProbeReply {
        peer: addr,
        data: recv_buf[..len].to_vec(),
        elapsed: start.elapsed(),
    })
}
