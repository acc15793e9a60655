//! Native ICMP echo probe
//!
//! Uses blocking sockets inside `spawn_blocking` so the measured time is not
//! skewed by the async scheduler. A RAW socket is tried first and an
//! unprivileged DGRAM socket second.

use std::io::Read;
use std::net::{IpAddr, SocketAddr};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::info;

use super::ProbeError;

const ECHO_REQUEST_V4: u8 = 8;
const ECHO_REPLY_V4: u8 = 0;
const ECHO_REQUEST_V6: u8 = 128;
const ECHO_REPLY_V6: u8 = 129;

const PACKET_LEN: usize = 64;

static ICMP_AVAILABLE: OnceLock<bool> = OnceLock::new();
static SEQUENCE: AtomicU16 = AtomicU16::new(0);

/// Whether this process may open an ICMP socket
///
/// Detected once and cached for the lifetime of the process.
pub fn is_available() -> bool {
    *ICMP_AVAILABLE.get_or_init(|| {
        if Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).is_ok() {
            info!("ICMP probes enabled (raw socket)");
            true
        } else if Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4)).is_ok() {
            info!("ICMP probes enabled (datagram socket)");
            true
        } else {
            info!("ICMP sockets unavailable, falling back to TCP probes");
            false
        }
    })
}

/// Send one echo request to `host` and return the round trip in milliseconds
pub async fn ping(host: &str, timeout: Duration) -> Result<f64, ProbeError> {
    let ip = resolve(host).await?;

    tokio::task::spawn_blocking(move || echo(ip, timeout))
        .await
        .map_err(|e| ProbeError::Network(format!("ping task failed: {}", e)))?
}

async fn resolve(host: &str) -> Result<IpAddr, ProbeError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| ProbeError::Network(format!("DNS resolution failed: {}", e)))?
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| ProbeError::Network(format!("no addresses found for {}", host)))
}

fn open_socket(ip: &IpAddr) -> std::io::Result<Socket> {
    let (domain, protocol) = match ip {
        IpAddr::V4(_) => (Domain::IPV4, Protocol::ICMPV4),
        IpAddr::V6(_) => (Domain::IPV6, Protocol::ICMPV6),
    };
    Socket::new(domain, Type::RAW, Some(protocol))
        .or_else(|_| Socket::new(domain, Type::DGRAM, Some(protocol)))
}

fn echo(ip: IpAddr, timeout: Duration) -> Result<f64, ProbeError> {
    let mut socket = open_socket(&ip)
        .map_err(|e| ProbeError::Network(format!("failed to open ICMP socket: {}", e)))?;
    socket
        .set_read_timeout(Some(timeout))
        .map_err(|e| ProbeError::Network(e.to_string()))?;
    socket
        .connect(&SocketAddr::new(ip, 0).into())
        .map_err(|e| ProbeError::Network(format!("failed to connect: {}", e)))?;

    let identifier: u16 = rand::random();
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let (request, reply) = match ip {
        IpAddr::V4(_) => (ECHO_REQUEST_V4, ECHO_REPLY_V4),
        IpAddr::V6(_) => (ECHO_REQUEST_V6, ECHO_REPLY_V6),
    };
    let packet = build_echo_request(request, identifier, sequence);

    let start = Instant::now();
    socket
        .send(&packet)
        .map_err(|e| ProbeError::Network(format!("failed to send: {}", e)))?;

    let mut buf = [0u8; 1500];
    loop {
        let len = socket.read(&mut buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                ProbeError::Timeout(timeout)
            }
            _ => ProbeError::Network(format!("failed to receive: {}", e)),
        })?;
        let elapsed = start.elapsed();

        if elapsed >= timeout {
            return Err(ProbeError::Timeout(timeout));
        }

        if is_matching_reply(&buf[..len], reply, identifier, sequence) {
            return Ok(elapsed.as_secs_f64() * 1000.0);
        }
    }
}

/// Check a received datagram against the request we sent
///
/// Raw IPv4 sockets deliver the IP header in front of the ICMP message; it is
/// skipped when present. Datagram sockets may rewrite the identifier, so only
/// the sequence number is compared when the identifier differs.
fn is_matching_reply(data: &[u8], reply_type: u8, identifier: u16, sequence: u16) -> bool {
    let offset = if reply_type == ECHO_REPLY_V4 && data.first().is_some_and(|b| b >> 4 == 4) {
        usize::from(data[0] & 0x0f) * 4
    } else {
        0
    };

    let Some(icmp) = data.get(offset..offset + 8) else {
        return false;
    };

    let got_id = u16::from_be_bytes([icmp[4], icmp[5]]);
    let got_seq = u16::from_be_bytes([icmp[6], icmp[7]]);

    icmp[0] == reply_type && got_seq == sequence && (got_id == identifier || offset == 0)
}

fn build_echo_request(kind: u8, identifier: u16, sequence: u16) -> Vec<u8> {
    let mut packet = vec![0u8; PACKET_LEN];
    packet[0] = kind;
    packet[4..6].copy_from_slice(&identifier.to_be_bytes());
    packet[6..8].copy_from_slice(&sequence.to_be_bytes());

    // The kernel fills in the ICMPv6 checksum
    if kind == ECHO_REQUEST_V4 {
        let checksum = checksum(&packet);
        packet[2..4].copy_from_slice(&checksum.to_be_bytes());
    }

    packet
}

/// Internet checksum (RFC 1071)
fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = data
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u32::from(u16::from_be_bytes([*hi, *lo])),
            [hi] => u32::from(*hi) << 8,
            _ => 0,
        })
        .sum();

    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    !(sum as u16)
}
