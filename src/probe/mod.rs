//! Latency measurement
//!
//! A target address is probed with a single ICMP echo when the process is
//! allowed to open an ICMP socket, or with a TCP connect otherwise. Addresses
//! carrying an explicit port always use TCP.

pub mod icmp;
pub mod tcp;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::targets::{PROBE_TIMEOUT_SECS, Target};

/// Port used for the TCP fallback when the address has none
pub const DEFAULT_TCP_PORT: u16 = 80;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid target address: {0}")]
    Address(String),
}

/// Measures the round-trip latency of one target
///
/// Implementations return the latency in milliseconds.
#[async_trait]
pub trait Prober: Send + Sync + 'static {
    async fn probe(&self, target: &Target) -> Result<f64, ProbeError>;
}

/// How an address will be probed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeMethod {
    Icmp { host: String },
    Tcp { host: String, port: u16 },
}

impl ProbeMethod {
    /// Pick the probe method for `address`
    ///
    /// `host:port` and `[v6]:port` select TCP. A bare host selects ICMP when
    /// available and TCP to port 80 otherwise.
    pub fn for_address(address: &str, icmp_available: bool) -> Result<Self, ProbeError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(ProbeError::Address("empty address".to_string()));
        }

        if let Some((host, port)) = split_host_port(address) {
            let port = port
                .parse::<u16>()
                .map_err(|_| ProbeError::Address(format!("bad port in '{}'", address)))?;
            return Ok(ProbeMethod::Tcp {
                host: host.to_string(),
                port,
            });
        }

        let host = address.trim_start_matches('[').trim_end_matches(']').to_string();
        if icmp_available {
            Ok(ProbeMethod::Icmp { host })
        } else {
            Ok(ProbeMethod::Tcp {
                host,
                port: DEFAULT_TCP_PORT,
            })
        }
    }
}

fn split_host_port(address: &str) -> Option<(&str, &str)> {
    if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        return tail.strip_prefix(':').map(|port| (host, port));
    }

    // More than one colon is a bare IPv6 address
    match address.matches(':').count() {
        1 => address.split_once(':'),
        _ => None,
    }
}

/// The real network prober
#[derive(Debug, Clone)]
pub struct NetProber {
    timeout: Duration,
    icmp_available: bool,
}

impl NetProber {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(PROBE_TIMEOUT_SECS),
            icmp_available: icmp::is_available(),
        }
    }

    /// Prober that never uses ICMP
    pub fn tcp_only(timeout: Duration) -> Self {
        Self {
            timeout,
            icmp_available: false,
        }
    }
}

impl Default for NetProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for NetProber {
    async fn probe(&self, target: &Target) -> Result<f64, ProbeError> {
        let method = ProbeMethod::for_address(&target.address, self.icmp_available)?;

        let attempt = async {
            match &method {
                ProbeMethod::Icmp { host } => icmp::ping(host, self.timeout).await,
                ProbeMethod::Tcp { host, port } => tcp::connect(host, *port, self.timeout).await,
            }
        };

        // Outer bound so DNS resolution counts against the timeout too
        tokio::time::timeout(self.timeout, attempt)
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))?
    }
}
