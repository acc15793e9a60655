//! TCP connect probe

use std::time::{Duration, Instant};

use tokio::net::TcpStream;

use super::ProbeError;

/// Time a TCP handshake with `host:port`, in milliseconds
///
/// A refused connection still proves the host answered, but it is reported
/// as a failure so that closed ports do not look healthy.
pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<f64, ProbeError> {
    let start = Instant::now();

    let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| ProbeError::Timeout(timeout))?
        .map_err(|e| ProbeError::Network(format!("connect to {}:{} failed: {}", host, port, e)))?;

    let elapsed = start.elapsed();
    drop(stream);

    Ok(elapsed.as_secs_f64() * 1000.0)
}
