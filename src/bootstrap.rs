//! Startup resolution of the downstream SRT listener address.
//!
//! SRT is connection-oriented and will not reply to arbitrary datagrams,
//! so each resolved address is probed with a handshake induction packet.
//! A resolved-but-silent server is non-fatal; the relay proceeds with the
//! first resolved address.

use std::net::SocketAddr;

use anyhow::{Context, Result, anyhow};
use tokio::net::{UdpSocket, lookup_host};
use tokio::time::{Duration, timeout};
use tracing::{info, warn};

use crate::protocol::{MTU, SRT_HANDSHAKE_LEN, create_srt_handshake_induction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrtReachability {
    /// The server answered the handshake induction probe
    Reachable,
    /// The address resolved but no handshake reply arrived within 1 s
    Unreachable,
}

/// Resolve the SRT listener and probe each candidate address.
///
/// Returns the first address that answered the handshake probe, or the
/// first resolved address with [`SrtReachability::Unreachable`] when none
/// did. Resolution yielding no usable IPv4 address is an error.
pub async fn resolve_srt_addr(host: &str, port: u16) -> Result<(SocketAddr, SrtReachability)> {
    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .with_context(|| format!("failed to resolve the address: {host}:{port}"))?
        .filter(|a| a.is_ipv4())
        .collect();
    let first = *addrs
        .first()
        .ok_or_else(|| anyhow!("no IPv4 address for {host}:{port}"))?;

    let probe = UdpSocket::bind("0.0.0.0:0")
        .await
        .context("failed to create a UDP probe socket")?;
    let induction = create_srt_handshake_induction();
    let mut buf = [0u8; MTU];

    for addr in &addrs {
        info!("trying to connect to SRT at {}...", addr);
        if probe.connect(addr).await.is_err() {
            continue;
        }
        if !matches!(probe.send(&induction).await, Ok(n) if n == induction.len()) {
            continue;
        }
        match timeout(Duration::from_secs(1), probe.recv(&mut buf)).await {
            Ok(Ok(n)) if n == SRT_HANDSHAKE_LEN => {
                info!("SRT server reachable at {}", addr);
                return Ok((*addr, SrtReachability::Reachable));
            }
            _ => info!("no handshake reply from {}", addr),
        }
    }

    warn!(
        "failed to confirm that an SRT server is reachable at any address; proceeding with {}",
        first
    );
    Ok((first, SrtReachability::Unreachable))
}
