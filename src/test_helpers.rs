#![cfg(any(test, feature = "test-internals"))]
#![allow(dead_code)] // Allow unused helpers - they're used by library tests but not binary tests

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Duration, timeout};

use crate::group::{ConnGroup, SrtlaConn};
use crate::protocol::*;
use crate::receiver::{ReceiverCtx, UpstreamPacket, create_upstream_channel};

/// Synthetic wall-clock base for unit tests that drive timers by hand
pub const TEST_NOW: u64 = 10_000;

pub fn test_addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

pub fn make_conn(port: u16, last_rcvd: u64) -> SrtlaConn {
    SrtlaConn::new(test_addr(port), last_rcvd)
}

/// A detached group with members on the given ports, all fresh at `now`.
pub fn make_group(group_id: u64, member_ports: &[u16], now: u64) -> ConnGroup {
    let mut id = [0u8; SRTLA_ID_LEN];
    id[..8].copy_from_slice(&group_id.to_be_bytes());
    ConnGroup {
        group_id,
        id,
        created_at: now,
        last_addr: test_addr(member_ports.first().copied().unwrap_or(1)),
        conns: member_ports.iter().map(|&p| make_conn(p, now)).collect(),
        upstream: None,
    }
}

/// Bind a loopback UDP socket standing in for one sender link (or for the
/// downstream SRT server).
pub async fn bind_peer() -> (UdpSocket, SocketAddr) {
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = sock.local_addr().unwrap();
    (sock, addr)
}

/// A receiver context with a loopback listener, pointed at `srt_addr`.
pub async fn make_ctx(srt_addr: SocketAddr) -> (ReceiverCtx, UnboundedReceiver<UpstreamPacket>) {
    let listener = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
    let (tx, rx) = create_upstream_channel();
    (ReceiverCtx::new(listener, srt_addr, tx), rx)
}

/// Receive one datagram with a short timeout; None when nothing arrives.
pub async fn recv_timeout(sock: &UdpSocket) -> Option<Vec<u8>> {
    let mut buf = vec![0u8; MTU];
    match timeout(Duration::from_millis(500), sock.recv_from(&mut buf)).await {
        Ok(Ok((n, _))) => Some(buf[..n].to_vec()),
        _ => None,
    }
}

/// Like [`recv_timeout`], but also reports the source address.
pub async fn recv_from_timeout(sock: &UdpSocket) -> Option<(Vec<u8>, SocketAddr)> {
    let mut buf = vec![0u8; MTU];
    match timeout(Duration::from_millis(500), sock.recv_from(&mut buf)).await {
        Ok(Ok((n, from))) => Some((buf[..n].to_vec(), from)),
        _ => None,
    }
}

/// Drain every datagram already queued on `sock`, returning them in order.
pub async fn drain_packets(sock: &UdpSocket) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; MTU];
    while let Ok(Ok((n, _))) = timeout(Duration::from_millis(100), sock.recv_from(&mut buf)).await {
        out.push(buf[..n].to_vec());
    }
    out
}

pub fn reg1_packet(sender_half: &[u8; SRTLA_ID_HALF]) -> Vec<u8> {
    let mut pkt = vec![0u8; SRTLA_TYPE_REG1_LEN];
    pkt[0..2].copy_from_slice(&SRTLA_TYPE_REG1.to_be_bytes());
    pkt[2..2 + SRTLA_ID_HALF].copy_from_slice(sender_half);
    pkt
}

pub fn reg2_packet(id: &[u8; SRTLA_ID_LEN]) -> Vec<u8> {
    let mut pkt = vec![0u8; SRTLA_TYPE_REG2_LEN];
    pkt[0..2].copy_from_slice(&SRTLA_TYPE_REG2.to_be_bytes());
    pkt[2..].copy_from_slice(id);
    pkt
}

/// An SRT data packet of `len` bytes carrying sequence number `seq`.
pub fn srt_data_packet(seq: u32, len: usize) -> Vec<u8> {
    assert!(len >= SRT_MIN_LEN);
    let mut pkt = vec![0u8; len];
    pkt[0..4].copy_from_slice(&(seq & 0x7fff_ffff).to_be_bytes());
    pkt
}

/// An SRT ACK control packet of `len` bytes.
pub fn srt_ack_packet(len: usize) -> Vec<u8> {
    assert!(len >= SRT_MIN_LEN);
    let mut pkt = vec![0u8; len];
    pkt[0..2].copy_from_slice(&SRT_TYPE_ACK.to_be_bytes());
    pkt
}

/// A sender-style keepalive with a timestamp payload.
pub fn keepalive_with_timestamp(ts: u64) -> Vec<u8> {
    let mut pkt = vec![0u8; 10];
    pkt[0..2].copy_from_slice(&SRTLA_TYPE_KEEPALIVE.to_be_bytes());
    pkt[2..10].copy_from_slice(&ts.to_be_bytes());
    pkt
}
