//! Connection groups and their registry.
//!
//! A group is one aggregated SRTLA session: the 256-bit id negotiated at
//! registration, the member connections (one per sender link), and the
//! lazily-created upstream socket toward the SRT listener. The registry
//! owns all groups; a group owns its connections and upstream link.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use rand::RngCore;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::protocol::*;
use crate::utils::const_time_eq;

/// Stable process-unique handle for a group. The upstream packet channel
/// carries this instead of a reference; once a group is destroyed, lookups
/// by handle simply miss.
pub type GroupId = u64;

/// The connected socket toward the SRT listener, plus the reader task that
/// feeds its datagrams back into the event loop.
pub struct UpstreamLink {
    pub socket: Arc<UdpSocket>,
    pub local_port: u16,
    reader: JoinHandle<()>,
}

impl UpstreamLink {
    pub fn new(socket: Arc<UdpSocket>, local_port: u16, reader: JoinHandle<()>) -> Self {
        Self {
            socket,
            local_port,
            reader,
        }
    }
}

impl Drop for UpstreamLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// One sender link inside a group, identified by its remote UDP address.
pub struct SrtlaConn {
    pub addr: SocketAddr,
    /// Wall-clock seconds of the last packet received from this link
    pub last_rcvd: u64,
    /// Ring of the most recent SRT data sequence numbers, flushed as one
    /// SRTLA ACK when full
    pub recv_log: [u32; RECV_ACK_INT],
    pub recv_idx: usize,

    // Link-selection telemetry
    /// Cumulative bytes sent toward this link, halved on every decay tick
    pub bytes_sent: u64,
    pub bytes_this_period: u64,
    pub max_bytes_per_period: u64,
    pub last_capacity_update: u64,
    pub recovery_attempts: u32,
    /// Wall-clock of the first unacknowledged health issue; 0 when healthy
    pub health_status: u64,
    pub successive_failures: u32,
}

impl SrtlaConn {
    pub fn new(addr: SocketAddr, now: u64) -> Self {
        Self {
            addr,
            last_rcvd: now,
            recv_log: [0u32; RECV_ACK_INT],
            recv_idx: 0,
            bytes_sent: 0,
            bytes_this_period: 0,
            max_bytes_per_period: 0,
            last_capacity_update: now,
            recovery_attempts: 0,
            health_status: 0,
            successive_failures: 0,
        }
    }

    /// Record one received SRT data sequence number. Returns the full batch
    /// when the ring wraps, at which point the caller emits one SRTLA ACK.
    pub fn record_sequence(&mut self, sn: u32) -> Option<[u32; RECV_ACK_INT]> {
        self.recv_log[self.recv_idx] = sn;
        self.recv_idx += 1;
        if self.recv_idx == RECV_ACK_INT {
            self.recv_idx = 0;
            return Some(self.recv_log);
        }
        None
    }

    /// Charge a successful downstream send against this link's telemetry
    pub fn charge_sent_bytes(&mut self, n: usize) {
        self.bytes_sent += n as u64;
        self.bytes_this_period += n as u64;
    }

    pub fn is_active(&self, now: u64) -> bool {
        self.last_rcvd + CONN_TIMEOUT >= now && self.successive_failures < 3
    }
}

/// One aggregated SRTLA session.
pub struct ConnGroup {
    pub group_id: GroupId,
    pub id: [u8; SRTLA_ID_LEN],
    pub created_at: u64,
    /// The most recently active peer; last-resort reply destination
    pub last_addr: SocketAddr,
    pub conns: Vec<SrtlaConn>,
    pub upstream: Option<UpstreamLink>,
}

impl ConnGroup {
    /// Build a group id from the sender-chosen half, generating the
    /// receiver half from a CSPRNG.
    fn generate_id(sender_half: &[u8]) -> [u8; SRTLA_ID_LEN] {
        let mut id = [0u8; SRTLA_ID_LEN];
        id[..SRTLA_ID_HALF].copy_from_slice(&sender_half[..SRTLA_ID_HALF]);
        rand::rng().fill_bytes(&mut id[SRTLA_ID_HALF..]);
        id
    }

    pub fn find_conn(&self, addr: SocketAddr) -> Option<usize> {
        self.conns.iter().position(|c| c.addr == addr)
    }

    pub fn client_addresses(&self) -> Vec<IpAddr> {
        self.conns.iter().map(|c| c.addr.ip()).collect()
    }
}

/// Process-wide set of live groups, owned by the event loop.
#[derive(Default)]
pub struct GroupRegistry {
    groups: Vec<ConnGroup>,
    next_group_id: GroupId,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.groups.len() >= MAX_GROUPS
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConnGroup> {
        self.groups.iter()
    }

    /// Create a detached group for a REG1. The caller inserts it only after
    /// the REG2 reply went out.
    pub fn create_group(&mut self, sender_half: &[u8], last_addr: SocketAddr, now: u64) -> ConnGroup {
        let group_id = self.next_group_id;
        self.next_group_id += 1;
        ConnGroup {
            group_id,
            id: ConnGroup::generate_id(sender_half),
            created_at: now,
            last_addr,
            conns: Vec::new(),
            upstream: None,
        }
    }

    pub fn insert_group(&mut self, group: ConnGroup) {
        self.groups.push(group);
    }

    /// Remove a group by handle, returning it so the caller can run the
    /// teardown side effects (socket-info file removal). The upstream
    /// reader task is aborted when the returned group is dropped.
    pub fn remove_group(&mut self, group_id: GroupId) -> Option<ConnGroup> {
        let idx = self.groups.iter().position(|g| g.group_id == group_id)?;
        Some(self.groups.remove(idx))
    }

    pub fn group_by_handle(&mut self, group_id: GroupId) -> Option<&mut ConnGroup> {
        self.groups.iter_mut().find(|g| g.group_id == group_id)
    }

    /// Look up a group by its full 256-bit id. The comparison is constant
    /// time over the id length for every candidate group.
    pub fn find_group_by_id(&self, id: &[u8]) -> Option<&ConnGroup> {
        self.groups.iter().find(|g| const_time_eq(&g.id, id))
    }

    /// Resolve a remote address to its owning group and member connection.
    ///
    /// A member match wins; an address matching only a group's `last_addr`
    /// (the in-flight first-connection case) yields the group alone.
    /// Addresses compare as full (ip, port) pairs.
    pub fn find_by_addr(&self, addr: SocketAddr) -> (Option<GroupId>, Option<usize>) {
        for group in &self.groups {
            if let Some(ci) = group.find_conn(addr) {
                return (Some(group.group_id), Some(ci));
            }
            if group.last_addr == addr {
                return (Some(group.group_id), None);
            }
        }
        (None, None)
    }
}
