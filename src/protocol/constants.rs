// SRTLA protocol type constants
pub const SRTLA_TYPE_KEEPALIVE: u16 = 0x9000;
pub const SRTLA_TYPE_ACK: u16 = 0x9100;
pub const SRTLA_TYPE_REG1: u16 = 0x9200;
pub const SRTLA_TYPE_REG2: u16 = 0x9201;
pub const SRTLA_TYPE_REG3: u16 = 0x9202;
pub const SRTLA_TYPE_REG_ERR: u16 = 0x9210;
pub const SRTLA_TYPE_REG_NGP: u16 = 0x9211;

// SRT protocol constants
pub const SRT_TYPE_HANDSHAKE: u16 = 0x8000;
pub const SRT_TYPE_ACK: u16 = 0x8002;

// Group id: 256 bits, sender-chosen half followed by receiver-chosen half
pub const SRTLA_ID_LEN: usize = 32;
pub const SRTLA_ID_HALF: usize = SRTLA_ID_LEN / 2;

// Packet size constants
pub const SRTLA_TYPE_REG1_LEN: usize = 2 + SRTLA_ID_LEN;
pub const SRTLA_TYPE_REG2_LEN: usize = 2 + SRTLA_ID_LEN;
#[allow(dead_code)]
pub const SRTLA_TYPE_REG3_LEN: usize = 2;

/// Smallest valid SRT packet: the fixed SRT header
pub const SRT_MIN_LEN: usize = 16;

pub const MTU: usize = 1500;

// Registry limits
pub const MAX_CONNS_PER_GROUP: usize = 16;
pub const MAX_GROUPS: usize = 200;

// Timeout constants (seconds)
pub const CONN_TIMEOUT: u64 = 10;
pub const GROUP_TIMEOUT: u64 = 10;
pub const CLEANUP_PERIOD: u64 = 3;

/// A batched SRTLA ACK is emitted every this many received SRT data packets
pub const RECV_ACK_INT: usize = 10;

/// Wire size of a batched SRTLA ACK: 4-byte header + RECV_ACK_INT sequence numbers
pub const SRTLA_ACK_LEN: usize = 4 + 4 * RECV_ACK_INT;

/// SRT handshake induction packet (fixed header + handshake payload)
pub const SRT_HANDSHAKE_LEN: usize = 64;
