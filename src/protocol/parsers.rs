use smallvec::SmallVec;

use super::constants::*;
use super::types::get_packet_type;

/// Extract the sequence number of an SRT data packet: the low 31 bits of
/// the first big-endian word. Returns None for control packets (high bit
/// set) and short buffers.
#[inline]
pub fn get_srt_sequence_number(buf: &[u8]) -> Option<u32> {
    if buf.len() < 4 {
        return None;
    }
    let sn = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if (sn & 0x8000_0000) == 0 { Some(sn) } else { None }
}

/// Parse the sequence numbers out of a batched SRTLA ACK.
///
/// The header is 4 bytes (type + padding); sequence numbers follow as
/// big-endian u32s. The receiver only emits these; parsing is for
/// verification in tests.
#[allow(dead_code)]
#[inline]
pub fn parse_srtla_ack(buf: &[u8]) -> SmallVec<u32, 16> {
    if buf.len() < 8 {
        return SmallVec::new();
    }
    if get_packet_type(buf) != Some(SRTLA_TYPE_ACK) {
        return SmallVec::new();
    }
    let mut out = SmallVec::new();
    let mut i = 4usize;
    while i + 3 < buf.len() {
        out.push(u32::from_be_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]));
        i += 4;
    }
    out
}
