use super::constants::*;

/// The closed set of packet kinds this receiver distinguishes.
///
/// SRTLA control packets occupy the `0x9xxx` type space; everything else is
/// SRT traffic, split by the high bit of the first 32-bit word into control
/// and data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Reg1,
    Reg2,
    Reg3,
    RegErr,
    RegNgp,
    Keepalive,
    SrtlaAck,
    SrtAck,
    SrtControl,
    SrtData,
}

#[inline]
pub fn get_packet_type(buf: &[u8]) -> Option<u16> {
    if buf.len() < 2 {
        return None;
    }
    Some(u16::from_be_bytes([buf[0], buf[1]]))
}

/// Classify a datagram. REG1/REG2 only classify at their exact wire length;
/// a mis-sized packet in their type space falls through to SRT control,
/// which the relay treats as opaque payload.
pub fn classify(buf: &[u8]) -> Option<PacketKind> {
    let packet_type = get_packet_type(buf)?;
    let kind = match packet_type {
        SRTLA_TYPE_REG1 if buf.len() == SRTLA_TYPE_REG1_LEN => PacketKind::Reg1,
        SRTLA_TYPE_REG2 if buf.len() == SRTLA_TYPE_REG2_LEN => PacketKind::Reg2,
        SRTLA_TYPE_REG3 => PacketKind::Reg3,
        SRTLA_TYPE_REG_ERR => PacketKind::RegErr,
        SRTLA_TYPE_REG_NGP => PacketKind::RegNgp,
        SRTLA_TYPE_KEEPALIVE => PacketKind::Keepalive,
        SRTLA_TYPE_ACK => PacketKind::SrtlaAck,
        SRT_TYPE_ACK => PacketKind::SrtAck,
        t if t & 0x8000 != 0 => PacketKind::SrtControl,
        _ => PacketKind::SrtData,
    };
    Some(kind)
}

/// Predicate forms of [`classify`] (used in tests)
#[allow(dead_code)]
#[inline]
pub fn is_srtla_reg1(buf: &[u8]) -> bool {
    classify(buf) == Some(PacketKind::Reg1)
}

#[allow(dead_code)]
#[inline]
pub fn is_srtla_reg2(buf: &[u8]) -> bool {
    classify(buf) == Some(PacketKind::Reg2)
}

#[inline]
pub fn is_srtla_keepalive(buf: &[u8]) -> bool {
    get_packet_type(buf) == Some(SRTLA_TYPE_KEEPALIVE)
}

#[inline]
pub fn is_srt_ack(buf: &[u8]) -> bool {
    get_packet_type(buf) == Some(SRT_TYPE_ACK)
}
