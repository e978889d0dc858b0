use super::constants::*;

/// REG2 reply: echoes the full group id (sender half || receiver half)
pub fn create_reg2_packet(id: &[u8; SRTLA_ID_LEN]) -> [u8; SRTLA_TYPE_REG2_LEN] {
    let mut pkt = [0u8; SRTLA_TYPE_REG2_LEN];
    pkt[0..2].copy_from_slice(&SRTLA_TYPE_REG2.to_be_bytes());
    pkt[2..].copy_from_slice(id);
    pkt
}

pub fn create_reg3_packet() -> [u8; 2] {
    SRTLA_TYPE_REG3.to_be_bytes()
}

pub fn create_reg_err_packet() -> [u8; 2] {
    SRTLA_TYPE_REG_ERR.to_be_bytes()
}

pub fn create_reg_ngp_packet() -> [u8; 2] {
    SRTLA_TYPE_REG_NGP.to_be_bytes()
}

/// Bare keepalive used for liveness probing. Sender-originated keepalives
/// may carry a timestamp payload; the receiver echoes those verbatim and
/// only ever originates the 2-byte form.
pub fn create_keepalive_packet() -> [u8; 2] {
    SRTLA_TYPE_KEEPALIVE.to_be_bytes()
}

/// Batched SRTLA ACK: 4-byte header (type in the upper 16 bits of the first
/// word) followed by RECV_ACK_INT sequence numbers in receive order.
pub fn create_ack_packet(acks: &[u32; RECV_ACK_INT]) -> [u8; SRTLA_ACK_LEN] {
    let mut pkt = [0u8; SRTLA_ACK_LEN];
    pkt[0..4].copy_from_slice(&(((SRTLA_TYPE_ACK as u32) << 16).to_be_bytes()));
    for (i, &ack) in acks.iter().enumerate() {
        let off = 4 + i * 4;
        pkt[off..off + 4].copy_from_slice(&ack.to_be_bytes());
    }
    pkt
}

/// SRT handshake induction packet, used by the bootstrap reachability
/// probe. Layout: 16-byte SRT header, then the handshake payload with
/// version 4, extension field 2 and handshake type 1 (induction).
pub fn create_srt_handshake_induction() -> [u8; SRT_HANDSHAKE_LEN] {
    let mut pkt = [0u8; SRT_HANDSHAKE_LEN];
    pkt[0..2].copy_from_slice(&SRT_TYPE_HANDSHAKE.to_be_bytes());
    pkt[16..20].copy_from_slice(&4u32.to_be_bytes()); // version
    pkt[22..24].copy_from_slice(&2u16.to_be_bytes()); // extension field
    pkt[36..40].copy_from_slice(&1u32.to_be_bytes()); // handshake type: induction
    pkt
}
