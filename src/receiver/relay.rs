//! The bidirectional relay: sender links → upstream SRT socket, and
//! upstream replies fanned back across the member links.

use std::net::SocketAddr;

use tracing::{error, info};

use super::registration::{register_conn, register_group};
use super::selection::select_conn;
use super::upstream::{UpstreamPacket, open_upstream};
use super::{ReceiverCtx, destroy_group, socket_info};
use crate::protocol::*;

/// Handle one datagram from the sender-facing listener socket.
pub async fn handle_srtla_packet(ctx: &mut ReceiverCtx, buf: &[u8], addr: SocketAddr, now: u64) {
    match classify(buf) {
        Some(PacketKind::Reg1) => return register_group(ctx, addr, buf, now).await,
        Some(PacketKind::Reg2) => return register_conn(ctx, addr, buf, now).await,
        _ => {}
    }

    let ReceiverCtx {
        registry,
        listener,
        upstream_tx,
        srt_addr,
        ..
    } = ctx;

    // Everything else must come from a registered member; discard otherwise
    let (Some(group_id), Some(conn_idx)) = registry.find_by_addr(addr) else {
        return;
    };
    let Some(group) = registry.group_by_handle(group_id) else {
        return;
    };

    group.conns[conn_idx].last_rcvd = now;

    // Keepalives bounce straight back, timestamp payload and all
    if is_srtla_keepalive(buf) {
        if !matches!(listener.send_to(buf, addr).await, Ok(n) if n == buf.len()) {
            error!("[{}] group {}: failed to echo SRTLA keepalive", addr, group_id);
        }
        return;
    }

    // Too short to be SRT traffic
    if buf.len() < SRT_MIN_LEN {
        return;
    }

    group.last_addr = addr;

    // Track received data packets; every RECV_ACK_INT of them, one batched
    // SRTLA ACK goes back on the same link
    if let Some(sn) = get_srt_sequence_number(buf)
        && let Some(batch) = group.conns[conn_idx].record_sequence(sn)
    {
        let ack = create_ack_packet(&batch);
        if !matches!(listener.send_to(&ack, addr).await, Ok(n) if n == ack.len()) {
            error!("[{}] group {}: failed to send the SRTLA ACK", addr, group_id);
        }
    }

    // Lazily open the upstream socket on the first forwarded payload
    if group.upstream.is_none() {
        match open_upstream(group_id, *srt_addr, upstream_tx).await {
            Ok(link) => {
                info!("group {}: created SRT socket, local port {}", group_id, link.local_port);
                group.upstream = Some(link);
                socket_info::write_group_info(group);
            }
            Err(err) => {
                error!("group {}: failed to set up the SRT socket: {:#}", group_id, err);
                destroy_group(registry, group_id);
                return;
            }
        }
    }

    let sent = match &group.upstream {
        Some(link) => link.socket.send(buf).await,
        None => return,
    };
    if !matches!(sent, Ok(n) if n == buf.len()) {
        error!(
            "group {}: failed to forward SRTLA packet, terminating the group",
            group_id
        );
        destroy_group(registry, group_id);
    }
}

/// Handle one datagram read from a group's upstream socket.
pub async fn handle_upstream_packet(ctx: &mut ReceiverCtx, pkt: UpstreamPacket, now: u64) {
    let ReceiverCtx {
        registry,
        listener,
        selector,
        ..
    } = ctx;

    // A packet queued for a group destroyed in the meantime misses here
    let Some(group) = registry.group_by_handle(pkt.group_id) else {
        return;
    };
    let group_id = group.group_id;

    if pkt.bytes.len() < SRT_MIN_LEN {
        error!(
            "group {}: failed to read the SRT sock, terminating the group",
            group_id
        );
        destroy_group(registry, group_id);
        return;
    }

    // Broadcast SRT ACKs over all member links for timely delivery
    if is_srt_ack(&pkt.bytes) {
        for conn in &group.conns {
            if !matches!(listener.send_to(&pkt.bytes, conn.addr).await, Ok(n) if n == pkt.bytes.len())
            {
                error!("[{}] group {}: failed to send the SRT ack", conn.addr, group_id);
            }
        }
        return;
    }

    // Everything else rides exactly one selected link
    let selected = select_conn(group, selector, now);
    let target = match selected {
        Some(idx) => group.conns[idx].addr,
        None => group.last_addr,
    };

    match listener.send_to(&pkt.bytes, target).await {
        Ok(n) if n == pkt.bytes.len() => {
            if let Some(idx) = selected {
                group.conns[idx].charge_sent_bytes(n);
            }
        }
        _ => error!("[{}] group {}: failed to send the SRT packet", target, group_id),
    }
}
