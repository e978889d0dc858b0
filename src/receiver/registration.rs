//! Two-phase SRTLA registration: REG1 creates a group and answers with the
//! full id; REG2 binds one sender link to the group it names. The receiver
//! keeps no per-handshake state; every reply is derived from the registry.

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tracing::{error, info};

use super::ReceiverCtx;
use super::socket_info;
use crate::group::SrtlaConn;
use crate::protocol::*;

async fn send_reg_err(listener: &UdpSocket, addr: SocketAddr) {
    let _ = listener.send_to(&create_reg_err_packet(), addr).await;
}

/// REG1: allocate a group for the sender-chosen id half and reply REG2
/// echoing the full id. The group is only inserted once the reply is out.
pub async fn register_group(ctx: &mut ReceiverCtx, addr: SocketAddr, buf: &[u8], now: u64) {
    let ReceiverCtx {
        registry, listener, ..
    } = ctx;

    if registry.is_full() {
        send_reg_err(listener, addr).await;
        error!("[{}] group registration failed: max groups reached", addr);
        return;
    }

    // One group per remote address, ever
    if registry.find_by_addr(addr).0.is_some() {
        send_reg_err(listener, addr).await;
        error!(
            "[{}] group registration failed: remote address already registered to a group",
            addr
        );
        return;
    }

    let group = registry.create_group(&buf[2..], addr, now);

    let reply = create_reg2_packet(&group.id);
    if !matches!(listener.send_to(&reply, addr).await, Ok(n) if n == reply.len()) {
        error!("[{}] group registration failed: send error", addr);
        return;
    }

    info!("[{}] group {} registered", addr, group.group_id);
    registry.insert_group(group);
}

/// REG2: bind the sending address to the group named by the echoed id and
/// acknowledge with REG3. Re-registration to the same group is idempotent.
pub async fn register_conn(ctx: &mut ReceiverCtx, addr: SocketAddr, buf: &[u8], now: u64) {
    let ReceiverCtx {
        registry, listener, ..
    } = ctx;

    let id = &buf[2..2 + SRTLA_ID_LEN];
    let Some(group) = registry.find_group_by_id(id) else {
        let _ = listener.send_to(&create_reg_ngp_packet(), addr).await;
        error!("[{}] connection registration failed: no group found", addr);
        return;
    };
    let group_id = group.group_id;

    // A known address may re-register to its own group, never to another
    let (owner, member) = registry.find_by_addr(addr);
    if owner.is_some_and(|o| o != group_id) {
        send_reg_err(listener, addr).await;
        error!(
            "[{}] group {}: connection registration failed: provided group id mismatch",
            addr, group_id
        );
        return;
    }
    let already_registered = member.is_some();

    let Some(group) = registry.group_by_handle(group_id) else {
        return;
    };

    if !already_registered && group.conns.len() >= MAX_CONNS_PER_GROUP {
        send_reg_err(listener, addr).await;
        error!(
            "[{}] group {}: connection registration failed: max group conns reached",
            addr, group_id
        );
        return;
    }

    let reply = create_reg3_packet();
    if !matches!(listener.send_to(&reply, addr).await, Ok(n) if n == reply.len()) {
        error!(
            "[{}] group {}: connection registration failed: socket send error",
            addr, group_id
        );
        return;
    }

    if !already_registered {
        group.conns.push(SrtlaConn::new(addr, now));
    }

    socket_info::write_group_info(group);

    // Mark this peer as the most recently active one
    group.last_addr = addr;

    info!("[{}] group {}: connection registered", addr, group_id);
}
