//! Periodic cleanup and liveness probing, driven from the event loop.
//!
//! Groups: removed once empty and older than GROUP_TIMEOUT. Connections:
//! removed after 1.5 × CONN_TIMEOUT of silence, nudged with keepalives
//! before that. Probing runs more often than cleanup, on its own throttle.

use tracing::{debug, info};

use super::{ReceiverCtx, destroy_group, socket_info};
use crate::group::GroupId;
use crate::protocol::*;

/// Liveness probe period (seconds)
const PING_PERIOD: u64 = 2;
const MAX_RECOVERY_ATTEMPTS: u32 = 5;

/// Cleanup and probe throttles, owned by the event loop.
#[derive(Debug, Default)]
pub struct HousekeepingState {
    pub last_cleanup: u64,
    pub last_ping: u64,
}

/// Drop timed-out connections and stale groups; nudge silent connections
/// with keepalive bursts. Runs at most once per CLEANUP_PERIOD.
pub async fn cleanup_groups(ctx: &mut ReceiverCtx, now: u64) {
    let ReceiverCtx {
        registry,
        listener,
        housekeeping,
        ..
    } = ctx;

    if housekeeping.last_cleanup + CLEANUP_PERIOD > now {
        return;
    }
    housekeeping.last_cleanup = now;

    if registry.is_empty() {
        return;
    }

    debug!("starting a cleanup run...");

    let mut removed_groups = 0usize;
    let mut removed_conns = 0usize;
    let keepalive = create_keepalive_packet();

    let group_ids: Vec<GroupId> = registry.iter().map(|g| g.group_id).collect();
    for group_id in group_ids {
        let Some(group) = registry.group_by_handle(group_id) else {
            continue;
        };

        let before = group.conns.len();
        let mut i = 0;
        while i < group.conns.len() {
            if group.conns[i].last_rcvd + CONN_TIMEOUT + CONN_TIMEOUT / 2 < now {
                let addr = group.conns[i].addr;
                group.conns.remove(i);
                removed_conns += 1;
                info!("[{}] group {}: connection removed (timed out)", addr, group_id);
                continue;
            }

            let conn = &mut group.conns[i];
            if conn.last_rcvd + CONN_TIMEOUT / 4 < now
                && conn.recovery_attempts < MAX_RECOVERY_ATTEMPTS
            {
                // A burst of keepalives raises the odds one gets through
                for _ in 0..3 {
                    let _ = listener.send_to(&keepalive, conn.addr).await;
                }
                conn.recovery_attempts += 1;
                debug!(
                    "[{}] group {}: attempting to recover connection (attempt {}/{})",
                    conn.addr, group_id, conn.recovery_attempts, MAX_RECOVERY_ATTEMPTS
                );
            }
            i += 1;
        }

        let after = group.conns.len();
        if after == 0 && group.created_at + GROUP_TIMEOUT < now {
            destroy_group(registry, group_id);
            removed_groups += 1;
            info!("group {} removed (no connections)", group_id);
        } else if after != before {
            socket_info::write_group_info(group);
        }
    }

    debug!(
        "cleanup run ended: removed {} groups and {} connections, {} groups remain",
        removed_groups,
        removed_conns,
        registry.len()
    );
}

/// Proactive keepalive probing of quiet connections. Runs at most once per
/// PING_PERIOD; recovering connections get extra probes.
pub async fn ping_all_connections(ctx: &mut ReceiverCtx, now: u64) {
    let ReceiverCtx {
        registry,
        listener,
        housekeeping,
        ..
    } = ctx;

    if housekeeping.last_ping + PING_PERIOD > now {
        return;
    }
    housekeeping.last_ping = now;

    if registry.is_empty() {
        return;
    }

    let keepalive = create_keepalive_packet();
    for group in registry.iter() {
        for conn in &group.conns {
            if now.saturating_sub(conn.last_rcvd) > CONN_TIMEOUT / 5 {
                let _ = listener.send_to(&keepalive, conn.addr).await;
                if conn.recovery_attempts > 0 {
                    debug!(
                        "[{}] group {}: probing inactive connection",
                        conn.addr, group.group_id
                    );
                }
            }

            if conn.recovery_attempts > 0 {
                for _ in 0..2 {
                    let _ = listener.send_to(&keepalive, conn.addr).await;
                }
            }
        }
    }
}
