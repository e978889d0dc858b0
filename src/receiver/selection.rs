//! Link selection for listener→sender traffic.
//!
//! Each outgoing SRT packet toward the sender picks one member link based
//! on a capacity estimate, recent utilisation, health state and a
//! round-robin counter. Capacity estimates are refreshed by a background
//! decay pass that runs at most once per [`DECAY_PERIOD`].

use smallvec::SmallVec;
use tracing::{debug, info, warn};

use crate::group::{ConnGroup, SrtlaConn};
use crate::protocol::{CONN_TIMEOUT, MAX_CONNS_PER_GROUP};

/// Capacity measurement window (seconds)
pub const DECAY_PERIOD: u64 = 30;
/// Inactive links lose 20% of their capacity estimate after this long
const INACTIVITY_DECAY_AFTER: u64 = 60;
/// Utilisation above which a link counts as near capacity
const NEAR_CAPACITY: f64 = 0.7;
/// Utilisation values are capped here to keep ratios meaningful
const UTILISATION_CAP: f64 = 2.0;
const BANDWIDTH_LOG_PERIOD: u64 = 10;

type Pool = SmallVec<usize, MAX_CONNS_PER_GROUP>;

/// Selector state owned by the event loop: the monotone round-robin
/// tiebreaker and the shared decay clock. One instance serves all groups,
/// so the 30 s windows of coexisting groups are not independent; the
/// selection depends only on ratios, which tolerates that.
#[derive(Debug, Default)]
pub struct SelectorState {
    pub round_robin: u64,
    pub last_decay: u64,
    pub last_bandwidth_log: u64,
}

/// Pick the member of `group` to carry the next packet, or None when the
/// group has no members at all.
pub fn select_conn(group: &mut ConnGroup, state: &mut SelectorState, now: u64) -> Option<usize> {
    if group.conns.is_empty() {
        return None;
    }

    update_capacity(group, state, now);

    let mut pool = active_conns(group, now);
    if pool.is_empty() {
        pool = recovery_conns(group);
        if !pool.is_empty() {
            debug!(
                "group {}: no active connections, using {} recovery connections",
                group.group_id,
                pool.len()
            );
        }
    }
    if pool.is_empty() {
        warn!(
            "group {}: no active or recovery connections, using fallback strategy",
            group.group_id
        );
        return fallback_conn(group);
    }

    let selected = select_by_load(group, &pool, state, now);
    log_bandwidth_distribution(group, state, now);

    if let Some(idx) = selected {
        group.conns[idx].recovery_attempts = 0;
    }
    selected
}

/// Background decay pass: refresh capacity estimates, halve the long-term
/// byte accumulators and track link health. Self-throttled to once per
/// [`DECAY_PERIOD`] via the shared decay clock.
pub fn update_capacity(group: &mut ConnGroup, state: &mut SelectorState, now: u64) {
    if now.saturating_sub(state.last_decay) <= DECAY_PERIOD {
        return;
    }
    state.last_decay = now;

    for conn in group.conns.iter_mut() {
        update_capacity_estimate(conn, now);
        conn.bytes_sent /= 2;
        track_health(conn, now);
    }

    info!(
        "group {}: applied bandwidth usage decay and updated capacity estimates",
        group.group_id
    );
}

fn update_capacity_estimate(conn: &mut SrtlaConn, now: u64) {
    if conn.bytes_this_period > 0 {
        if conn.bytes_this_period > conn.max_bytes_per_period {
            conn.max_bytes_per_period = conn.bytes_this_period;
            conn.last_capacity_update = now;
            debug!(
                "{}: updated capacity estimate: {:.2} MB/period",
                conn.addr,
                conn.max_bytes_per_period as f64 / 1048576.0
            );
        }
        conn.bytes_this_period = 0;
    } else if conn.max_bytes_per_period > 0
        && now.saturating_sub(conn.last_capacity_update) > INACTIVITY_DECAY_AFTER
    {
        // Gradually deprioritise links that stopped carrying traffic
        conn.max_bytes_per_period = (conn.max_bytes_per_period as f64 * 0.8) as u64;
        debug!(
            "{}: reducing capacity estimate due to inactivity: {:.2} MB/period",
            conn.addr,
            conn.max_bytes_per_period as f64 / 1048576.0
        );
    }
}

fn track_health(conn: &mut SrtlaConn, now: u64) {
    if now.saturating_sub(conn.last_rcvd) > CONN_TIMEOUT / 2 {
        if conn.health_status == 0 {
            conn.health_status = now;
            conn.successive_failures = 0;
        } else if now.saturating_sub(conn.health_status) > 5 {
            conn.successive_failures += 1;
            conn.health_status = now;
            debug!(
                "{}: connection health deteriorating: {} failures",
                conn.addr, conn.successive_failures
            );
        }
    } else {
        conn.health_status = 0;
        conn.successive_failures = 0;
    }
}

fn active_conns(group: &mut ConnGroup, now: u64) -> Pool {
    let mut pool = Pool::new();
    for (i, conn) in group.conns.iter_mut().enumerate() {
        if conn.is_active(now) {
            pool.push(i);
        } else if conn.successive_failures >= 3 {
            warn!(
                "{}: connection excluded from load balancing due to {} successive failures",
                conn.addr, conn.successive_failures
            );
            // Occasionally give excluded links another chance
            if now % 30 == 0 {
                conn.successive_failures = 2;
                info!("{}: attempting to reintegrate problematic connection", conn.addr);
            }
        }
    }
    pool
}

fn recovery_conns(group: &ConnGroup) -> Pool {
    group
        .conns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.recovery_attempts > 0 && c.recovery_attempts < 5)
        .map(|(i, _)| i)
        .collect()
}

/// Last resort: the most recently heard-from member, earliest position
/// winning ties.
fn fallback_conn(group: &ConnGroup) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, conn) in group.conns.iter().enumerate() {
        if best.is_none_or(|b| conn.last_rcvd > group.conns[b].last_rcvd) {
            best = Some(i);
        }
    }
    best
}

/// Estimated utilisation of each pool member: current-period usage scaled
/// to a full window, as a fraction of the link's capacity estimate.
fn conn_utilisation(
    group: &ConnGroup,
    pool: &[usize],
    state: &SelectorState,
    now: u64,
) -> SmallVec<(usize, f64), MAX_CONNS_PER_GROUP> {
    let mut time_factor =
        (now.saturating_sub(state.last_decay) as f64).min(DECAY_PERIOD as f64) / DECAY_PERIOD as f64;
    if time_factor < 0.01 {
        time_factor = 0.01;
    }

    pool.iter()
        .map(|&i| {
            let conn = &group.conns[i];
            let mut utilisation = 0.0;
            if conn.max_bytes_per_period > 0 {
                let estimated_period_usage = conn.bytes_this_period as f64 / time_factor;
                utilisation = estimated_period_usage / conn.max_bytes_per_period as f64;
                if utilisation > UTILISATION_CAP {
                    utilisation = UTILISATION_CAP;
                }
            }
            (i, utilisation)
        })
        .collect()
}

fn select_by_load(
    group: &ConnGroup,
    pool: &[usize],
    state: &mut SelectorState,
    now: u64,
) -> Option<usize> {
    if pool.is_empty() {
        return None;
    }

    state.round_robin += 1;
    let rr = state.round_robin;

    // First minimum wins, so ties go to the earlier list position
    let least_used = pool.iter().copied().reduce(|best, i| {
        if group.conns[i].bytes_sent < group.conns[best].bytes_sent {
            i
        } else {
            best
        }
    });

    let mut utilisation = conn_utilisation(group, pool, state, now);
    let any_at_capacity = utilisation.iter().any(|&(i, u)| {
        if u > NEAR_CAPACITY {
            debug!(
                "{}: connection at {:.1}% capacity, adjusting distribution",
                group.conns[i].addr,
                u * 100.0
            );
            true
        } else {
            false
        }
    });

    if any_at_capacity {
        // Rotate through the least-utilised half of the pool
        utilisation.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        let lower_half = (utilisation.len() / 2).max(1);
        let (idx, u) = utilisation[(rr % lower_half as u64) as usize];
        debug!("load balancing: using connection with {:.1}% utilisation", u * 100.0);
        Some(idx)
    } else if rr % 3 == 0 && least_used.is_some() {
        least_used
    } else {
        Some(pool[(rr % pool.len() as u64) as usize])
    }
}

/// Periodic per-member bandwidth summary at debug level.
fn log_bandwidth_distribution(group: &ConnGroup, state: &mut SelectorState, now: u64) {
    if now.saturating_sub(state.last_bandwidth_log) <= BANDWIDTH_LOG_PERIOD || group.conns.is_empty()
    {
        return;
    }
    state.last_bandwidth_log = now;

    let total_bytes: u64 = group.conns.iter().map(|c| c.bytes_sent).sum();
    let healthy = group.conns.iter().filter(|c| c.is_active(now)).count();
    if total_bytes == 0 {
        debug!("group {}: no bandwidth data available", group.group_id);
        return;
    }

    debug!("group {}: active connections: {}/{}", group.group_id, healthy, group.conns.len());

    let mut time_factor =
        (now.saturating_sub(state.last_decay) as f64).min(DECAY_PERIOD as f64) / DECAY_PERIOD as f64;
    if time_factor < 0.01 {
        time_factor = 0.01;
    }

    for conn in &group.conns {
        let percent = conn.bytes_sent as f64 / total_bytes as f64 * 100.0;
        let mut utilisation = 0.0;
        let mut capacity_mbps = 0.0;
        if conn.max_bytes_per_period > 0 {
            let estimated_period_usage = conn.bytes_this_period as f64 / time_factor;
            utilisation = estimated_period_usage / conn.max_bytes_per_period as f64;
            capacity_mbps = conn.max_bytes_per_period as f64 * 8.0 / 30_000_000.0;
        }
        debug!(
            "{}: bandwidth {:.1}% ({:.2} KB), capacity {:.2} Mbps, utilisation {:.1}%, health issues: {}",
            conn.addr,
            percent,
            conn.bytes_sent as f64 / 1024.0,
            capacity_mbps,
            utilisation * 100.0,
            conn.successive_failures
        );
    }
}
