#![cfg(test)]

use crate::protocol::*;
use crate::receiver::{SelectorState, select_conn, update_capacity};
use crate::test_helpers::*;

const MIB: u64 = 1024 * 1024;

fn fresh_state(now: u64) -> SelectorState {
    // Pin the decay clock so selection reads utilisation over a full window
    SelectorState {
        last_decay: now - 30,
        ..Default::default()
    }
}

#[test]
fn test_empty_group_selects_nothing() {
    let mut group = make_group(1, &[], TEST_NOW);
    let mut state = fresh_state(TEST_NOW);
    assert_eq!(select_conn(&mut group, &mut state, TEST_NOW), None);
}

#[test]
fn test_near_capacity_link_is_avoided() {
    let mut group = make_group(1, &[5000, 5001], TEST_NOW);
    group.conns[0].max_bytes_per_period = 10 * MIB;
    group.conns[0].bytes_this_period = 8 * MIB;
    group.conns[1].max_bytes_per_period = 10 * MIB;
    group.conns[1].bytes_this_period = MIB;

    let mut state = fresh_state(TEST_NOW);

    // The first link sits at 0.8 utilisation; the lower-half rotation can
    // only ever land on the second, whatever the counter says
    for _ in 0..6 {
        assert_eq!(select_conn(&mut group, &mut state, TEST_NOW), Some(1));
    }
}

#[test]
fn test_round_robin_with_least_used_alternation() {
    let mut group = make_group(1, &[5000, 5001], TEST_NOW);
    group.conns[0].bytes_sent = 1000;
    group.conns[1].bytes_sent = 10;

    let mut state = fresh_state(TEST_NOW);

    // No capacity data, so utilisation is zero everywhere: plain rotation,
    // except every third pick goes to the least-loaded link
    assert_eq!(select_conn(&mut group, &mut state, TEST_NOW), Some(1)); // rr=1: pool[1]
    assert_eq!(select_conn(&mut group, &mut state, TEST_NOW), Some(0)); // rr=2: pool[0]
    assert_eq!(select_conn(&mut group, &mut state, TEST_NOW), Some(1)); // rr=3: least used
    assert_eq!(select_conn(&mut group, &mut state, TEST_NOW), Some(0)); // rr=4: pool[0]
}

#[test]
fn test_timed_out_links_are_not_active() {
    let mut group = make_group(1, &[5000, 5001], TEST_NOW);
    group.conns[0].last_rcvd = TEST_NOW - CONN_TIMEOUT - 1;

    let mut state = fresh_state(TEST_NOW);
    for _ in 0..4 {
        assert_eq!(select_conn(&mut group, &mut state, TEST_NOW), Some(1));
    }
}

#[test]
fn test_failed_links_are_excluded() {
    let mut group = make_group(1, &[5000, 5001], TEST_NOW);
    group.conns[1].successive_failures = 3;

    let mut state = fresh_state(TEST_NOW);
    for _ in 0..4 {
        assert_eq!(select_conn(&mut group, &mut state, TEST_NOW), Some(0));
    }
}

#[test]
fn test_recovery_pool_when_nothing_active() {
    let mut group = make_group(1, &[5000, 5001], TEST_NOW);
    group.conns[0].last_rcvd = TEST_NOW - CONN_TIMEOUT - 5;
    group.conns[1].last_rcvd = TEST_NOW - CONN_TIMEOUT - 5;
    group.conns[1].recovery_attempts = 2;

    let mut state = fresh_state(TEST_NOW);
    let picked = select_conn(&mut group, &mut state, TEST_NOW);
    assert_eq!(picked, Some(1));

    // Selection counts as contact: the recovery counter resets
    assert_eq!(group.conns[1].recovery_attempts, 0);
}

#[test]
fn test_fallback_is_most_recently_received() {
    let mut group = make_group(1, &[5000, 5001, 5002], TEST_NOW);
    for conn in group.conns.iter_mut() {
        conn.last_rcvd = TEST_NOW - CONN_TIMEOUT - 20;
        conn.recovery_attempts = 5; // exhausted: not a recovery candidate
    }
    group.conns[1].last_rcvd = TEST_NOW - CONN_TIMEOUT - 10;

    let mut state = fresh_state(TEST_NOW);
    assert_eq!(select_conn(&mut group, &mut state, TEST_NOW), Some(1));
}

#[test]
fn test_fallback_tie_prefers_earlier_member() {
    let mut group = make_group(1, &[5000, 5001], TEST_NOW);
    for conn in group.conns.iter_mut() {
        conn.last_rcvd = TEST_NOW - CONN_TIMEOUT - 10;
        conn.recovery_attempts = 5;
    }

    let mut state = fresh_state(TEST_NOW);
    assert_eq!(select_conn(&mut group, &mut state, TEST_NOW), Some(0));
}

#[test]
fn test_decay_tick_updates_capacity_estimates() {
    let mut group = make_group(1, &[5000, 5001], TEST_NOW);
    group.conns[0].bytes_this_period = 4 * MIB;
    group.conns[0].max_bytes_per_period = MIB;
    group.conns[0].bytes_sent = 1000;
    group.conns[1].bytes_this_period = 0;
    group.conns[1].max_bytes_per_period = 2 * MIB;
    group.conns[1].bytes_sent = 501;

    let mut state = SelectorState::default();
    let now = TEST_NOW;
    update_capacity(&mut group, &mut state, now);

    // A new per-period maximum raises the estimate; the accumulators halve
    assert_eq!(state.last_decay, now);
    assert_eq!(group.conns[0].max_bytes_per_period, 4 * MIB);
    assert_eq!(group.conns[0].last_capacity_update, now);
    assert_eq!(group.conns[0].bytes_this_period, 0);
    assert_eq!(group.conns[0].bytes_sent, 500);
    assert_eq!(group.conns[1].bytes_sent, 250);

    // An idle link keeps its estimate until the inactivity window passes
    assert_eq!(group.conns[1].max_bytes_per_period, 2 * MIB);

    // Within the window the tick does not run again
    group.conns[0].bytes_this_period = 8 * MIB;
    update_capacity(&mut group, &mut state, now + 30);
    assert_eq!(group.conns[0].bytes_this_period, 8 * MIB);

    update_capacity(&mut group, &mut state, now + 31);
    assert_eq!(group.conns[0].bytes_this_period, 0);
    assert_eq!(group.conns[0].max_bytes_per_period, 8 * MIB);
}

#[test]
fn test_inactive_link_capacity_decays() {
    let mut group = make_group(1, &[5000], TEST_NOW);
    group.conns[0].max_bytes_per_period = 1000;
    group.conns[0].last_capacity_update = TEST_NOW - 61;

    let mut state = SelectorState::default();
    update_capacity(&mut group, &mut state, TEST_NOW);

    assert_eq!(group.conns[0].max_bytes_per_period, 800);
}

#[test]
fn test_health_tracking_escalates() {
    let mut group = make_group(1, &[5000], TEST_NOW);
    // Quiet for longer than half the timeout
    group.conns[0].last_rcvd = TEST_NOW - CONN_TIMEOUT / 2 - 1;

    let mut state = SelectorState::default();
    update_capacity(&mut group, &mut state, TEST_NOW);

    // First observation arms the watch without counting a failure
    assert_eq!(group.conns[0].health_status, TEST_NOW);
    assert_eq!(group.conns[0].successive_failures, 0);

    // Still quiet six seconds later: one failure
    let later = TEST_NOW + 31;
    update_capacity(&mut group, &mut state, later);
    assert_eq!(group.conns[0].successive_failures, 1);
    assert_eq!(group.conns[0].health_status, later);

    // Traffic resumes: the watch clears
    group.conns[0].last_rcvd = later + 31;
    update_capacity(&mut group, &mut state, later + 31);
    assert_eq!(group.conns[0].health_status, 0);
    assert_eq!(group.conns[0].successive_failures, 0);
}

#[test]
fn test_utilisation_is_capped() {
    let mut group = make_group(1, &[5000, 5001], TEST_NOW);
    // Both wildly over their estimates; the cap keeps the ratio sort sane
    group.conns[0].max_bytes_per_period = MIB;
    group.conns[0].bytes_this_period = 100 * MIB;
    group.conns[1].max_bytes_per_period = MIB;
    group.conns[1].bytes_this_period = 100 * MIB;

    let mut state = fresh_state(TEST_NOW);
    // Both capped at 2.0: lower-half rotation degenerates to the first
    assert_eq!(select_conn(&mut group, &mut state, TEST_NOW), Some(0));
}

#[test]
fn test_selection_resets_recovery_attempts() {
    let mut group = make_group(1, &[5000], TEST_NOW);
    group.conns[0].recovery_attempts = 3;

    let mut state = fresh_state(TEST_NOW);
    assert_eq!(select_conn(&mut group, &mut state, TEST_NOW), Some(0));
    assert_eq!(group.conns[0].recovery_attempts, 0);
}
