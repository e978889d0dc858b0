#![cfg(test)]

use smallvec::SmallVec;

use crate::group::SrtlaConn;
use crate::protocol::*;
use crate::receiver::{
    SRT_SOCKET_INFO_PREFIX, UpstreamPacket, destroy_group, handle_srtla_packet,
    handle_upstream_packet, info_file_path,
};
use crate::test_helpers::*;
use crate::utils::now_secs;

fn upstream_packet(group_id: u64, bytes: &[u8]) -> UpstreamPacket {
    UpstreamPacket {
        group_id,
        bytes: SmallVec::from_slice_copy(bytes),
    }
}

#[tokio::test]
async fn test_keepalive_is_echoed_verbatim() {
    let (mut ctx, _rx) = make_ctx(test_addr(1)).await;
    let (peer, peer_addr) = bind_peer().await;
    let now = now_secs();

    let mut group = make_group(1, &[], now);
    group.conns.push(SrtlaConn::new(peer_addr, now - 5));
    ctx.registry.insert_group(group);

    let keepalive = keepalive_with_timestamp(0x0102_0304_0506_0708);
    handle_srtla_packet(&mut ctx, &keepalive, peer_addr, now).await;

    let echo = recv_timeout(&peer).await.expect("no keepalive echo");
    assert_eq!(echo, keepalive);

    // The link's receive timestamp was refreshed first
    let group = ctx.registry.iter().next().unwrap();
    assert_eq!(group.conns[0].last_rcvd, now);
    assert!(group.upstream.is_none());
}

#[tokio::test]
async fn test_unknown_address_is_dropped() {
    let (srt_server, srt_addr) = bind_peer().await;
    let (mut ctx, _rx) = make_ctx(srt_addr).await;
    let (_peer, peer_addr) = bind_peer().await;

    handle_srtla_packet(&mut ctx, &srt_data_packet(1, 100), peer_addr, now_secs()).await;

    assert!(ctx.registry.is_empty());
    assert!(recv_timeout(&srt_server).await.is_none());
}

#[tokio::test]
async fn test_data_is_forwarded_upstream() {
    let (srt_server, srt_addr) = bind_peer().await;
    let (mut ctx, _rx) = make_ctx(srt_addr).await;
    let (_peer, peer_addr) = bind_peer().await;
    let now = now_secs();

    let mut group = make_group(1, &[], now);
    group.conns.push(SrtlaConn::new(peer_addr, now));
    ctx.registry.insert_group(group);

    let pkt = srt_data_packet(42, 188);
    handle_srtla_packet(&mut ctx, &pkt, peer_addr, now).await;

    // Payload reaches the SRT server unchanged
    let forwarded = recv_timeout(&srt_server).await.expect("nothing forwarded");
    assert_eq!(forwarded, pkt);

    // The upstream socket was created lazily and the side-effect file
    // written with the member address
    let group = ctx.registry.iter().next().unwrap();
    let link = group.upstream.as_ref().expect("no upstream socket");
    let path = info_file_path(SRT_SOCKET_INFO_PREFIX, link.local_port);
    let contents = std::fs::read_to_string(&path).expect("no socket info file");
    assert_eq!(contents.trim(), "127.0.0.1");
    assert_eq!(group.last_addr, peer_addr);

    // Teardown removes the file again
    destroy_group(&mut ctx.registry, 1);
    assert!(!path.exists());
}

#[tokio::test]
async fn test_short_packets_are_dropped() {
    let (srt_server, srt_addr) = bind_peer().await;
    let (mut ctx, _rx) = make_ctx(srt_addr).await;
    let (_peer, peer_addr) = bind_peer().await;
    let now = now_secs();

    let mut group = make_group(1, &[], now);
    group.conns.push(SrtlaConn::new(peer_addr, now - 3));
    ctx.registry.insert_group(group);

    // Below SRT_MIN_LEN and not a keepalive: dropped after the timestamp
    // update, before anything else
    handle_srtla_packet(&mut ctx, &[0x00u8; 8], peer_addr, now).await;

    let group = ctx.registry.iter().next().unwrap();
    assert_eq!(group.conns[0].last_rcvd, now);
    assert!(group.upstream.is_none());
    assert!(recv_timeout(&srt_server).await.is_none());
}

#[tokio::test]
async fn test_srtla_ack_batching() {
    let (srt_server, srt_addr) = bind_peer().await;
    let (mut ctx, _rx) = make_ctx(srt_addr).await;
    let (peer, peer_addr) = bind_peer().await;
    let now = now_secs();

    let mut group = make_group(1, &[], now);
    group.conns.push(SrtlaConn::new(peer_addr, now));
    ctx.registry.insert_group(group);

    // Nine data packets: forwarded, but no ACK yet
    for seq in 100..109u32 {
        handle_srtla_packet(&mut ctx, &srt_data_packet(seq, 100), peer_addr, now).await;
    }
    assert!(drain_packets(&peer).await.is_empty());

    // The tenth completes the batch
    handle_srtla_packet(&mut ctx, &srt_data_packet(109, 100), peer_addr, now).await;

    let ack = recv_timeout(&peer).await.expect("no SRTLA ACK");
    assert_eq!(ack.len(), SRTLA_ACK_LEN);
    let expected: Vec<u32> = (100..110).collect();
    assert_eq!(parse_srtla_ack(&ack).to_vec(), expected);

    // All ten payloads made it upstream
    assert_eq!(drain_packets(&srt_server).await.len(), 10);

    // The ring restarts; the next nine packets stay silent again
    for seq in 110..119u32 {
        handle_srtla_packet(&mut ctx, &srt_data_packet(seq, 100), peer_addr, now).await;
    }
    assert!(drain_packets(&peer).await.is_empty());
}

#[tokio::test]
async fn test_srt_ack_broadcast_to_all_members() {
    let (mut ctx, _rx) = make_ctx(test_addr(1)).await;
    let (peer_a, addr_a) = bind_peer().await;
    let (peer_b, addr_b) = bind_peer().await;
    let (peer_c, addr_c) = bind_peer().await;
    let now = now_secs();

    let mut group = make_group(1, &[], now);
    for addr in [addr_a, addr_b, addr_c] {
        group.conns.push(SrtlaConn::new(addr, now));
    }
    ctx.registry.insert_group(group);

    let ack = srt_ack_packet(48);
    handle_upstream_packet(&mut ctx, upstream_packet(1, &ack), now).await;

    for peer in [&peer_a, &peer_b, &peer_c] {
        let received = recv_timeout(peer).await.expect("member missed the ACK");
        assert_eq!(received, ack);
    }

    // Broadcasts are not charged to any link's telemetry
    let group = ctx.registry.iter().next().unwrap();
    assert!(group.conns.iter().all(|c| c.bytes_sent == 0));
}

#[tokio::test]
async fn test_upstream_data_rides_one_selected_link() {
    let (mut ctx, _rx) = make_ctx(test_addr(1)).await;
    let (peer, peer_addr) = bind_peer().await;
    let now = now_secs();

    let mut group = make_group(1, &[], now);
    group.conns.push(SrtlaConn::new(peer_addr, now));
    ctx.registry.insert_group(group);

    let payload = srt_data_packet(7, 120);
    handle_upstream_packet(&mut ctx, upstream_packet(1, &payload), now).await;

    let received = recv_timeout(&peer).await.expect("no downstream packet");
    assert_eq!(received, payload);

    let group = ctx.registry.iter().next().unwrap();
    assert_eq!(group.conns[0].bytes_sent, 120);
    assert_eq!(group.conns[0].bytes_this_period, 120);
}

#[tokio::test]
async fn test_upstream_skew_prefers_underutilised_link() {
    let (mut ctx, _rx) = make_ctx(test_addr(1)).await;
    let (peer_a, addr_a) = bind_peer().await;
    let (peer_b, addr_b) = bind_peer().await;
    let now = now_secs();

    let mut group = make_group(1, &[], now);
    group.conns.push(SrtlaConn::new(addr_a, now));
    group.conns.push(SrtlaConn::new(addr_b, now));
    const MIB: u64 = 1024 * 1024;
    group.conns[0].max_bytes_per_period = 10 * MIB;
    group.conns[0].bytes_this_period = 8 * MIB;
    group.conns[1].max_bytes_per_period = 10 * MIB;
    group.conns[1].bytes_this_period = MIB;
    ctx.registry.insert_group(group);

    // A full measurement window has elapsed, so utilisation reads raw:
    // A at 0.8 (near capacity), B at 0.1
    ctx.selector.last_decay = now - 30;

    let payload = srt_data_packet(9, 100);
    handle_upstream_packet(&mut ctx, upstream_packet(1, &payload), now).await;

    assert_eq!(recv_timeout(&peer_b).await.expect("B missed the packet"), payload);
    assert!(drain_packets(&peer_a).await.is_empty());
}

#[tokio::test]
async fn test_upstream_short_read_destroys_group() {
    let (mut ctx, _rx) = make_ctx(test_addr(1)).await;
    let (_peer, peer_addr) = bind_peer().await;
    let now = now_secs();

    let mut group = make_group(1, &[], now);
    group.conns.push(SrtlaConn::new(peer_addr, now));
    ctx.registry.insert_group(group);

    handle_upstream_packet(&mut ctx, upstream_packet(1, &[]), now).await;
    assert!(ctx.registry.is_empty());
}

#[tokio::test]
async fn test_stale_group_handle_is_ignored() {
    let (mut ctx, _rx) = make_ctx(test_addr(1)).await;
    let now = now_secs();

    ctx.registry.insert_group(make_group(1, &[40_000], now));

    // A packet queued for a group that no longer exists simply misses
    handle_upstream_packet(&mut ctx, upstream_packet(99, &srt_ack_packet(48)), now).await;

    assert_eq!(ctx.registry.len(), 1);
    assert_eq!(ctx.registry.iter().next().unwrap().conns.len(), 1);
}

#[tokio::test]
async fn test_no_member_falls_back_to_last_addr() {
    let (mut ctx, _rx) = make_ctx(test_addr(1)).await;
    let (peer, peer_addr) = bind_peer().await;
    let now = now_secs();

    // Group whose only association is the registering address
    let mut group = make_group(1, &[], now);
    group.last_addr = peer_addr;
    ctx.registry.insert_group(group);

    let payload = srt_data_packet(3, 100);
    handle_upstream_packet(&mut ctx, upstream_packet(1, &payload), now).await;

    assert_eq!(recv_timeout(&peer).await.expect("no fallback packet"), payload);
}
