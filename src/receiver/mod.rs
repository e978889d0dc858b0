//! The receiver core: a single-threaded event loop multiplexing the
//! sender-facing listener socket, every live upstream socket (via their
//! reader tasks' channel) and a one-second housekeeping tick.

mod housekeeping;
mod registration;
mod relay;
mod selection;
mod socket_info;
mod upstream;

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
pub use housekeeping::{HousekeepingState, cleanup_groups, ping_all_connections};
pub use relay::{handle_srtla_packet, handle_upstream_packet};
pub use selection::{DECAY_PERIOD, SelectorState, select_conn, update_capacity};
use socket2::{Domain, Protocol, Socket, Type};
pub use socket_info::{SRT_SOCKET_INFO_PREFIX, info_file_path, remove_info_file, write_info_file};
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{error, info};
pub use upstream::{UpstreamPacket, create_upstream_channel, open_upstream};

use crate::bootstrap::resolve_srt_addr;
use crate::group::{GroupId, GroupRegistry};
use crate::protocol::MTU;
use crate::utils::now_secs;

/// Absorbs bursty aggregate bitrate across all member links
const LISTENER_RECV_BUF: usize = 32 * 1024 * 1024;

/// Everything the event loop owns: the registry, the sockets, and the
/// process-wide selector and housekeeping clocks.
pub struct ReceiverCtx {
    pub listener: Arc<UdpSocket>,
    pub srt_addr: SocketAddr,
    pub registry: GroupRegistry,
    pub selector: SelectorState,
    pub housekeeping: HousekeepingState,
    pub upstream_tx: UnboundedSender<UpstreamPacket>,
}

impl ReceiverCtx {
    pub fn new(
        listener: Arc<UdpSocket>,
        srt_addr: SocketAddr,
        upstream_tx: UnboundedSender<UpstreamPacket>,
    ) -> Self {
        Self {
            listener,
            srt_addr,
            registry: GroupRegistry::new(),
            selector: SelectorState::default(),
            housekeeping: HousekeepingState::default(),
            upstream_tx,
        }
    }
}

/// Remove a group and run its teardown side effects. The upstream reader
/// task is aborted when the group drops.
pub fn destroy_group(registry: &mut GroupRegistry, group_id: GroupId) {
    if let Some(group) = registry.remove_group(group_id) {
        socket_info::remove_group_info(&group);
    }
}

/// Bind the sender-facing IPv4 listener with an enlarged receive buffer.
/// Any failure here is fatal to startup.
pub fn bind_listener(port: u16) -> Result<UdpSocket> {
    let sock = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .context("SRTLA socket creation failed")?;
    sock.set_nonblocking(true)
        .context("failed to set the SRTLA socket non-blocking")?;
    sock.set_recv_buffer_size(LISTENER_RECV_BUF)
        .context("failed to set SRTLA socket receive buffer size")?;
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    sock.bind(&addr.into()).context("SRTLA socket bind failed")?;
    let std_sock: std::net::UdpSocket = sock.into();
    UdpSocket::from_std(std_sock).context("failed to register the SRTLA socket with the runtime")
}

/// Resolve the SRT listener, bind the SRTLA socket and run the event loop.
/// Only startup can fail; the steady-state loop does not return.
pub async fn run_receiver(srtla_port: u16, srt_hostname: &str, srt_port: u16) -> Result<()> {
    let (srt_addr, _reachability) = resolve_srt_addr(srt_hostname, srt_port).await?;

    let listener = Arc::new(bind_listener(srtla_port)?);
    info!("listening for SRTLA on 0.0.0.0:{}", srtla_port);

    let (upstream_tx, upstream_rx) = create_upstream_channel();
    let ctx = ReceiverCtx::new(listener, srt_addr, upstream_tx);

    info!("srtla_rec is now running");
    run_event_loop(ctx, upstream_rx).await
}

/// The readiness loop. Each iteration services at most one datagram from
/// either direction, then runs the periodic work; the tick guarantees a
/// wakeup at least once per second even with no traffic.
pub async fn run_event_loop(
    mut ctx: ReceiverCtx,
    mut upstream_rx: UnboundedReceiver<UpstreamPacket>,
) -> Result<()> {
    let listener = ctx.listener.clone();
    let mut recv_buf = vec![0u8; MTU];
    let mut tick = time::interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            res = listener.recv_from(&mut recv_buf) => match res {
                Ok((n, addr)) => {
                    handle_srtla_packet(&mut ctx, &recv_buf[..n], addr, now_secs()).await;
                }
                Err(err) => error!("failed to read an srtla packet: {}", err),
            },
            pkt = upstream_rx.recv() => {
                if let Some(pkt) = pkt {
                    handle_upstream_packet(&mut ctx, pkt, now_secs()).await;
                }
            }
            _ = tick.tick() => {}
        }

        let now = now_secs();
        housekeeping::cleanup_groups(&mut ctx, now).await;
        housekeeping::ping_all_connections(&mut ctx, now).await;
    }
}
