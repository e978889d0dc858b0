//! Per-group upstream sockets and their reader tasks.
//!
//! Every group gets one UDP socket connected to the SRT listener. A reader
//! task moves its datagrams into the event loop's channel, tagged with the
//! group's stable handle; the handler looks the group up by handle, so a
//! packet whose group has been destroyed in the meantime is simply dropped.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use smallvec::SmallVec;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::group::{GroupId, UpstreamLink};
use crate::protocol::MTU;

pub struct UpstreamPacket {
    pub group_id: GroupId,
    pub bytes: SmallVec<u8, 64>,
}

pub fn create_upstream_channel() -> (
    UnboundedSender<UpstreamPacket>,
    UnboundedReceiver<UpstreamPacket>,
) {
    unbounded_channel::<UpstreamPacket>()
}

/// Open a group's upstream link: bind an ephemeral local port, connect to
/// the resolved SRT listener address and start the reader task.
pub async fn open_upstream(
    group_id: GroupId,
    srt_addr: SocketAddr,
    packet_tx: &UnboundedSender<UpstreamPacket>,
) -> Result<UpstreamLink> {
    let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], 0)))
        .await
        .context("create the SRT socket")?;
    socket
        .connect(srt_addr)
        .await
        .context("connect() to the SRT socket")?;
    let local_port = socket.local_addr().context("SRT socket local address")?.port();
    let socket = Arc::new(socket);
    let reader = spawn_reader(group_id, socket.clone(), packet_tx.clone());
    Ok(UpstreamLink::new(socket, local_port, reader))
}

fn spawn_reader(
    group_id: GroupId,
    socket: Arc<UdpSocket>,
    packet_tx: UnboundedSender<UpstreamPacket>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; MTU];
        loop {
            match socket.recv(&mut buf).await {
                Ok(n) => {
                    let pkt = UpstreamPacket {
                        group_id,
                        bytes: SmallVec::from_slice_copy(&buf[..n]),
                    };
                    if packet_tx.send(pkt).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!("group {}: SRT socket recv error: {}", group_id, err);
                    // An empty payload fails the relay's minimum-length
                    // check, which tears the group down.
                    let _ = packet_tx.send(UpstreamPacket {
                        group_id,
                        bytes: SmallVec::new(),
                    });
                    break;
                }
            }
        }
    })
}
