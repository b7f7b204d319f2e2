use anyhow::{Context, Result};
use boat_mesh::{Path, Radio};
use boat_proto::FRAME_LEN;
use boat_uplink::WanUplink;
use std::io::ErrorKind;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{debug, trace};

/// Mesh radio stand-in: one UDP datagram per frame, sent to every peer.
pub struct UdpMeshRadio {
    socket: UdpSocket,
    peers: Vec<SocketAddr>,
}

impl UdpMeshRadio {
    pub async fn bind(bind: &str, peers: &[String], broadcast: bool) -> Result<Self> {
        let socket = UdpSocket::bind(bind).await.with_context(|| format!("bind mesh socket {}", bind))?;
        if broadcast {
            socket.set_broadcast(true).context("enable broadcast")?;
        }
        let peers = parse_peers(peers)?;
        debug!("mesh: bound {} with {} peers", bind, peers.len());
        Ok(Self { socket, peers })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub async fn readable(&self) -> Result<()> {
        Ok(self.socket.readable().await?)
    }

    fn transmit(&self, frame: &[u8]) -> bool {
        let mut any = false;
        for peer in &self.peers {
            match self.socket.try_send_to(frame, *peer) {
                Ok(_) => any = true,
                Err(e) => trace!("mesh: send to {} failed: {}", peer, e),
            }
        }
        any
    }

    fn receive(&self) -> Option<Vec<u8>> {
        // a little headroom so oversize datagrams are seen, and rejected, whole
        let mut buf = [0u8; FRAME_LEN * 4];
        match self.socket.try_recv_from(&mut buf) {
            Ok((n, from)) => {
                trace!("mesh: {} bytes from {}", n, from);
                Some(buf[..n].to_vec())
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => None,
            Err(e) => {
                debug!("mesh: receive error: {}", e);
                None
            }
        }
    }
}

pub fn parse_peers(peers: &[String]) -> Result<Vec<SocketAddr>> {
    peers.iter()
        .map(|p| p.parse().with_context(|| format!("bad mesh peer address {}", p)))
        .collect()
}

/// Both physical links behind the engine's `Radio` seam.
pub struct NodeRadio {
    pub mesh: UdpMeshRadio,
    pub wan: Option<WanUplink>,
}

impl Radio for NodeRadio {
    fn try_transmit(&mut self, path: Path, frame: &[u8]) -> bool {
        match path {
            Path::Mesh => self.mesh.transmit(frame),
            Path::WideArea => self.wan.as_ref().map(|w| w.try_send(frame)).unwrap_or(false),
        }
    }

    fn poll_receive(&mut self) -> Option<Vec<u8>> {
        self.mesh.receive()
    }

    fn is_wide_area_joined(&self) -> bool {
        self.wan.as_ref().map(|w| w.is_joined()).unwrap_or(false)
    }
}
