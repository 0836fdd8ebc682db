//! UDP server link: binds one socket, discovers peers from inbound traffic, and relays outbound
//! frames to every live peer (`asyncsocket`'s server constructor in the original router).

use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use log::{debug, trace};

use crate::consts::{DEFAULT_PEER_TTL, READ_BUFFER_LENGTH};
use crate::frame::Frame;
use crate::link::{Link, LinkId, LinkInfo, LinkShared};
use crate::queues::Sender as QueueSender;

struct Peer {
    last_sign_of_life: Instant,
}

/// A UDP link bound to one local port, serving an arbitrary and changing set of remote peers.
pub struct UdpServerLink {
    shared: LinkShared,
    socket: UdpSocket,
    peers: Mutex<HashMap<SocketAddr, Peer>>,
}

impl UdpServerLink {
    pub fn new(
        id: LinkId,
        info: LinkInfo,
        socket: UdpSocket,
        outbound_capacity: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            shared: LinkShared::new(id, info, outbound_capacity),
            socket,
            peers: Mutex::new(HashMap::new()),
        })
    }

    fn touch_peer(&self, addr: SocketAddr) {
        self.peers
            .lock()
            .expect("peers lock poisoned")
            .entry(addr)
            .or_insert_with(|| Peer {
                last_sign_of_life: Instant::now(),
            })
            .last_sign_of_life = Instant::now();
    }

    /// Drops peers that have gone quiet for longer than [`DEFAULT_PEER_TTL`] and returns the
    /// addresses that are still live, mirroring `asyncsocket::send`'s eviction-while-iterating.
    fn live_peers(&self) -> Vec<SocketAddr> {
        let now = Instant::now();
        let mut peers = self.peers.lock().expect("peers lock poisoned");
        peers.retain(|_, peer| now.duration_since(peer.last_sign_of_life) < DEFAULT_PEER_TTL);
        peers.keys().copied().collect()
    }
}

impl Link for UdpServerLink {
    fn shared(&self) -> &LinkShared {
        &self.shared
    }

    fn run(self: Arc<Self>, inbound: QueueSender<(LinkId, Frame)>) -> Vec<thread::JoinHandle<()>> {
        let reader = {
            let this = self.clone();
            let closable = self.shared().closable();
            thread::spawn(move || run_reader(this, inbound, closable))
        };
        let writer = {
            let this = self.clone();
            let closable = self.shared().closable();
            thread::spawn(move || run_writer(this, closable))
        };
        vec![reader, writer]
    }
}

fn run_reader(
    link: Arc<UdpServerLink>,
    inbound: QueueSender<(LinkId, Frame)>,
    closable: crate::util::closable::Closable,
) {
    let mut buf = [0u8; READ_BUFFER_LENGTH];

    while !closable.is_closed() && !link.is_kill() {
        let (n, peer_addr) = match link.socket.recv_from(&mut buf) {
            Ok(v) => v,
            Err(err) => {
                if !crate::util::is_poll_timeout(&err) {
                    trace!("[{}] udp server read error: {err}", link.info().name);
                }
                continue;
            }
        };
        link.touch_peer(peer_addr);

        // A datagram may carry more than one concatenated MAVLink frame; decode until the
        // buffer is exhausted instead of stopping after the first.
        let mut cursor = std::io::Cursor::new(&buf[..n]);
        let mut receiver = mavio::Receiver::new::<mavio::protocol::Versionless>(&mut cursor);
        loop {
            match receiver.recv() {
                Ok(frame) => link.on_message_recv(frame, &inbound),
                Err(mavio::error::Error::Io(io_err))
                    if io_err.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(err) => {
                    trace!("[{}] udp server decode error: {err}", link.info().name);
                    break;
                }
            }
        }
    }
}

fn run_writer(link: Arc<UdpServerLink>, closable: crate::util::closable::Closable) {
    let outbound = link.shared().take_outbound_receiver();

    while !closable.is_closed() && !link.is_kill() {
        let frame = match outbound.recv_timeout(crate::consts::OUT_QUEUE_EMPTY_SLEEP) {
            Ok(frame) => frame,
            Err(crate::queues::RecvTimeoutError::Timeout) => continue,
            Err(crate::queues::RecvTimeoutError::Disconnected) => return,
        };
        if link.should_drop_outbound(&frame) {
            continue;
        }

        let mut encoded = Vec::new();
        let mut sender = mavio::Sender::new(&mut encoded);
        if let Err(err) = sender.send(&frame) {
            debug!("[{}] udp server encode error: {err}", link.info().name);
            continue;
        }

        for peer_addr in link.live_peers() {
            if let Err(err) = link.socket.send_to(&encoded, peer_addr) {
                trace!(
                    "[{}] udp server send to {peer_addr} failed: {err}",
                    link.info().name
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::OutputFilter;
    use std::time::Duration;

    fn test_link() -> Arc<UdpServerLink> {
        let socket = UdpSocket::bind("127.0.0.1:0").expect("bind test server socket");
        UdpServerLink::new(
            0,
            LinkInfo {
                name: "test".to_string(),
                sik_radio: false,
                output_only_from: OutputFilter::Any,
            },
            socket,
            16,
        )
    }

    #[test]
    fn peer_is_never_sent_to_before_it_first_sends_to_us() {
        let link = test_link();
        assert!(link.live_peers().is_empty());
    }

    /// S5: the server fans out to every live peer regardless of which one has previously
    /// carried the target system — there is no per-peer sysid table, only per-peer liveness.
    #[test]
    fn live_peers_includes_every_registered_peer_regardless_of_sysid() {
        let link = test_link();
        let p1: SocketAddr = "127.0.0.1:40001".parse().unwrap();
        let p2: SocketAddr = "127.0.0.1:40002".parse().unwrap();
        link.touch_peer(p1);
        link.touch_peer(p2);

        let peers = link.live_peers();
        assert_eq!(peers.len(), 2);
        assert!(peers.contains(&p1));
        assert!(peers.contains(&p2));
    }

    /// S6: a peer quiet for longer than the TTL is evicted and no longer sent to.
    #[test]
    fn stale_peer_is_evicted_after_ttl() {
        let link = test_link();
        let stale: SocketAddr = "127.0.0.1:40003".parse().unwrap();
        link.peers.lock().expect("peers lock poisoned").insert(
            stale,
            Peer {
                last_sign_of_life: Instant::now() - DEFAULT_PEER_TTL - Duration::from_secs(1),
            },
        );

        assert!(!link.live_peers().contains(&stale));
    }

    #[test]
    fn touching_a_peer_twice_keeps_it_alive() {
        let link = test_link();
        let peer: SocketAddr = "127.0.0.1:40004".parse().unwrap();
        link.touch_peer(peer);
        link.touch_peer(peer);
        assert_eq!(link.peers.lock().expect("peers lock poisoned").len(), 1);
    }
}
