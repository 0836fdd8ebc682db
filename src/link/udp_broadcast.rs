//! UDP broadcast link: one socket with `SO_BROADCAST` set, sending to a fixed broadcast address
//! and accepting frames from any sender (the broadcast constructor of `asyncsocket` in the
//! original router).

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread;

use log::{debug, trace};

use crate::consts::READ_BUFFER_LENGTH;
use crate::frame::Frame;
use crate::link::{Link, LinkId, LinkInfo, LinkShared};
use crate::queues::Sender as QueueSender;

/// A UDP link bound to a broadcast address, with no fixed peer.
pub struct UdpBroadcastLink {
    shared: LinkShared,
    socket: UdpSocket,
    broadcast_addr: SocketAddr,
    endpoint_lock: bool,
}

impl UdpBroadcastLink {
    /// `endpoint_lock` mirrors `spec.md` §4.2: when `true`, only datagrams arriving from
    /// `broadcast_addr` are accepted (a single trusted peer); when `false`, any sender is
    /// accepted, supporting multiple broadcast peers.
    pub fn new(
        id: LinkId,
        info: LinkInfo,
        socket: UdpSocket,
        broadcast_addr: SocketAddr,
        endpoint_lock: bool,
        outbound_capacity: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            shared: LinkShared::new(id, info, outbound_capacity),
            socket,
            broadcast_addr,
            endpoint_lock,
        })
    }
}

impl Link for UdpBroadcastLink {
    fn shared(&self) -> &LinkShared {
        &self.shared
    }

    fn run(self: Arc<Self>, inbound: QueueSender<(LinkId, Frame)>) -> Vec<thread::JoinHandle<()>> {
        let reader = {
            let this = self.clone();
            let closable = self.shared().closable();
            let socket = this.socket.try_clone().expect("udp socket clone");
            thread::spawn(move || run_reader(this, socket, inbound, closable))
        };
        let writer = {
            let this = self.clone();
            let closable = self.shared().closable();
            let socket = this.socket.try_clone().expect("udp socket clone");
            thread::spawn(move || run_writer(this, socket, closable))
        };
        vec![reader, writer]
    }
}

fn run_reader(
    link: Arc<UdpBroadcastLink>,
    socket: UdpSocket,
    inbound: QueueSender<(LinkId, Frame)>,
    closable: crate::util::closable::Closable,
) {
    let mut buf = [0u8; READ_BUFFER_LENGTH];

    while !closable.is_closed() && !link.is_kill() {
        let (n, sender_addr) = match socket.recv_from(&mut buf) {
            Ok(v) => v,
            Err(err) => {
                if !crate::util::is_poll_timeout(&err) {
                    trace!("[{}] udp broadcast read error: {err}", link.info().name);
                }
                continue;
            }
        };

        if link.endpoint_lock && sender_addr != link.broadcast_addr {
            continue;
        }

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
                    trace!("[{}] udp broadcast decode error: {err}", link.info().name);
                    break;
                }
            }
        }
    }
}

fn run_writer(
    link: Arc<UdpBroadcastLink>,
    socket: UdpSocket,
    closable: crate::util::closable::Closable,
) {
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
            debug!("[{}] udp broadcast encode error: {err}", link.info().name);
            continue;
        }
        if let Err(err) = socket.send_to(&encoded, link.broadcast_addr) {
            trace!("[{}] udp broadcast send error: {err}", link.info().name);
        }
    }
}
