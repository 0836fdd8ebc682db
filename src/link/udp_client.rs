//! UDP client link: connects outbound to a single fixed peer (`asyncsocket::SOCKET_TYPE::CLIENT`
//! in the original router).

use std::net::UdpSocket;
use std::sync::Arc;
use std::thread;

use log::{debug, trace};

use crate::consts::READ_BUFFER_LENGTH;
use crate::frame::Frame;
use crate::link::{Link, LinkId, LinkInfo, LinkShared};
use crate::queues::Sender as QueueSender;

/// A UDP link bound to one remote address, read and written on two dedicated threads.
pub struct UdpClientLink {
    shared: LinkShared,
    socket: UdpSocket,
}

impl UdpClientLink {
    pub fn new(
        id: LinkId,
        info: LinkInfo,
        socket: UdpSocket,
        outbound_capacity: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            shared: LinkShared::new(id, info, outbound_capacity),
            socket,
        })
    }
}

impl Link for UdpClientLink {
    fn shared(&self) -> &LinkShared {
        &self.shared
    }

    fn run(self: Arc<Self>, inbound: QueueSender<(LinkId, Frame)>) -> Vec<thread::JoinHandle<()>> {
        let reader = {
            let this = self.clone();
            let closable = self.shared().closable();
            let socket = self.socket.try_clone().expect("udp socket clone");
            thread::spawn(move || run_reader(this, socket, inbound, closable))
        };
        let writer = {
            let this = self.clone();
            let closable = self.shared().closable();
            let socket = self.socket.try_clone().expect("udp socket clone");
            thread::spawn(move || run_writer(this, socket, closable))
        };
        vec![reader, writer]
    }
}

fn run_reader(
    link: Arc<UdpClientLink>,
    socket: UdpSocket,
    inbound: QueueSender<(LinkId, Frame)>,
    closable: crate::util::closable::Closable,
) {
    let mut receiver =
        mavio::Receiver::new::<mavio::protocol::Versionless>(UdpSocketReader(socket));

    while !closable.is_closed() && !link.is_kill() {
        match receiver.recv() {
            Ok(frame) => link.on_message_recv(frame, &inbound),
            Err(mavio::error::Error::Io(io_err))
                if matches!(
                    io_err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) => {}
            Err(err) => {
                trace!("[{}] udp client read error: {err}", link.info().name);
            }
        }
    }
}

fn run_writer(link: Arc<UdpClientLink>, socket: UdpSocket, closable: crate::util::closable::Closable) {
    let outbound = link.shared().take_outbound_receiver();
    let mut sender = mavio::Sender::new(UdpSocketWriter(socket));

    while !closable.is_closed() && !link.is_kill() {
        let frame = match outbound.recv_timeout(crate::consts::OUT_QUEUE_EMPTY_SLEEP) {
            Ok(frame) => frame,
            Err(crate::queues::RecvTimeoutError::Timeout) => continue,
            Err(crate::queues::RecvTimeoutError::Disconnected) => return,
        };
        if link.should_drop_outbound(&frame) {
            continue;
        }
        if let Err(err) = sender.send(&frame) {
            debug!("[{}] udp client write error: {err}", link.info().name);
        }
    }
}

/// Adapts a connected [`UdpSocket`] to [`std::io::Read`] for [`mavio::Receiver`].
struct UdpSocketReader(UdpSocket);

impl std::io::Read for UdpSocketReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut scratch = [0u8; READ_BUFFER_LENGTH];
        let cap = scratch.len().min(buf.len());
        let n = self.0.recv(&mut scratch[..cap])?;
        buf[..n].copy_from_slice(&scratch[..n]);
        Ok(n)
    }
}

/// Adapts a connected [`UdpSocket`] to [`std::io::Write`] for [`mavio::Sender`].
struct UdpSocketWriter(UdpSocket);

impl std::io::Write for UdpSocketWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.send(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
