//! Serial link: a single serial port shared by a reader and a writer thread, killed once its
//! I/O error count crosses a threshold (`serial::handleSendTo`/`handleReceiveFrom` in the
//! original router).

use std::io::{Read, Write};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, trace, warn};

use crate::consts::{DEFAULT_SERIAL_MAX_ERRORS, SERIAL_SLEEP_ON_NOTHING_RECEIVED};
use crate::frame::Frame;
use crate::link::{Link, LinkId, LinkInfo, LinkShared};
use crate::queues::Sender as QueueSender;

/// Tracks cumulative low-level I/O errors against a kill threshold
/// (`errorcount`/`MAX_SERIAL_ERRORS` in the original router), independent of any actual transport
/// so the threshold crossing can be unit tested without opening a real port. `errorcount` is
/// monotonic for the link's lifetime: the original never clears it on a successful read or write
/// (`serial.h`'s `int errorcount = 0;`, only ever incremented), so neither does this.
struct ErrorBudget {
    errorcount: AtomicU32,
    max_errors: u32,
}

impl ErrorBudget {
    fn new(max_errors: u32) -> Self {
        Self {
            errorcount: AtomicU32::new(0),
            max_errors,
        }
    }

    /// Records one low-level error. Returns `true` exactly the first time `errorcount` crosses
    /// `max_errors` (invariant 5 in `spec.md` §8: "enters is_kill exactly when errorcount
    /// transitions from threshold to threshold+1").
    fn note_error(&self) -> bool {
        self.errorcount.fetch_add(1, Ordering::AcqRel) + 1 == self.max_errors + 1
    }
}

/// A serial port link. `max_errors` consecutive low-level I/O errors across reads and writes
/// kills the link permanently.
pub struct SerialLink {
    shared: LinkShared,
    port: Mutex<Box<dyn serialport::SerialPort>>,
    errors: ErrorBudget,
}

impl SerialLink {
    /// Opens `path` at `baud_rate`, fixed 8N1, with hardware (RTS/CTS) flow control when
    /// `hardware_flow_control` is set and none otherwise (`spec.md` §4.3).
    pub fn open(
        id: LinkId,
        info: LinkInfo,
        path: &str,
        baud_rate: u32,
        hardware_flow_control: bool,
        timeout: Duration,
        outbound_capacity: usize,
    ) -> crate::error::Result<Arc<Self>> {
        let flow_control = if hardware_flow_control {
            serialport::FlowControl::Hardware
        } else {
            serialport::FlowControl::None
        };
        let port = serialport::new(path, baud_rate)
            .timeout(timeout)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(flow_control)
            .open()?;

        Ok(Arc::new(Self {
            shared: LinkShared::new(id, info, outbound_capacity),
            port: Mutex::new(port),
            errors: ErrorBudget::new(DEFAULT_SERIAL_MAX_ERRORS),
        }))
    }

    fn note_error(&self) {
        if self.errors.note_error() {
            warn!("link {} exceeded error threshold, killing", self.id());
            self.kill();
        }
    }
}

impl Link for SerialLink {
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

/// Adapts the shared serial port to [`std::io::Read`] for [`mavio::Receiver`], so the receiver
/// can be constructed once and keep its parser state across reads — a frame split across a read
/// boundary stays decodable instead of being discarded.
struct SerialPortReader {
    link: Arc<SerialLink>,
}

impl Read for SerialPortReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut port = self.link.port.lock().expect("serial port lock poisoned");
        port.read(buf)
    }
}

fn run_reader(
    link: Arc<SerialLink>,
    inbound: QueueSender<(LinkId, Frame)>,
    closable: crate::util::closable::Closable,
) {
    let mut receiver = mavio::Receiver::new::<mavio::protocol::Versionless>(SerialPortReader {
        link: link.clone(),
    });

    while !closable.is_closed() && !link.is_kill() {
        match receiver.recv() {
            Ok(frame) => link.on_message_recv(frame, &inbound),
            Err(mavio::error::Error::Io(io_err))
                if matches!(
                    io_err.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                ) =>
            {
                thread::sleep(SERIAL_SLEEP_ON_NOTHING_RECEIVED);
            }
            Err(err) => {
                trace!("[{}] serial read error: {err}", link.info().name);
                link.note_error();
                thread::sleep(SERIAL_SLEEP_ON_NOTHING_RECEIVED);
            }
        }
    }
}

fn run_writer(link: Arc<SerialLink>, closable: crate::util::closable::Closable) {
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
            debug!("[{}] serial encode error: {err}", link.info().name);
            continue;
        }

        let mut port = link.port.lock().expect("serial port lock poisoned");
        match port.write_all(&encoded) {
            Ok(()) => drop(port),
            Err(err) => {
                drop(port);
                trace!("[{}] serial write error: {err}", link.info().name);
                link.note_error();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kill_fires_exactly_on_threshold_crossing() {
        let budget = ErrorBudget::new(3);
        assert!(!budget.note_error());
        assert!(!budget.note_error());
        assert!(!budget.note_error());
        assert!(budget.note_error());
        assert!(!budget.note_error());
    }
}
