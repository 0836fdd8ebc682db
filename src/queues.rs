//! # Bounded queues
//!
//! The shared inbound queue (multi-producer, single-consumer: every link reader pushes, the
//! router pops) and each link's outbound queue (single-producer, single-consumer: the router
//! pushes, that link's writer pops) are both bounded, non-blocking on push, and drop the newest
//! frame when full. Depth is tracked with an explicit atomic counter rather than inferred from
//! the channel, so it stays readable from outside the owning thread (used by the operator shell
//! and by [`crate::link::PacketStats`] bookkeeping).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvError, SyncSender, TrySendError};
use std::sync::Arc;
use std::time::Duration;

pub use std::sync::mpsc::RecvTimeoutError;

/// Outcome of a non-blocking push.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PushOutcome {
    /// The value was enqueued.
    Ok,
    /// The queue was full; the value was dropped.
    Full,
    /// The consuming end is gone; the value was dropped.
    Disconnected,
}

/// Producer half of a [`bounded`] queue. Cheap to clone; every clone increments the shared
/// depth counter on a successful push.
#[derive(Clone)]
pub struct Sender<T> {
    inner: SyncSender<T>,
    depth: Arc<AtomicUsize>,
}

impl<T> Sender<T> {
    /// Attempts to push a value without blocking.
    ///
    /// Never blocks the caller: a full queue or a disconnected receiver both result in the value
    /// being dropped and reported back to the caller via [`PushOutcome`].
    pub fn try_push(&self, value: T) -> PushOutcome {
        match self.inner.try_send(value) {
            Ok(()) => {
                self.depth.fetch_add(1, Ordering::AcqRel);
                PushOutcome::Ok
            }
            Err(TrySendError::Full(_)) => PushOutcome::Full,
            Err(TrySendError::Disconnected(_)) => PushOutcome::Disconnected,
        }
    }

    /// Current number of queued-but-not-yet-popped items.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }
}

/// Consumer half of a [`bounded`] queue.
pub struct Receiver<T> {
    inner: mpsc::Receiver<T>,
    depth: Arc<AtomicUsize>,
}

impl<T> Receiver<T> {
    /// Blocks until a value is available.
    ///
    /// Returns `Err` exactly when every [`Sender`] clone has been dropped — the permanent
    /// shutdown signal the router's main loop watches for.
    pub fn recv(&self) -> Result<T, RecvError> {
        let value = self.inner.recv()?;
        self.depth.fetch_sub(1, Ordering::AcqRel);
        Ok(value)
    }

    /// Blocks until a value is available or `timeout` elapses, whichever comes first.
    ///
    /// Used by link writer loops to wake periodically and re-check their shutdown flag instead
    /// of blocking forever on an outbound queue that may never receive another frame
    /// (`spec.md` §5: "writers suspend on outbound-queue pop, or sleep a small interval if the
    /// queue is empty").
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        let value = self.inner.recv_timeout(timeout)?;
        self.depth.fetch_sub(1, Ordering::AcqRel);
        Ok(value)
    }

    /// Current number of queued-but-not-yet-popped items.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }
}

/// Creates a bounded queue with the given capacity.
///
/// The [`Sender`] may be cloned to support multiple producers (the shared inbound queue); the
/// [`Receiver`] is not cloneable, matching the single-consumer requirement for both the inbound
/// and per-link outbound queues.
pub fn bounded<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    let depth = Arc::new(AtomicUsize::new(0));

    (
        Sender {
            inner: tx,
            depth: depth.clone(),
        },
        Receiver { inner: rx, depth },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_pop_track_depth() {
        let (tx, rx) = bounded::<u32>(2);
        assert_eq!(tx.depth(), 0);

        assert_eq!(tx.try_push(1), PushOutcome::Ok);
        assert_eq!(tx.try_push(2), PushOutcome::Ok);
        assert_eq!(tx.depth(), 2);

        assert_eq!(tx.try_push(3), PushOutcome::Full);
        assert_eq!(tx.depth(), 2);

        assert_eq!(rx.recv().unwrap(), 1);
        assert_eq!(rx.depth(), 1);
        assert_eq!(tx.try_push(3), PushOutcome::Ok);
    }

    #[test]
    fn multiple_producers_share_depth() {
        let (tx, rx) = bounded::<u32>(4);
        let tx2 = tx.clone();

        assert_eq!(tx.try_push(1), PushOutcome::Ok);
        assert_eq!(tx2.try_push(2), PushOutcome::Ok);
        assert_eq!(tx.depth(), 2);

        drop(tx);
        drop(tx2);
        assert!(rx.recv().is_ok());
        assert!(rx.recv().is_ok());
        assert!(rx.recv().is_err());
    }

    #[test]
    fn disconnected_receiver_reports_on_push() {
        let (tx, rx) = bounded::<u32>(1);
        drop(rx);
        assert_eq!(tx.try_push(1), PushOutcome::Disconnected);
    }
}
