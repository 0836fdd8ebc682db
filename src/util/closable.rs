//! # Shutdown-state primitives
//!
//! Three levels of resource ownership, used to coordinate shutdown across the reader/writer
//! threads of a link and the router:
//!
//! * [`Closer`] is owned by whoever controls the lifetime of a resource. Dropping it closes the
//!   resource. Not [`Clone`].
//! * [`SharedCloser`] is a cloneable, reference-counted variant: the resource closes once every
//!   clone is dropped.
//! * [`Closable`] is a read-only handle used by dependent tasks to observe closing.
//!
//! Closing is monotonic: once closed, a [`Closable`] never reports open again, matching the
//! `is_kill` invariant on [`crate::link::Link`].

use std::mem;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Exclusive owner of a closable resource. Closes on drop.
#[derive(Debug)]
#[must_use]
pub struct Closer(Arc<AtomicBool>);

impl Closer {
    /// Creates a new, open closer.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Returns a read-only [`Closable`] handle.
    pub fn to_closable(&self) -> Closable {
        Closable(self.0.clone())
    }

    /// Returns a cloneable [`SharedCloser`] sharing this closer's state.
    pub fn to_shared(&self) -> SharedCloser {
        SharedCloser {
            flag: self.0.clone(),
            owners: Arc::new(AtomicUsize::new(1)),
        }
    }

    /// Closes the resource immediately.
    pub fn close(&mut self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns `true` if the resource has been closed.
    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for Closer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Closer {
    fn drop(&mut self) {
        self.close();
    }
}

/// Reference-counted closable state. Closes once every clone has been dropped.
#[derive(Debug)]
#[must_use]
pub struct SharedCloser {
    flag: Arc<AtomicBool>,
    owners: Arc<AtomicUsize>,
}

impl SharedCloser {
    /// Creates a new, open shared closer.
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            owners: Arc::new(AtomicUsize::new(1)),
        }
    }

    /// Returns a read-only [`Closable`] handle.
    pub fn to_closable(&self) -> Closable {
        Closable(self.flag.clone())
    }

    /// Closes the resource immediately, regardless of other owners.
    pub fn close(&mut self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns `true` if the resource has been closed.
    pub fn is_closed(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl Default for SharedCloser {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SharedCloser {
    fn clone(&self) -> Self {
        self.owners.fetch_add(1, Ordering::Release);
        Self {
            flag: self.flag.clone(),
            owners: self.owners.clone(),
        }
    }
}

impl Drop for SharedCloser {
    fn drop(&mut self) {
        if self.owners.fetch_sub(1, Ordering::Release) <= 1 {
            self.flag.store(true, Ordering::Release);
        }
    }
}

/// Read-only view of a [`Closer`] or [`SharedCloser`]'s state.
#[derive(Clone, Debug)]
#[must_use]
pub struct Closable(Arc<AtomicBool>);

impl Closable {
    /// Returns an already-closed handle, useful as a default/placeholder.
    pub fn closed() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    /// Returns `true` if the underlying resource has been closed.
    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closer_drop_closes_dependents() {
        let closer = Closer::new();
        let closable = closer.to_closable();
        assert!(!closable.is_closed());
        drop(closer);
        assert!(closable.is_closed());
    }

    #[test]
    fn shared_closer_closes_when_last_clone_dropped() {
        let shared = SharedCloser::new();
        let other = shared.clone();
        let closable = shared.to_closable();

        drop(shared);
        assert!(!closable.is_closed());

        drop(other);
        assert!(closable.is_closed());
    }

    #[test]
    fn explicit_close_is_immediate() {
        let mut closer = Closer::new();
        let closable = closer.to_closable();
        closer.close();
        assert!(closable.is_closed());
    }
}
