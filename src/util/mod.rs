//! Small internal utilities shared across the crate.

pub mod closable;

/// `true` if `err` is the expected result of a socket read timing out while idle, rather than a
/// genuine transport failure. Readers set a poll timeout on their sockets so they can notice
/// shutdown without blocking forever; this distinguishes that expected wakeup from a real error
/// worth logging.
pub fn is_poll_timeout(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}
