//! # Common constants

use std::time::Duration;

/// Default depth of the shared inbound queue (`MAV_INCOMING_LENGTH` in the original router).
pub const DEFAULT_INBOUND_QUEUE_LENGTH: usize = 1024;
/// Default depth of a per-link outbound queue.
pub const DEFAULT_OUTBOUND_QUEUE_LENGTH: usize = 1024;

/// How long a writer sleeps between polls of an empty outbound queue.
pub const OUT_QUEUE_EMPTY_SLEEP: Duration = Duration::from_millis(10);

/// TTL after which a system ID not seen on a link is considered dead and evicted from
/// `sys_stats` (`checkForDeadSysID` in the original router).
pub const DEFAULT_SYSID_TTL: Duration = Duration::from_secs(10);

/// How long a UDP server peer may go without sending before it is evicted and no longer sent to.
pub const DEFAULT_PEER_TTL: Duration = Duration::from_secs(30);

/// Number of consecutive low-level I/O errors a serial link tolerates before it is killed.
pub const DEFAULT_SERIAL_MAX_ERRORS: u32 = 20;

/// Sleep interval after a zero-byte serial read.
pub const SERIAL_SLEEP_ON_NOTHING_RECEIVED: Duration = Duration::from_millis(2);

/// Size of the scratch buffer used for stream reads.
pub const READ_BUFFER_LENGTH: usize = 4096;

/// Read timeout set on every UDP socket so a reader thread blocked on an idle link still wakes
/// periodically to check whether it has been asked to shut down.
pub const UDP_READ_POLL_TIMEOUT: Duration = Duration::from_millis(200);

/// SiK radio telemetry links use this reserved system ID for local `RADIO_STATUS` frames.
pub const SIK_RADIO_SYSID: u8 = 51;
