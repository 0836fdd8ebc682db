//! # Links
//!
//! A [`Link`] is one transport endpoint the router terminates: a UDP client connection, a UDP
//! server accepting many peers, a UDP broadcast socket, or a serial port. Every variant shares the
//! same bookkeeping (packet counters, per-system discovery table, link-quality telemetry) and
//! exposes it through the [`Link`] trait so the router and the operator shell can treat all four
//! uniformly, matching `mlink`/`LinkInterface` in the original router.

mod serial;
mod udp_broadcast;
mod udp_client;
mod udp_server;

pub use serial::SerialLink;
pub use udp_broadcast::UdpBroadcastLink;
pub use udp_client::UdpClientLink;
pub use udp_server::UdpServerLink;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Instant;

use crate::addressing::RADIO_STATUS_MSG_ID;
use crate::consts::{DEFAULT_SYSID_TTL, SIK_RADIO_SYSID};
use crate::frame::Frame;
use crate::queues::PushOutcome;
use crate::util::closable::{Closable, SharedCloser};

/// Identifier assigned to a link when it is added to the router, stable for the link's lifetime.
pub type LinkId = u16;

/// Which system IDs a link is permitted to carry outbound traffic from, regardless of whether
/// this link has itself seen that system (`output_only_from` in the original router; an empty
/// list there means "all").
#[derive(Clone, Debug)]
pub enum OutputFilter {
    /// No restriction.
    Any,
    /// Only traffic originated by one of the given system IDs may be sent out this link.
    Only(std::collections::HashSet<u8>),
}

impl OutputFilter {
    /// Returns `true` when a frame originated by `sysid` is permitted to leave this link.
    pub fn allows(&self, sysid: u8) -> bool {
        match self {
            OutputFilter::Any => true,
            OutputFilter::Only(set) => set.contains(&sysid),
        }
    }
}

/// Static, user-facing description of a link, set at construction and never mutated.
#[derive(Clone, Debug)]
pub struct LinkInfo {
    /// Human-readable name shown in the operator shell (`info.link_name` in the original).
    pub name: String,
    /// Whether this link terminates a SiK radio, enabling link-quality decoding from
    /// `RADIO_STATUS` frames and excluding the radio's own telemetry system ID from routing.
    pub sik_radio: bool,
    /// Which originating system IDs this link may carry outbound traffic from.
    pub output_only_from: OutputFilter,
}

/// Per-system packet accounting, keyed by the system ID observed on a link
/// (`packet_stats` / `sysID_stats` in the original router).
#[derive(Clone, Copy, Debug, Default)]
pub struct PacketStats {
    last_seq: Option<u8>,
    pub packets_received: u64,
    pub packets_lost: u64,
    pub packets_dropped: u64,
}

impl PacketStats {
    /// Updates sequence-gap accounting for a newly received frame, returning the number of
    /// frames presumed lost due to the gap (0 if contiguous or this is the first frame seen).
    fn record_received(&mut self, seq: u8) -> u64 {
        self.packets_received += 1;
        let lost = match self.last_seq {
            None => 0,
            Some(prev) => seq.wrapping_sub(prev).wrapping_sub(1) as u64,
        };
        self.last_seq = Some(seq);
        self.packets_lost += lost;
        lost
    }

    fn record_dropped(&mut self) {
        self.packets_dropped += 1;
    }

    /// Fraction of traffic lost to sequence gaps, in `[0.0, 100.0]`. Deliberately dropped packets
    /// are tracked separately in `packets_dropped` and do not count toward this figure.
    pub fn loss_percent(&self) -> f64 {
        let total = self.packets_lost + self.packets_received;
        if total == 0 {
            return 0.0;
        }
        self.packets_lost as f64 / total as f64 * 100.0
    }
}

/// Radio link telemetry decoded from `RADIO_STATUS` frames (`link_quality` in the original
/// router), populated only for links whose [`LinkInfo::sik_radio`] is set.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinkQuality {
    pub link_delay: f64,
    pub local_rssi: u8,
    pub remote_rssi: u8,
    pub local_noise: u8,
    pub remote_noise: u8,
    pub rx_errors: u16,
    pub corrected_packets: u16,
    pub tx_buffer: u8,
}

struct SystemEntry {
    last_seen: Instant,
    components: std::collections::HashSet<u8>,
    stats: PacketStats,
}

/// Shared bookkeeping common to every [`Link`] implementation. Concrete transports embed this
/// and implement [`Link`] by delegating to it, adding only their own `run` loop.
pub struct LinkShared {
    id: LinkId,
    info: LinkInfo,
    up: AtomicBool,
    closer: SharedCloser,
    drop_rate_bits: AtomicU64,
    systems: RwLock<HashMap<u8, SystemEntry>>,
    quality: Mutex<LinkQuality>,
    last_radio_status: Mutex<Option<Instant>>,
    outbound_tx: crate::queues::Sender<Frame>,
    outbound_rx: Mutex<Option<crate::queues::Receiver<Frame>>>,
}

impl LinkShared {
    pub fn new(id: LinkId, info: LinkInfo, outbound_capacity: usize) -> Self {
        let (tx, rx) = crate::queues::bounded(outbound_capacity);
        Self {
            id,
            info,
            up: AtomicBool::new(true),
            closer: SharedCloser::new(),
            drop_rate_bits: AtomicU64::new(0.0f64.to_bits()),
            systems: RwLock::new(HashMap::new()),
            quality: Mutex::new(LinkQuality::default()),
            last_radio_status: Mutex::new(None),
            outbound_tx: tx,
            outbound_rx: Mutex::new(Some(rx)),
        }
    }

    /// Takes ownership of the outbound receiver; must be called exactly once, by the writer
    /// thread the concrete link spawns.
    pub fn take_outbound_receiver(&self) -> crate::queues::Receiver<Frame> {
        self.outbound_rx
            .lock()
            .expect("outbound receiver mutex poisoned")
            .take()
            .expect("outbound receiver already taken")
    }

    pub fn closable(&self) -> Closable {
        self.closer.to_closable()
    }

    fn drop_rate(&self) -> f64 {
        f64::from_bits(self.drop_rate_bits.load(Ordering::Acquire))
    }

    fn set_drop_rate(&self, rate: f64) {
        self.drop_rate_bits
            .store(rate.clamp(0.0, 1.0).to_bits(), Ordering::Release);
    }

    /// Records bookkeeping for a frame that has just been decoded off this link's reader thread,
    /// and decodes `RADIO_STATUS` telemetry when this is a SiK radio link. Mirrors steps 1-3 of
    /// `mlink::in_handler` in the original router.
    ///
    /// Returns `true` if the frame should go on to the shared inbound queue. A SiK radio's own
    /// `RADIO_STATUS` (sysid 51) is consumed here for link quality only: it never touches
    /// `sys_stats` and is never handed to the router.
    fn on_frame_received(&self, frame: &Frame) -> bool {
        let sysid = frame.system_id();

        if self.info.sik_radio
            && frame.message_id() == RADIO_STATUS_MSG_ID
            && sysid == SIK_RADIO_SYSID
        {
            if let Some(mut quality) = decode_radio_status(frame) {
                let now = Instant::now();
                let mut last = self.last_radio_status.lock().expect("radio status lock poisoned");
                if let Some(prev) = *last {
                    quality.link_delay = now.duration_since(prev).as_secs_f64();
                }
                *last = Some(now);
                *self.quality.lock().expect("quality lock poisoned") = quality;
            }
            return false;
        }

        let compid = frame.component_id();
        let seq = frame.sequence();
        let mut systems = self.systems.write().expect("systems lock poisoned");
        let entry = systems.entry(sysid).or_insert_with(|| SystemEntry {
            last_seen: Instant::now(),
            components: std::collections::HashSet::new(),
            stats: PacketStats::default(),
        });
        entry.last_seen = Instant::now();
        entry.components.insert(compid);
        entry.stats.record_received(seq);
        true
    }

    fn record_dropped(&self, sysid: u8) {
        if let Some(entry) = self
            .systems
            .write()
            .expect("systems lock poisoned")
            .get_mut(&sysid)
        {
            entry.stats.record_dropped();
        }
    }

    /// Evicts systems not seen within [`DEFAULT_SYSID_TTL`] (`checkForDeadSysID` in the original).
    fn evict_stale_systems(&self) {
        let now = Instant::now();
        self.systems
            .write()
            .expect("systems lock poisoned")
            .retain(|_, entry| now.duration_since(entry.last_seen) < DEFAULT_SYSID_TTL);
    }

    fn known_systems(&self) -> Vec<u8> {
        self.systems
            .read()
            .expect("systems lock poisoned")
            .keys()
            .copied()
            .collect()
    }

    fn has_seen_system(&self, sysid: u8) -> bool {
        self.systems
            .read()
            .expect("systems lock poisoned")
            .contains_key(&sysid)
    }

    fn has_seen_component(&self, sysid: u8, compid: u8) -> bool {
        self.systems
            .read()
            .expect("systems lock poisoned")
            .get(&sysid)
            .map(|entry| entry.components.contains(&compid))
            .unwrap_or(false)
    }

    fn aggregate_stats(&self) -> PacketStats {
        self.systems
            .read()
            .expect("systems lock poisoned")
            .values()
            .fold(PacketStats::default(), |mut acc, entry| {
                acc.packets_received += entry.stats.packets_received;
                acc.packets_lost += entry.stats.packets_lost;
                acc.packets_dropped += entry.stats.packets_dropped;
                acc
            })
    }
}

/// Common behaviour shared by every link transport.
///
/// Concrete types only need to provide [`Link::shared`] and [`Link::run`]; every other method has
/// a default implementation built on [`LinkShared`].
pub trait Link: Send + Sync {
    /// Returns the shared bookkeeping state.
    fn shared(&self) -> &LinkShared;

    /// Spawns this link's reader and writer threads, returning their join handles. The link
    /// closes (and both threads exit) when `closer` closes or the link kills itself internally
    /// (serial error threshold, stale broadcast, etc).
    fn run(
        self: std::sync::Arc<Self>,
        inbound: crate::queues::Sender<(LinkId, Frame)>,
    ) -> Vec<std::thread::JoinHandle<()>>;

    fn id(&self) -> LinkId {
        self.shared().id
    }

    fn info(&self) -> &LinkInfo {
        &self.shared().info
    }

    fn is_up(&self) -> bool {
        self.shared().up.load(Ordering::Acquire) && !self.is_kill()
    }

    fn set_up(&self, up: bool) {
        self.shared().up.store(up, Ordering::Release);
    }

    fn is_kill(&self) -> bool {
        self.shared().closer.is_closed()
    }

    fn kill(&self) {
        let mut closer = self.shared().closer.clone();
        closer.close();
    }

    fn drop_rate(&self) -> f64 {
        self.shared().drop_rate()
    }

    fn set_drop_rate(&self, rate: f64) {
        self.shared().set_drop_rate(rate)
    }

    fn quality(&self) -> LinkQuality {
        *self.shared().quality.lock().expect("quality lock poisoned")
    }

    fn stats(&self) -> PacketStats {
        self.shared().aggregate_stats()
    }

    fn known_systems(&self) -> Vec<u8> {
        self.shared().known_systems()
    }

    fn has_seen_system(&self, sysid: u8) -> bool {
        self.shared().has_seen_system(sysid)
    }

    fn has_seen_component(&self, sysid: u8, compid: u8) -> bool {
        self.shared().has_seen_component(sysid, compid)
    }

    fn evict_stale_systems(&self) {
        self.shared().evict_stale_systems()
    }

    /// Enqueues a frame for this link's writer thread. Never blocks; a full queue drops the
    /// frame, mirroring the original router's bounded `out_queue`.
    fn enqueue_outbound(&self, frame: Frame) -> PushOutcome {
        self.shared().outbound_tx.try_push(frame)
    }

    fn outbound_depth(&self) -> usize {
        self.shared().outbound_tx.depth()
    }

    /// Runs the shared bookkeeping for a frame just decoded from the wire, then forwards it to
    /// the inbound queue (`onMessageRecv` in the original router). A SiK radio's own
    /// `RADIO_STATUS` telemetry is consumed by [`LinkShared::on_frame_received`] and never
    /// reaches the queue. A full inbound queue drops the frame and counts it against the
    /// producing system, matching the queue-full error handling used on the outbound side.
    fn on_message_recv(&self, frame: Frame, inbound: &crate::queues::Sender<(LinkId, Frame)>) {
        let sysid = frame.system_id();
        if !self.shared().on_frame_received(&frame) {
            return;
        }
        match inbound.try_push((self.id(), frame)) {
            PushOutcome::Ok => {}
            PushOutcome::Full | PushOutcome::Disconnected => {
                self.shared().record_dropped(sysid);
            }
        }
    }

    /// Rolls this link's drop policy for an outbound frame about to be sent (`shouldDropPacket`
    /// in the original router, called from `processAndSend` just before the socket write). A
    /// dropped frame is recorded against its originating system's stats and must not be
    /// transmitted by the caller.
    fn should_drop_outbound(&self, frame: &Frame) -> bool {
        if crate::drop_policy::should_drop(self.drop_rate()) {
            self.shared().record_dropped(frame.system_id());
            true
        } else {
            false
        }
    }
}

/// MAVLink common-dialect `RADIO_STATUS` fields used for [`LinkQuality`].
///
/// `RADIO_STATUS` (id 109) always carries `rssi, remrssi, txbuf, noise, remnoise, rxerrors,
/// fixed` as raw byte/short fields, regardless of dialect, which is why this decodes the payload
/// directly instead of going through a generated dialect struct.
fn decode_radio_status(frame: &Frame) -> Option<LinkQuality> {
    let payload = frame.payload().bytes();
    if payload.len() < 9 {
        return None;
    }
    let rxerrors = u16::from_le_bytes([payload[0], payload[1]]);
    let fixed = u16::from_le_bytes([payload[2], payload[3]]);
    let rssi = payload[4];
    let remrssi = payload[5];
    let txbuf = payload[6];
    let noise = payload[7];
    let remnoise = payload[8];

    Some(LinkQuality {
        link_delay: 0.0,
        local_rssi: rssi,
        remote_rssi: remrssi,
        local_noise: noise,
        remote_noise: remnoise,
        rx_errors: rxerrors,
        corrected_packets: fixed,
        tx_buffer: txbuf,
    })
}

/// `true` if `sysid` is the reserved telemetry identity a SiK radio modem uses for its own
/// `RADIO_STATUS` frames (excluded from cross-link routing, see `should_forward` in
/// [`crate::router`]).
pub fn is_sik_radio_sysid(sysid: u8) -> bool {
    sysid == SIK_RADIO_SYSID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_stats_counts_contiguous_sequence() {
        let mut stats = PacketStats::default();
        assert_eq!(stats.record_received(0), 0);
        assert_eq!(stats.record_received(1), 0);
        assert_eq!(stats.packets_received, 2);
        assert_eq!(stats.packets_lost, 0);
    }

    #[test]
    fn packet_stats_detects_gap() {
        let mut stats = PacketStats::default();
        stats.record_received(0);
        let lost = stats.record_received(5);
        assert_eq!(lost, 4);
        assert_eq!(stats.packets_lost, 4);
    }

    #[test]
    fn loss_percent_ignores_deliberate_drops() {
        let mut stats = PacketStats::default();
        stats.record_received(0);
        stats.record_dropped();
        assert_eq!(stats.loss_percent(), 0.0);
    }

    #[test]
    fn loss_percent_reflects_sequence_gaps() {
        let mut stats = PacketStats::default();
        stats.record_received(0);
        stats.record_received(5);
        assert_eq!(stats.loss_percent(), 4.0 / 6.0 * 100.0);
    }
}
