//! # Router
//!
//! The router owns every [`Link`], drains the shared inbound queue, decides which links a frame
//! should be forwarded to, and enqueues it on each of them (`MainLoop`/`should_forward_message`
//! in the original router).

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, trace};

use crate::addressing;
use crate::consts::DEFAULT_INBOUND_QUEUE_LENGTH;
use crate::frame::Frame;
use crate::link::{is_sik_radio_sysid, Link, LinkId};
use crate::queues::{self, PushOutcome};
use crate::util::closable::SharedCloser;

/// Owns the link table and the forwarding loop.
pub struct Router {
    links: std::sync::RwLock<HashMap<LinkId, Arc<dyn Link>>>,
    next_link_id: std::sync::atomic::AtomicU16,
    inbound_tx: queues::Sender<(LinkId, Frame)>,
    inbound_rx: std::sync::Mutex<Option<queues::Receiver<(LinkId, Frame)>>>,
    closer: SharedCloser,
}

impl Router {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = queues::bounded(DEFAULT_INBOUND_QUEUE_LENGTH);
        Arc::new(Self {
            links: std::sync::RwLock::new(HashMap::new()),
            next_link_id: std::sync::atomic::AtomicU16::new(0),
            inbound_tx: tx,
            inbound_rx: std::sync::Mutex::new(Some(rx)),
            closer: SharedCloser::new(),
        })
    }

    /// Allocates the next link id and registers `link` with the router. Does not start the
    /// link's threads; call [`Router::spawn_links`] once every configured link has been added.
    pub fn add_link(&self, make_link: impl FnOnce(LinkId) -> Arc<dyn Link>) -> LinkId {
        let id = self
            .next_link_id
            .fetch_add(1, std::sync::atomic::Ordering::AcqRel);
        let link = make_link(id);
        self.links
            .write()
            .expect("links lock poisoned")
            .insert(id, link);
        id
    }

    /// Like [`Router::add_link`], but for constructors that can fail (e.g. opening a serial
    /// port). On error no link id is consumed.
    pub fn try_add_link(
        &self,
        make_link: impl FnOnce(LinkId) -> crate::error::Result<Arc<dyn Link>>,
    ) -> crate::error::Result<LinkId> {
        let id = self
            .next_link_id
            .fetch_add(1, std::sync::atomic::Ordering::AcqRel);
        let link = make_link(id)?;
        self.links
            .write()
            .expect("links lock poisoned")
            .insert(id, link);
        Ok(id)
    }

    pub fn link(&self, id: LinkId) -> Option<Arc<dyn Link>> {
        self.links.read().expect("links lock poisoned").get(&id).cloned()
    }

    pub fn links(&self) -> Vec<Arc<dyn Link>> {
        self.links.read().expect("links lock poisoned").values().cloned().collect()
    }

    /// Starts every registered link's reader/writer threads. Returns their join handles so the
    /// caller can wait for clean shutdown.
    pub fn spawn_links(self: &Arc<Self>) -> Vec<thread::JoinHandle<()>> {
        self.links()
            .into_iter()
            .flat_map(|link| link.run(self.inbound_tx.clone()))
            .collect()
    }

    /// Runs the forwarding loop on the calling thread until the router is closed. Call from a
    /// dedicated thread; returns once every link's sender has dropped or [`Router::shutdown`] is
    /// called.
    pub fn run(self: &Arc<Self>) {
        let inbound = self
            .inbound_rx
            .lock()
            .expect("inbound receiver mutex poisoned")
            .take()
            .expect("router already running");

        let mut last_sweep = std::time::Instant::now();

        while !self.closer.is_closed() {
            match inbound.recv_timeout(crate::consts::OUT_QUEUE_EMPTY_SLEEP) {
                Ok((origin, frame)) => self.forward(origin, frame),
                Err(queues::RecvTimeoutError::Timeout) => {}
                Err(queues::RecvTimeoutError::Disconnected) => return,
            }

            if last_sweep.elapsed() > Duration::from_secs(1) {
                for link in self.links() {
                    link.evict_stale_systems();
                }
                last_sweep = std::time::Instant::now();
            }
        }
    }

    /// Stops the forwarding loop and every registered link's reader/writer threads.
    pub fn shutdown(&self) {
        let mut closer = self.closer.clone();
        closer.close();
        for link in self.links() {
            link.kill();
        }
    }

    fn forward(&self, origin: LinkId, frame: Frame) {
        let (target_system, target_component) = addressing::extract_targets(&frame);
        let origin_sysid = frame.system_id();
        let sik_origin = self
            .link(origin)
            .map(|link| link.info().sik_radio && is_sik_radio_sysid(origin_sysid))
            .unwrap_or(false);

        for link in self.links() {
            if !link.is_up() {
                continue;
            }
            if !should_forward(
                origin,
                &*link,
                origin_sysid,
                target_system,
                target_component,
                sik_origin,
            ) {
                continue;
            }

            match link.enqueue_outbound(frame.clone()) {
                PushOutcome::Ok => {}
                PushOutcome::Full => {
                    trace!("link {} outbound queue full, dropping frame", link.id());
                }
                PushOutcome::Disconnected => {
                    debug!("link {} outbound channel disconnected", link.id());
                }
            }
        }
    }
}

/// Decides whether a frame received on `origin` should be forwarded to `candidate`, mirroring
/// `should_forward_message` in the original router:
///
/// 1. never echo a frame back onto the link it arrived on;
/// 2. a SiK radio's own `RADIO_STATUS` telemetry is local to that link and never forwarded;
/// 3. `output_only_from` restricts which originating system IDs a link may carry;
/// 4. with no target system the frame is a broadcast and goes everywhere (subject to 1-3);
/// 5. with a target system but no target component, forward if the candidate has ever seen that
///    system (component granularity is not asked for);
/// 6. target system `0` is a broadcast, per the MAVLink convention;
/// 7. if the candidate has never seen the target system at all, nobody can route to it and the
///    frame is dropped instead of guessed at;
/// 8. otherwise forward — routing only ever keys on `target_system`. The per-link discovery
///    table also records which components have been seen on each system
///    ([`Link::has_seen_component`]), but nothing here consults it: `spec.md` §3 calls this out
///    explicitly as "currently only sysid is used for routing decisions", leaving
///    `(sysid, compid)`-granularity routing an open question rather than current behavior.
fn should_forward(
    origin: LinkId,
    candidate: &dyn Link,
    origin_sysid: u8,
    target_system: i16,
    target_component: i16,
    sik_origin: bool,
) -> bool {
    if candidate.id() == origin {
        return false;
    }
    if sik_origin {
        return false;
    }
    if !candidate.info().output_only_from.allows(origin_sysid) {
        return false;
    }
    if target_system < 0 {
        return true;
    }
    if target_component < 0 {
        return candidate.has_seen_system(target_system as u8);
    }
    if target_system == 0 {
        return true;
    }
    candidate.has_seen_system(target_system as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{LinkInfo, LinkShared, OutputFilter};

    struct TestLink {
        shared: LinkShared,
    }

    impl TestLink {
        fn new(id: LinkId, name: &str) -> Arc<Self> {
            Arc::new(Self {
                shared: LinkShared::new(
                    id,
                    LinkInfo {
                        name: name.to_string(),
                        sik_radio: false,
                        output_only_from: OutputFilter::Any,
                    },
                    16,
                ),
            })
        }
    }

    impl Link for TestLink {
        fn shared(&self) -> &LinkShared {
            &self.shared
        }

        fn run(
            self: Arc<Self>,
            _inbound: queues::Sender<(LinkId, Frame)>,
        ) -> Vec<thread::JoinHandle<()>> {
            Vec::new()
        }
    }

    #[test]
    fn never_forwards_back_to_origin() {
        let link = TestLink::new(1, "a");
        assert!(!should_forward(1, &*link, 1, -1, -1, false));
    }

    #[test]
    fn broadcasts_with_no_target() {
        let link = TestLink::new(2, "a");
        assert!(should_forward(1, &*link, 1, -1, -1, false));
    }

    #[test]
    fn target_system_zero_is_broadcast() {
        let link = TestLink::new(2, "a");
        assert!(should_forward(1, &*link, 1, 0, 5, false));
    }

    #[test]
    fn unseen_target_system_is_dropped() {
        let link = TestLink::new(2, "a");
        assert!(!should_forward(1, &*link, 1, 7, -1, false));
    }

    #[test]
    fn sik_radio_telemetry_never_forwarded() {
        let link = TestLink::new(2, "a");
        assert!(!should_forward(1, &*link, 51, -1, -1, true));
    }

    #[test]
    fn output_only_from_restricts_by_origin_sysid() {
        let link = Arc::new(TestLink {
            shared: LinkShared::new(
                2,
                LinkInfo {
                    name: "b".to_string(),
                    sik_radio: false,
                    output_only_from: OutputFilter::Only([1].into_iter().collect()),
                },
                16,
            ),
        });
        assert!(should_forward(1, &*link, 1, -1, -1, false));
        assert!(!should_forward(1, &*link, 2, -1, -1, false));
    }
}
