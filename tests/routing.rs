//! Integration tests for the forwarding loop, driven through a `ChannelLink` test double that
//! implements [`mavrouter::link::Link`] over in-memory channels instead of real sockets.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use mavio::protocol::V2;

use mavrouter::frame::Frame;
use mavrouter::link::{Link, LinkId, LinkInfo, LinkShared, OutputFilter};
use mavrouter::queues;
use mavrouter::router::Router;

/// A link backed by in-memory channels: `inject` feeds frames into the reader side as if they had
/// just arrived off the wire, and every frame the writer side accepts is forwarded onto `sent`.
struct ChannelLink {
    shared: LinkShared,
    inject_rx: Mutex<Option<mpsc::Receiver<Frame>>>,
    sent_tx: mpsc::Sender<Frame>,
}

impl ChannelLink {
    fn new(
        id: LinkId,
        info: LinkInfo,
        inject_rx: mpsc::Receiver<Frame>,
        sent_tx: mpsc::Sender<Frame>,
    ) -> Arc<Self> {
        Arc::new(Self {
            shared: LinkShared::new(id, info, 16),
            inject_rx: Mutex::new(Some(inject_rx)),
            sent_tx,
        })
    }
}

impl Link for ChannelLink {
    fn shared(&self) -> &LinkShared {
        &self.shared
    }

    fn run(
        self: Arc<Self>,
        inbound: queues::Sender<(LinkId, Frame)>,
    ) -> Vec<thread::JoinHandle<()>> {
        let reader = {
            let this = self.clone();
            let inject_rx = this
                .inject_rx
                .lock()
                .expect("inject receiver mutex poisoned")
                .take()
                .expect("inject receiver already taken");
            thread::spawn(move || {
                for frame in inject_rx.iter() {
                    this.on_message_recv(frame, &inbound);
                }
            })
        };
        let writer = {
            let this = self.clone();
            thread::spawn(move || {
                let outbound = this.shared().take_outbound_receiver();
                loop {
                    match outbound.recv_timeout(Duration::from_millis(50)) {
                        Ok(frame) => {
                            if !this.should_drop_outbound(&frame) {
                                let _ = this.sent_tx.send(frame);
                            }
                        }
                        Err(queues::RecvTimeoutError::Timeout) => {
                            if this.is_kill() {
                                return;
                            }
                        }
                        Err(queues::RecvTimeoutError::Disconnected) => return,
                    }
                }
            })
        };
        vec![reader, writer]
    }
}

fn plain_link(id: LinkId, name: &str) -> (Arc<ChannelLink>, mpsc::Sender<Frame>, mpsc::Receiver<Frame>) {
    let (inject_tx, inject_rx) = mpsc::channel();
    let (sent_tx, sent_rx) = mpsc::channel();
    let info = LinkInfo {
        name: name.to_string(),
        sik_radio: false,
        output_only_from: OutputFilter::Any,
    };
    (ChannelLink::new(id, info, inject_rx, sent_tx), inject_tx, sent_rx)
}

fn heartbeat_frame(sysid: u8, compid: u8, seq: u8) -> Frame {
    mavio::Frame::builder()
        .sequence(seq)
        .system_id(sysid)
        .component_id(compid)
        .version(V2)
        .message(&mavio::dialects::common::messages::Heartbeat::default())
        .unwrap()
        .versionless()
}

fn set_mode_frame(origin_sysid: u8, seq: u8, target_system: u8) -> Frame {
    use mavio::dialects::common::messages::SetMode;
    mavio::Frame::builder()
        .sequence(seq)
        .system_id(origin_sysid)
        .component_id(1)
        .version(V2)
        .message(&SetMode {
            target_system,
            ..Default::default()
        })
        .unwrap()
        .versionless()
}

fn radio_status_frame(seq: u8) -> Frame {
    use mavio::dialects::common::messages::RadioStatus;
    mavio::Frame::builder()
        .sequence(seq)
        .system_id(51)
        .component_id(0)
        .version(V2)
        .message(&RadioStatus::default())
        .unwrap()
        .versionless()
}

const RECV_WAIT: Duration = Duration::from_secs(2);

#[test]
fn broadcast_heartbeat_reaches_every_other_link() {
    let router = Router::new();
    let (a, a_inject, _a_sent) = plain_link(0, "a");
    let (b, b_inject, b_sent) = plain_link(1, "b");
    router.add_link(|_id| a.clone());
    router.add_link(|_id| b.clone());
    let joins = router.spawn_links();

    let router_thread = {
        let router = router.clone();
        thread::spawn(move || router.run())
    };

    a_inject.send(heartbeat_frame(7, 1, 0)).unwrap();

    let forwarded = b_sent.recv_timeout(RECV_WAIT).expect("b should receive the broadcast");
    assert_eq!(forwarded.system_id(), 7);

    router.shutdown();
    router_thread.join().unwrap();
    drop(a_inject);
    drop(b_inject);
    for handle in joins {
        let _ = handle.join();
    }
}

#[test]
fn targeted_message_only_reaches_links_that_have_seen_the_target_system() {
    let router = Router::new();
    let (a, a_inject, _a_sent) = plain_link(0, "a");
    let (b, b_inject, b_sent) = plain_link(1, "b");
    let (c, c_inject, c_sent) = plain_link(2, "c");
    router.add_link(|_id| a.clone());
    router.add_link(|_id| b.clone());
    router.add_link(|_id| c.clone());
    let joins = router.spawn_links();

    let router_thread = {
        let router = router.clone();
        thread::spawn(move || router.run())
    };

    // System 9 announces itself on link b, so only b is a known route to it.
    b_inject.send(heartbeat_frame(9, 1, 0)).unwrap();
    // Drain b's own broadcast copy of its heartbeat before asserting on the targeted message.
    let _ = b_sent.recv_timeout(RECV_WAIT);
    let _ = c_sent.recv_timeout(RECV_WAIT);

    a_inject.send(set_mode_frame(5, 0, 9)).unwrap();

    let forwarded = b_sent
        .recv_timeout(RECV_WAIT)
        .expect("b has seen system 9 and should receive the targeted frame");
    assert_eq!(forwarded.system_id(), 5);

    assert!(
        c_sent.recv_timeout(Duration::from_millis(200)).is_err(),
        "c has never seen system 9 and must not receive the targeted frame"
    );

    router.shutdown();
    router_thread.join().unwrap();
    drop(a_inject);
    drop(b_inject);
    drop(c_inject);
    for handle in joins {
        let _ = handle.join();
    }
}

#[test]
fn frame_never_echoes_back_to_its_origin_link() {
    let router = Router::new();
    let (a, a_inject, a_sent) = plain_link(0, "a");
    let (b, b_inject, _b_sent) = plain_link(1, "b");
    router.add_link(|_id| a.clone());
    router.add_link(|_id| b.clone());
    let joins = router.spawn_links();

    let router_thread = {
        let router = router.clone();
        thread::spawn(move || router.run())
    };

    a_inject.send(heartbeat_frame(3, 1, 0)).unwrap();

    assert!(
        a_sent.recv_timeout(Duration::from_millis(200)).is_err(),
        "a must never receive back the frame it originated"
    );

    router.shutdown();
    router_thread.join().unwrap();
    drop(a_inject);
    drop(b_inject);
    for handle in joins {
        let _ = handle.join();
    }
}

#[test]
fn sik_radio_status_from_reserved_sysid_stays_local_to_its_link() {
    let router = Router::new();
    let sik_info = LinkInfo {
        name: "radio".to_string(),
        sik_radio: true,
        output_only_from: OutputFilter::Any,
    };
    let (inject_tx, inject_rx) = mpsc::channel();
    let (sent_tx, _sent_rx) = mpsc::channel();
    let radio = ChannelLink::new(0, sik_info, inject_rx, sent_tx);
    let (b, b_inject, b_sent) = plain_link(1, "b");

    router.add_link(|_id| radio.clone());
    router.add_link(|_id| b.clone());
    let joins = router.spawn_links();

    let router_thread = {
        let router = router.clone();
        thread::spawn(move || router.run())
    };

    inject_tx.send(radio_status_frame(0)).unwrap();

    assert!(
        b_sent.recv_timeout(Duration::from_millis(200)).is_err(),
        "a SiK radio's own RADIO_STATUS telemetry must never be forwarded"
    );
    assert!(!radio.known_systems().contains(&51));

    router.shutdown();
    router_thread.join().unwrap();
    drop(inject_tx);
    drop(b_inject);
    for handle in joins {
        let _ = handle.join();
    }
}

#[test]
fn output_only_from_blocks_traffic_not_originated_by_the_allowed_systems() {
    let router = Router::new();
    let (a, a_inject, _a_sent) = plain_link(0, "a");

    let restricted_info = LinkInfo {
        name: "restricted".to_string(),
        sik_radio: false,
        output_only_from: OutputFilter::Only([42].into_iter().collect()),
    };
    let (inject_tx, inject_rx) = mpsc::channel();
    let (sent_tx, sent_rx) = mpsc::channel();
    let restricted = ChannelLink::new(1, restricted_info, inject_rx, sent_tx);

    router.add_link(|_id| a.clone());
    router.add_link(|_id| restricted.clone());
    let joins = router.spawn_links();

    let router_thread = {
        let router = router.clone();
        thread::spawn(move || router.run())
    };

    a_inject.send(heartbeat_frame(7, 1, 0)).unwrap();
    assert!(
        sent_rx.recv_timeout(Duration::from_millis(200)).is_err(),
        "system 7 is not in the allow-list and must not reach the restricted link"
    );

    a_inject.send(heartbeat_frame(42, 1, 1)).unwrap();
    let forwarded = sent_rx
        .recv_timeout(RECV_WAIT)
        .expect("system 42 is allow-listed and should reach the restricted link");
    assert_eq!(forwarded.system_id(), 42);

    router.shutdown();
    router_thread.join().unwrap();
    drop(a_inject);
    drop(inject_tx);
    for handle in joins {
        let _ = handle.join();
    }
}
