//! # Operator shell
//!
//! A small REPL over stdin/stdout for inspecting and tweaking a running router interactively,
//! matching the original router's `cmav` shell mode (`-i`/`--interface` flag). Reads commands
//! line by line so it composes with piping commands from a script or test harness.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use crate::router::Router;

/// Runs the shell loop on the calling thread, reading commands from `input` and writing replies
/// to `output`, until `quit`/`exit` or end-of-input.
pub fn run(router: &Arc<Router>, input: impl BufRead, mut output: impl Write) -> io::Result<()> {
    writeln!(output, "mavrouter shell — type 'help' for commands")?;

    for line in input.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match dispatch(router, line) {
            Command::Quit => break,
            Command::Output(text) => writeln!(output, "{text}")?,
        }
        write!(output, "mavrouter> ")?;
        output.flush()?;
    }

    Ok(())
}

enum Command {
    Output(String),
    Quit,
}

fn dispatch(router: &Arc<Router>, line: &str) -> Command {
    let mut parts = line.split_whitespace();
    let Some(cmd) = parts.next() else {
        return Command::Output(String::new());
    };

    match cmd {
        "help" => Command::Output(
            "commands: links, quality, drop <link_id> <rate>, up <link_id> <true|false>, quit"
                .to_string(),
        ),
        "quit" | "exit" => Command::Quit,
        "links" => Command::Output(list_links(router)),
        "quality" => Command::Output(list_quality(router)),
        "drop" => Command::Output(set_drop_rate(router, parts.next(), parts.next())),
        "up" => Command::Output(set_up(router, parts.next(), parts.next())),
        other => Command::Output(format!("unknown command: {other}")),
    }
}

fn list_links(router: &Arc<Router>) -> String {
    let mut lines = Vec::new();
    for link in router.links() {
        let state = if link.is_kill() {
            "DEAD"
        } else if link.is_up() {
            "UP"
        } else {
            "DOWN"
        };
        let stats = link.stats();
        lines.push(format!(
            "{:>3} {:<16} {:<5} received={} lost={} dropped={} out_queue={}",
            link.id(),
            link.info().name,
            state,
            stats.packets_received,
            stats.packets_lost,
            stats.packets_dropped,
            link.outbound_depth(),
        ));
    }
    if lines.is_empty() {
        "no links configured".to_string()
    } else {
        lines.join("\n")
    }
}

fn list_quality(router: &Arc<Router>) -> String {
    let mut lines = Vec::new();
    for link in router.links() {
        if !link.info().sik_radio {
            continue;
        }
        let q = link.quality();
        lines.push(format!(
            "{:>3} {:<16} rssi(local/remote)={}/{} noise(local/remote)={}/{} rx_errors={} corrected={} tx_buf={}%",
            link.id(),
            link.info().name,
            q.local_rssi,
            q.remote_rssi,
            q.local_noise,
            q.remote_noise,
            q.rx_errors,
            q.corrected_packets,
            q.tx_buffer,
        ));
    }
    if lines.is_empty() {
        "no SiK radio links".to_string()
    } else {
        lines.join("\n")
    }
}

fn set_drop_rate(router: &Arc<Router>, id: Option<&str>, rate: Option<&str>) -> String {
    let (Some(id), Some(rate)) = (id, rate) else {
        return "usage: drop <link_id> <rate 0.0-1.0>".to_string();
    };
    let Ok(id) = id.parse() else {
        return format!("invalid link id: {id}");
    };
    let Ok(rate) = rate.parse::<f64>() else {
        return format!("invalid rate: {rate}");
    };
    match router.link(id) {
        Some(link) => {
            link.set_drop_rate(rate);
            format!("link {id} drop rate set to {rate}")
        }
        None => format!("no such link: {id}"),
    }
}

fn set_up(router: &Arc<Router>, id: Option<&str>, up: Option<&str>) -> String {
    let (Some(id), Some(up)) = (id, up) else {
        return "usage: up <link_id> <true|false>".to_string();
    };
    let Ok(id) = id.parse() else {
        return format!("invalid link id: {id}");
    };
    let Ok(up) = up.parse::<bool>() else {
        return format!("invalid flag: {up}");
    };
    match router.link(id) {
        Some(link) => {
            link.set_up(up);
            format!("link {id} set {}", if up { "up" } else { "down" })
        }
        None => format!("no such link: {id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{Link, LinkId, LinkInfo, LinkShared, OutputFilter};
    use crate::queues;

    struct TestLink {
        shared: LinkShared,
    }

    impl Link for TestLink {
        fn shared(&self) -> &LinkShared {
            &self.shared
        }

        fn run(
            self: Arc<Self>,
            _inbound: queues::Sender<(LinkId, crate::Frame)>,
        ) -> Vec<std::thread::JoinHandle<()>> {
            Vec::new()
        }
    }

    fn router_with_one_link() -> Arc<Router> {
        let router = Router::new();
        router.add_link(|id| {
            Arc::new(TestLink {
                shared: LinkShared::new(
                    id,
                    LinkInfo {
                        name: "test".to_string(),
                        sik_radio: false,
                        output_only_from: OutputFilter::Any,
                    },
                    16,
                ),
            })
        });
        router
    }

    #[test]
    fn help_lists_commands() {
        let router = router_with_one_link();
        match dispatch(&router, "help") {
            Command::Output(text) => assert!(text.contains("links")),
            Command::Quit => panic!("expected output"),
        }
    }

    #[test]
    fn quit_and_exit_stop_the_shell() {
        let router = router_with_one_link();
        assert!(matches!(dispatch(&router, "quit"), Command::Quit));
        assert!(matches!(dispatch(&router, "exit"), Command::Quit));
    }

    #[test]
    fn drop_requires_two_arguments() {
        let router = router_with_one_link();
        match dispatch(&router, "drop 0") {
            Command::Output(text) => assert!(text.starts_with("usage")),
            Command::Quit => panic!("expected output"),
        }
    }

    #[test]
    fn drop_sets_rate_on_existing_link() {
        let router = router_with_one_link();
        match dispatch(&router, "drop 0 0.5") {
            Command::Output(text) => assert!(text.contains("drop rate set to 0.5")),
            Command::Quit => panic!("expected output"),
        }
    }
}
