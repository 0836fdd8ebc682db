//! Binary entry point: parses the command line, builds the configured links, and runs the
//! router until shut down by the operator shell, SIGINT, or end of input.

use std::io::BufReader;
use std::net::{SocketAddr, UdpSocket};
use std::thread;

use clap::Parser;
use log::{error, info};

use mavrouter::cli::Args;
use mavrouter::config::{Config, LinkConfig};
use mavrouter::consts::{DEFAULT_OUTBOUND_QUEUE_LENGTH, UDP_READ_POLL_TIMEOUT};
use mavrouter::link::{Link, LinkId, LinkInfo, SerialLink, UdpBroadcastLink, UdpClientLink, UdpServerLink};
use mavrouter::router::Router;
use mavrouter::{shell, Error, Result};

fn main() {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level())
        .parse_default_env()
        .init();

    if let Err(err) = run(args) {
        error!("{err}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let Some(path) = &args.file else {
        return Err(Error::Config(
            "no configuration file given: pass --file/-f path/to/file.toml".into(),
        ));
    };
    let config = Config::load(path)?;

    let router = Router::new();
    for link_config in &config.links {
        add_link(&router, link_config)?;
    }

    info!("starting {} link(s)", config.links.len());
    let join_handles = router.spawn_links();

    {
        let router = router.clone();
        ctrlc::set_handler(move || {
            info!("received interrupt, shutting down");
            router.shutdown();
        })
        .map_err(|err| Error::Other(format!("failed to install signal handler: {err}")))?;
    }

    let router_thread = {
        let router = router.clone();
        thread::spawn(move || router.run())
    };

    if args.interface {
        shell::run(&router, BufReader::new(std::io::stdin()), std::io::stdout())?;
        router.shutdown();
    }
    router_thread.join().expect("router thread panicked");

    for handle in join_handles {
        let _ = handle.join();
    }

    Ok(())
}

fn add_link(router: &std::sync::Arc<Router>, config: &LinkConfig) -> Result<()> {
    let info = LinkInfo {
        name: config.name().to_string(),
        sik_radio: config.sik_radio(),
        output_only_from: config.output_filter(),
    };

    match config {
        LinkConfig::UdpClient {
            host, port, bind_addr, ..
        } => {
            let local: SocketAddr = (*bind_addr).unwrap_or_else(|| {
                let port = portpicker::pick_unused_port().unwrap_or(0);
                SocketAddr::from(([0, 0, 0, 0], port))
            });
            let socket = UdpSocket::bind(local)?;
            socket.connect((host.as_str(), *port))?;
            socket.set_read_timeout(Some(UDP_READ_POLL_TIMEOUT))?;
            router.add_link(|id: LinkId| {
                UdpClientLink::new(id, info, socket, DEFAULT_OUTBOUND_QUEUE_LENGTH) as std::sync::Arc<dyn Link>
            });
        }
        LinkConfig::UdpServer { bind_port, .. } => {
            let socket = UdpSocket::bind(("0.0.0.0", *bind_port))?;
            socket.set_read_timeout(Some(UDP_READ_POLL_TIMEOUT))?;
            router.add_link(|id: LinkId| {
                UdpServerLink::new(id, info, socket, DEFAULT_OUTBOUND_QUEUE_LENGTH) as std::sync::Arc<dyn Link>
            });
        }
        LinkConfig::UdpBroadcast {
            bind_addr,
            broadcast_addr,
            broadcast_port,
            endpoint_lock,
            ..
        } => {
            let bind: SocketAddr = format!("{bind_addr}:0")
                .parse()
                .map_err(|_| Error::Config(format!("invalid bind address: {bind_addr}")))?;
            let raw = socket2::Socket::new(
                socket2::Domain::for_address(bind),
                socket2::Type::DGRAM,
                Some(socket2::Protocol::UDP),
            )?;
            raw.set_reuse_address(true)?;
            raw.bind(&bind.into())?;
            let socket: UdpSocket = raw.into();
            socket.set_broadcast(true)?;
            socket.set_read_timeout(Some(UDP_READ_POLL_TIMEOUT))?;
            let broadcast: SocketAddr = format!("{broadcast_addr}:{broadcast_port}")
                .parse()
                .map_err(|_| Error::Config(format!("invalid broadcast address: {broadcast_addr}")))?;
            router.add_link(|id: LinkId| {
                UdpBroadcastLink::new(
                    id,
                    info,
                    socket,
                    broadcast,
                    *endpoint_lock,
                    DEFAULT_OUTBOUND_QUEUE_LENGTH,
                ) as std::sync::Arc<dyn Link>
            });
        }
        LinkConfig::Serial {
            path,
            baud_rate,
            flow_control,
            ..
        } => {
            let timeout = config.serial_timeout();
            router.try_add_link(|id: LinkId| {
                SerialLink::open(
                    id,
                    info,
                    path,
                    *baud_rate,
                    *flow_control,
                    timeout,
                    DEFAULT_OUTBOUND_QUEUE_LENGTH,
                )
                .map(|link| link as std::sync::Arc<dyn Link>)
            })?;
        }
    }

    Ok(())
}
