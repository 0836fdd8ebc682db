//! # Configuration file
//!
//! Routers are configured from a TOML file listing every link to terminate. This mirrors the
//! `-f`/`--file` option of the original router, which read a flat `link_name,type,...` text file;
//! here the same information is expressed as a list of typed `[[link]]` tables.
//!
//! ```toml
//! [[link]]
//! kind = "udp-client"
//! name = "gcs"
//! host = "127.0.0.1"
//! port = 14550
//!
//! [[link]]
//! kind = "serial"
//! name = "telemetry"
//! path = "/dev/ttyUSB0"
//! baud_rate = 57600
//! sik-radio = true
//! ```

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::link::OutputFilter;

/// Top-level configuration file, a flat list of link definitions.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(rename = "link", default)]
    pub links: Vec<LinkConfig>,
}

impl Config {
    /// Parses a configuration file from its TOML contents.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        if config.links.is_empty() {
            return Err(Error::Config("configuration defines no links".into()));
        }
        Ok(config)
    }

    /// Reads and parses a configuration file from disk.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }
}

/// One configured link, tagged by `kind` in the TOML source.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum LinkConfig {
    /// A UDP socket connected to one fixed remote peer.
    UdpClient {
        name: String,
        host: String,
        port: u16,
        #[serde(default)]
        bind_addr: Option<SocketAddr>,
        #[serde(default)]
        sik_radio: bool,
        #[serde(default)]
        output_only_from: Option<HashSet<u8>>,
    },
    /// A UDP socket accepting any number of remote peers.
    UdpServer {
        name: String,
        bind_port: u16,
        #[serde(default)]
        sik_radio: bool,
        #[serde(default)]
        output_only_from: Option<HashSet<u8>>,
    },
    /// A UDP broadcast socket.
    UdpBroadcast {
        name: String,
        bind_addr: String,
        broadcast_addr: String,
        broadcast_port: u16,
        /// When `true`, only datagrams from `broadcast_addr` are accepted (a single trusted
        /// peer); when `false`, any sender is accepted, supporting multiple broadcast peers.
        #[serde(default)]
        endpoint_lock: bool,
        #[serde(default)]
        sik_radio: bool,
        #[serde(default)]
        output_only_from: Option<HashSet<u8>>,
    },
    /// A serial port.
    Serial {
        name: String,
        path: String,
        baud_rate: u32,
        /// `true` for hardware (RTS/CTS) flow control, `false` for none.
        #[serde(default)]
        flow_control: bool,
        #[serde(default)]
        sik_radio: bool,
        #[serde(default)]
        output_only_from: Option<HashSet<u8>>,
    },
}

impl LinkConfig {
    pub fn name(&self) -> &str {
        match self {
            LinkConfig::UdpClient { name, .. }
            | LinkConfig::UdpServer { name, .. }
            | LinkConfig::UdpBroadcast { name, .. }
            | LinkConfig::Serial { name, .. } => name,
        }
    }

    pub fn sik_radio(&self) -> bool {
        match self {
            LinkConfig::UdpClient { sik_radio, .. }
            | LinkConfig::UdpServer { sik_radio, .. }
            | LinkConfig::UdpBroadcast { sik_radio, .. }
            | LinkConfig::Serial { sik_radio, .. } => *sik_radio,
        }
    }

    pub fn output_filter(&self) -> OutputFilter {
        let set = match self {
            LinkConfig::UdpClient {
                output_only_from, ..
            }
            | LinkConfig::UdpServer {
                output_only_from, ..
            }
            | LinkConfig::UdpBroadcast {
                output_only_from, ..
            }
            | LinkConfig::Serial {
                output_only_from, ..
            } => output_only_from,
        };
        match set {
            Some(sysids) => OutputFilter::Only(sysids.clone()),
            None => OutputFilter::Any,
        }
    }

    /// `endpoint_lock` for a `udp-broadcast` link; `false` (unused) for every other kind.
    pub fn endpoint_lock(&self) -> bool {
        match self {
            LinkConfig::UdpBroadcast { endpoint_lock, .. } => *endpoint_lock,
            _ => false,
        }
    }

    /// `flow_control` for a `serial` link; `false` (unused) for every other kind.
    pub fn flow_control(&self) -> bool {
        match self {
            LinkConfig::Serial { flow_control, .. } => *flow_control,
            _ => false,
        }
    }

    /// Default serial port timeout used when this config doesn't specify one explicitly.
    pub fn serial_timeout(&self) -> Duration {
        Duration::from_millis(500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_link_kind() {
        let toml = r#"
            [[link]]
            kind = "udp-client"
            name = "gcs"
            host = "127.0.0.1"
            port = 14550

            [[link]]
            kind = "udp-server"
            name = "ground"
            bind-port = 14551

            [[link]]
            kind = "udp-broadcast"
            name = "bcast"
            bind-addr = "0.0.0.0"
            broadcast-addr = "192.168.1.255"
            broadcast-port = 14552

            [[link]]
            kind = "serial"
            name = "telem"
            path = "/dev/ttyUSB0"
            baud-rate = 57600
            sik-radio = true
        "#;

        let config = Config::parse(toml).unwrap();
        assert_eq!(config.links.len(), 4);
        assert_eq!(config.links[0].name(), "gcs");
        assert!(config.links[3].sik_radio());
    }

    #[test]
    fn rejects_empty_configuration() {
        let err = Config::parse("").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn output_only_from_restricts_by_sysid() {
        let toml = r#"
            [[link]]
            kind = "udp-client"
            name = "gcs"
            host = "127.0.0.1"
            port = 14550
            output-only-from = [1, 2]
        "#;
        let config = Config::parse(toml).unwrap();
        match config.links[0].output_filter() {
            OutputFilter::Only(set) => {
                assert!(set.contains(&1));
                assert!(!set.contains(&3));
            }
            OutputFilter::Any => panic!("expected restricted filter"),
        }
    }
}
