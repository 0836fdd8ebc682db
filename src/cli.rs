//! # Command line interface
//!
//! Flags mirror the original router's `boost::program_options` set exactly: `--file/-f` names
//! the configuration file, `--interface/-i` is a bool switch that starts the interactive `cmav`
//! shell, and `--verbose/-v` turns on logging of dropped/unroutable frames.

use std::path::PathBuf;

use clap::Parser;

/// MAVLink router: terminates UDP and serial links and forwards frames between them.
#[derive(Parser, Debug)]
#[command(name = "mavrouter", version, about)]
pub struct Args {
    /// Configuration file, usage: --file=path/to/file.conf
    #[arg(short, long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Start in interactive mode with the operator shell.
    #[arg(short, long = "interface")]
    pub interface: bool,

    /// Verbose output including dropped packets.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Log level implied by the `-v` flags, absent `RUST_LOG` overriding it.
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}
