/*! # mavrouter

A MAVLink packet router: terminates UDP client/server/broadcast and serial links, decodes
frames with [Mavio](https://crates.io/crates/mavio), and forwards them between links by
`(target_system, target_component)`, maintaining a per-link discovery table of the systems and
components seen on it.

Unlike a MAVLink *node* (see [Maviola](https://crates.io/crates/maviola), the library this crate
is built in the style of), a router has no identity of its own: it neither originates frames nor
terminates them, it only decides which links a frame should be replicated to next.

# Crate layout

* [`link`] — the four link transports (UDP client/server/broadcast, serial) and the shared
  per-link bookkeeping they all build on.
* [`router`] — owns the link table, drains the shared inbound queue, and applies the forwarding
  decision.
* [`addressing`] — the `(target_system, target_component)` extraction table.
* [`drop_policy`] — the per-link uniform random packet drop used to simulate lossy links.
* [`config`] — TOML configuration file format.
* [`cli`] — command line flags.
* [`shell`] — the interactive operator shell.
* [`error`] — the crate-wide error type.
*/
#![warn(missing_docs)]

pub mod addressing;
pub mod cli;
pub mod config;
pub mod consts;
pub mod drop_policy;
pub mod error;
pub mod frame;
pub mod link;
pub mod queues;
pub mod router;
pub mod shell;
mod util;

pub use error::{Error, Result};
pub use frame::Frame;
