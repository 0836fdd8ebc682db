//! # Frame alias
//!
//! The router never needs to pin a MAVLink wire version: links accept v1 and v2 interchangeably
//! and forward bytes unmodified, so every frame that passes through the router is addressed
//! through a single, version-erased type.

pub use mavio::protocol::MessageId;

/// A decoded MAVLink frame, erased over wire version (v1/v2).
pub type Frame = mavio::Frame<mavio::protocol::Versionless>;
