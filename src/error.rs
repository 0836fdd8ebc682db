//! # Errors
//!
//! The top-level error is [`Error`]. Fallible functions across the crate return [`Result`],
//! which wraps I/O errors, `mavio` frame/codec errors, and configuration errors behind a single
//! type so that callers can use `?` uniformly.

use std::sync::{mpsc, Arc, PoisonError};

/// Crate-wide result type.
pub type Result<T> = core::result::Result<T, Error>;

/// All errors produced by `mavrouter`.
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    /// [`std::io::Error`] wrapper.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// Frame decoding/encoding error from the MAVLink codec.
    #[error("frame decoding/encoding error: {0:?}")]
    Frame(#[from] mavio::error::FrameError),

    /// Configuration file could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// A link referenced by id does not exist in the router's link table.
    #[error("unknown link id: {0}")]
    UnknownLink(u16),

    /// Multi-threading / channel errors.
    #[error("channel error: {0}")]
    Channel(String),

    /// Catch-all for errors that do not deserve their own variant.
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<mavio::error::Error> for Error {
    fn from(value: mavio::error::Error) -> Self {
        match value {
            mavio::error::Error::Io(err) => Self::Io(err),
            mavio::error::Error::Frame(err) => Self::Frame(err),
            other => Self::Other(format!("{other:?}")),
        }
    }
}

impl From<serialport::Error> for Error {
    fn from(value: serialport::Error) -> Self {
        Self::Io(Arc::new(std::io::Error::new(
            std::io::ErrorKind::Other,
            value.to_string(),
        )))
    }
}

impl From<toml::de::Error> for Error {
    fn from(value: toml::de::Error) -> Self {
        Self::Config(value.to_string())
    }
}

impl<Guard> From<PoisonError<Guard>> for Error {
    fn from(value: PoisonError<Guard>) -> Self {
        Self::Channel(format!("poisoned lock: {value}"))
    }
}

impl<T> From<mpsc::SendError<T>> for Error {
    fn from(value: mpsc::SendError<T>) -> Self {
        Self::Channel(format!("send on disconnected channel: {value}"))
    }
}

impl From<mpsc::RecvError> for Error {
    fn from(value: mpsc::RecvError) -> Self {
        Self::Channel(format!("recv on disconnected channel: {value}"))
    }
}
