//! Error types for bootflash.

use std::io;
use thiserror::Error;

/// Result type for bootflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for bootflash operations.
///
/// These are errors of the *request*: they are returned before a session
/// exists, or by helpers outside of a session. A running session never
/// returns an `Error`; it ends with an [`Outcome`](crate::flash::Outcome).
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed Intel HEX input.
    #[error("Intel HEX error: {0}")]
    IntelHex(#[from] ihex::ReaderError),

    /// Image does not fit the device's flashable region.
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// A flash session is already active.
    #[error("Device busy: a flash session is already active")]
    DeviceBusy,

    /// Device profile is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No session with this id is known to the coordinator.
    #[error("Unknown flash session {0}")]
    UnknownSession(u64),

    /// Transport-level failure outside of a session.
    #[error("Transport error: {0}")]
    Transport(String),
}
