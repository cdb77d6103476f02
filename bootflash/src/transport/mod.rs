//! Stream transport seam.
//!
//! The coordinator never touches bytes on the wire. It hands whole pages to a
//! [`Transport`] and learns about everything else through [`StreamEvent`]s the
//! transport delivers on its own notification channel.
//!
//! ```text
//!                 write(page)            framed bytes
//! +-------------+ ----------> +---------+ ----------> +------------+
//! | Coordinator |             |Transport|             | Bootloader |
//! +-------------+ <---------- +---------+ <---------- +------------+
//!                 StreamEvent             ack / error
//! ```
//!
//! Framing the page for the device is the transport's business.

pub mod sim;

pub use sim::{FaultPlan, SimulatedBootloader};

use crate::error::Result;
use crate::image::FirmwarePage;

/// Result of handing a page to the transport.
///
/// `Accepted` only means the transport queued the write. It says nothing
/// about whether the device received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// The write was queued for sending.
    Accepted,
    /// The transport refused the write.
    Rejected(String),
}

/// Notification delivered by the transport, in the order it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StreamEvent {
    /// A previously accepted page write has left the host.
    WriteCompleted {
        /// Address of the written page.
        address: u32,
    },
    /// Device confirmed the page at `address`.
    Ack {
        /// Acknowledged page address.
        address: u32,
    },
    /// Device reported a page-level failure.
    Error {
        /// Page address the error refers to.
        address: u32,
        /// Device error code.
        code: u16,
    },
    /// The device went away.
    Disconnected,
}

/// Byte stream to the bootloader.
///
/// Implementations must not block in [`write`](Transport::write); actual I/O
/// happens elsewhere and its outcome comes back as a [`StreamEvent`].
pub trait Transport {
    /// Queue a page write.
    fn write(&mut self, page: &FirmwarePage) -> WriteResult;

    /// Ask the bootloader to leave and boot the freshly written firmware.
    fn reset_device(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, page: &FirmwarePage) -> WriteResult {
        (**self).write(page)
    }

    fn reset_device(&mut self) -> Result<()> {
        (**self).reset_device()
    }
}
