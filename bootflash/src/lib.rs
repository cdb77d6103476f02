//! # bootflash
//!
//! Firmware flashing for robots with a page-based serial bootloader.
//!
//! The bootloader accepts one fixed-size page at a time and answers each page
//! with an acknowledgment that carries only the page's address. This crate
//! provides:
//!
//! - Image segmentation into padded, address-tagged pages (raw binary and
//!   Intel HEX)
//! - A non-blocking flash coordinator with one page in flight, per-page
//!   retries, anomaly detection and user cancellation
//! - One-way progress reporting through a [`ProgressSink`]
//! - An in-process [`SimulatedBootloader`] for exercising the protocol
//!
//! The transport (framing pages on the wire) is supplied by the caller
//! through the [`Transport`] trait.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bootflash::{DeviceProfile, FaultPlan, FlashCoordinator, SimulatedBootloader};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let profile = DeviceProfile::default();
//!     let image = std::fs::read("firmware.bin")?;
//!
//!     let (device, events) = SimulatedBootloader::new(FaultPlan::default());
//!     let mut coordinator = FlashCoordinator::without_sink(device);
//!
//!     let session = coordinator.start_flash(&image, &profile)?;
//!     let outcome = bootflash::run_session(&mut coordinator, session, &events)?;
//!     println!("Flash {outcome}");
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod error;
pub mod flash;
pub mod image;
pub mod profile;
pub mod transport;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker consulted by [`run_session`].
///
/// The checker should return `true` when the running session should be
/// cancelled (for example after receiving Ctrl-C in CLI applications).
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

#[cfg(test)]
pub(crate) fn test_set_interrupted(value: bool) {
    use std::sync::atomic::{AtomicBool, Ordering};

    static TEST_INTERRUPT_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

    let flag = TEST_INTERRUPT_FLAG
        .get_or_init(|| {
            let shared = Arc::new(AtomicBool::new(false));
            let checker = Arc::clone(&shared);
            set_interrupt_checker(move || checker.load(Ordering::Relaxed));
            shared
        })
        .clone();

    flag.store(value, Ordering::Relaxed);
}

// Re-exports for convenience
pub use {
    error::{Error, Result},
    flash::{
        ChannelSink, EventLog, FailureReason, FlashCoordinator, FlashState, NoOpSink, Outcome,
        Progress, ProgressEvent, ProgressSink, SessionHandle, SessionSnapshot, StateEvent,
        run_session, run_session_with,
    },
    image::{FirmwarePage, ImageFormat, PageMap, load_page_map, page_map_from_bytes},
    profile::DeviceProfile,
    transport::{FaultPlan, SimulatedBootloader, StreamEvent, Transport, WriteResult},
};

#[cfg(test)]
mod tests {
    use super::*;

    // One test: the flag is process-wide and tests run in parallel.
    #[test]
    fn test_interrupt_checker_toggle() {
        test_set_interrupted(false);
        assert!(!is_interrupted_requested());

        test_set_interrupted(true);
        assert!(is_interrupted_requested());

        test_set_interrupted(false);
        assert!(!is_interrupted_requested());
    }
}
