//! Flash coordinator: the public face of the flashing state machine.
//!
//! ## Example
//!
//! ```rust
//! use bootflash::{DeviceProfile, EventLog, FaultPlan, FlashCoordinator, SimulatedBootloader};
//!
//! let profile = DeviceProfile::new(128)
//!     .with_base_address(0)
//!     .with_address_space(128 * 16);
//! let (device, events) = SimulatedBootloader::new(FaultPlan::default());
//! let mut coordinator = FlashCoordinator::new(device, EventLog::new());
//!
//! let handle = coordinator.start_flash(&[0xAB; 300], &profile)?;
//! for event in events.try_iter() {
//!     coordinator.handle_event(event);
//! }
//!
//! let snapshot = coordinator.current_state(handle).unwrap();
//! assert!(snapshot.outcome.unwrap().is_success());
//! # Ok::<(), bootflash::Error>(())
//! ```

use super::progress::{NoOpSink, ProgressSink};
use super::session::FlashSession;
use super::state::{SessionHandle, SessionSnapshot};
use crate::error::{Error, Result};
use crate::image::PageMap;
use crate::profile::DeviceProfile;
use crate::transport::{StreamEvent, Transport};
use log::debug;
use std::sync::Arc;

/// Drives one flash session at a time over a [`Transport`], reporting to a
/// [`ProgressSink`].
///
/// The coordinator never blocks: it reacts to [`handle_event`] calls and only
/// issues non-blocking writes.
///
/// [`handle_event`]: FlashCoordinator::handle_event
pub struct FlashCoordinator<T: Transport, S: ProgressSink = NoOpSink> {
    transport: T,
    sink: S,
    session: Option<FlashSession>,
    next_id: u64,
}

impl<T: Transport> FlashCoordinator<T, NoOpSink> {
    /// Create a coordinator that reports nowhere.
    pub fn without_sink(transport: T) -> Self {
        Self::new(transport, NoOpSink)
    }
}

impl<T: Transport, S: ProgressSink> FlashCoordinator<T, S> {
    /// Create a coordinator over `transport`, reporting into `sink`.
    pub fn new(transport: T, sink: S) -> Self {
        Self {
            transport,
            sink,
            session: None,
            next_id: 1,
        }
    }

    /// Get a reference to the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Get a reference to the progress sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Consume the coordinator and return the transport and sink.
    pub fn into_parts(self) -> (T, S) {
        (self.transport, self.sink)
    }

    /// Whether a session is currently running.
    pub fn is_busy(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| !s.state().is_terminal())
    }

    /// Handle of the running session, if any.
    pub fn active_session(&self) -> Option<SessionHandle> {
        self.session
            .as_ref()
            .filter(|s| !s.state().is_terminal())
            .map(FlashSession::handle)
    }

    /// Page map of the current (or last) session.
    pub fn page_map(&self) -> Option<Arc<PageMap>> {
        self.session.as_ref().map(|s| Arc::clone(s.pages()))
    }

    /// Segment `image` for `profile` and start flashing it.
    ///
    /// Fails with [`Error::DeviceBusy`] while another session runs, and with
    /// [`Error::InvalidImage`] if the image does not fit. An inconsistent
    /// `profile` (page size not a power of two, misaligned base, bad address
    /// space) is reported as [`Error::Config`] instead, since the image is not
    /// at fault. In all cases no session is created and nothing is sent.
    pub fn start_flash(&mut self, image: &[u8], profile: &DeviceProfile) -> Result<SessionHandle> {
        self.ensure_idle()?;
        let pages = PageMap::segment(image, profile)?;
        self.start_flash_pages(pages, profile.max_retries)
    }

    /// Start flashing an already built page map.
    pub fn start_flash_pages(
        &mut self,
        pages: impl Into<Arc<PageMap>>,
        max_retries: u32,
    ) -> Result<SessionHandle> {
        self.ensure_idle()?;

        let handle = SessionHandle(self.next_id);
        self.next_id += 1;

        let mut session = FlashSession::new(handle, pages.into(), max_retries);
        session.begin(&mut self.transport, &mut self.sink);
        self.session = Some(session);

        Ok(handle)
    }

    /// Request an abort. Idempotent: returns `true` only for the call that
    /// actually aborted the session.
    pub fn cancel(&mut self, handle: SessionHandle) -> bool {
        match self.session.as_mut() {
            Some(session) if session.handle() == handle => session.cancel(&mut self.sink),
            _ => {
                debug!("Cancel for unknown session {}", handle.id());
                false
            },
        }
    }

    /// Read-only snapshot of a session. Only the current or most recent
    /// session can be queried.
    pub fn current_state(&self, handle: SessionHandle) -> Option<SessionSnapshot> {
        self.session
            .as_ref()
            .filter(|s| s.handle() == handle)
            .map(FlashSession::snapshot)
    }

    /// Deliver a transport notification to the running session.
    pub fn handle_event(&mut self, event: StreamEvent) {
        match self.session.as_mut() {
            Some(session) => session.on_event(event, &mut self.transport, &mut self.sink),
            None => debug!("Ignoring {event:?}: no session"),
        }
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.is_busy() {
            return Err(Error::DeviceBusy);
        }
        Ok(())
    }
}
