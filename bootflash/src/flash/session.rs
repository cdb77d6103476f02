//! Per-session state machine.
//!
//! ```text
//!            start
//!   Idle ----------> Sending --WriteCompleted--> WaitingAck
//!                      ^                            |
//!                      |   retry < max              | Ack (next page)
//!                      +------ Retrying <-----------+ Error / desync
//!                                 |                 |
//!                  retry >= max   v                 v last page acked
//!                               Failed          Completed
//!
//!   any live state --cancel--> Aborted
//!   any live state --Disconnected--> Failed
//! ```
//!
//! Exactly one page is ever in flight. The device's acknowledgment carries
//! only an address, so a second outstanding page would make replies
//! ambiguous.

use super::progress::{Progress, ProgressSink, StateEvent};
use super::state::{FailureReason, FlashState, Outcome, SessionHandle, SessionSnapshot};
use crate::image::PageMap;
use crate::transport::{StreamEvent, Transport, WriteResult};
use log::{debug, info, trace, warn};
use std::sync::Arc;

/// Consecutive anomalies tolerated in one state before the session fails.
pub const MAX_CONSECUTIVE_ANOMALIES: u32 = 3;

/// Mutable state of one flashing attempt. Owned by the coordinator.
#[derive(Debug)]
pub(crate) struct FlashSession {
    handle: SessionHandle,
    pages: Arc<PageMap>,
    max_retries: u32,
    cursor: usize,
    in_flight: Option<usize>,
    retry_count: u32,
    anomalies: u32,
    state: FlashState,
    last_error: Option<FailureReason>,
    outcome: Option<Outcome>,
}

impl FlashSession {
    pub(crate) fn new(handle: SessionHandle, pages: Arc<PageMap>, max_retries: u32) -> Self {
        Self {
            handle,
            pages,
            max_retries,
            cursor: 0,
            in_flight: None,
            retry_count: 0,
            anomalies: 0,
            state: FlashState::Idle,
            last_error: None,
            outcome: None,
        }
    }

    pub(crate) fn handle(&self) -> SessionHandle {
        self.handle
    }

    pub(crate) fn state(&self) -> FlashState {
        self.state
    }

    pub(crate) fn pages(&self) -> &Arc<PageMap> {
        &self.pages
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            handle: self.handle,
            state: self.state,
            cursor: self.cursor,
            in_flight: self.in_flight_address(),
            retry_count: self.retry_count,
            pages_done: self.cursor,
            pages_total: self.pages.len(),
            last_error: self.last_error.clone(),
            outcome: self.outcome.clone(),
        }
    }

    fn in_flight_address(&self) -> Option<u32> {
        self.in_flight
            .and_then(|i| self.pages.page(i))
            .map(crate::image::FirmwarePage::address)
    }

    /// Leave `Idle` and put the first page on the wire.
    pub(crate) fn begin<T, S>(&mut self, transport: &mut T, sink: &mut S)
    where
        T: Transport + ?Sized,
        S: ProgressSink + ?Sized,
    {
        info!(
            "Flashing {} pages of {} bytes (max {} retries per page)",
            self.pages.len(),
            self.pages.page_size(),
            self.max_retries
        );

        if self.pages.is_empty() {
            self.complete(transport, sink);
            return;
        }

        self.cursor = 0;
        self.retry_count = 0;
        self.send_current(transport, sink);
    }

    /// Feed one transport notification into the state machine.
    pub(crate) fn on_event<T, S>(&mut self, event: StreamEvent, transport: &mut T, sink: &mut S)
    where
        T: Transport + ?Sized,
        S: ProgressSink + ?Sized,
    {
        if self.state.is_terminal() {
            debug!("Ignoring {event:?}: session already {}", self.state);
            return;
        }

        let in_flight = self.in_flight_address();

        match (self.state, event) {
            (_, StreamEvent::Disconnected) => {
                warn!("Device disconnected while {}", self.state);
                self.fail(FailureReason::Disconnected, sink);
            },
            (FlashState::Sending, StreamEvent::WriteCompleted { address })
                if Some(address) == in_flight =>
            {
                trace!("Write of page 0x{address:08X} completed");
                self.transition(FlashState::WaitingAck, sink);
            },
            (FlashState::WaitingAck, StreamEvent::Ack { address }) if Some(address) == in_flight => {
                self.advance(transport, sink);
            },
            (FlashState::WaitingAck, StreamEvent::Error { address, code })
                if Some(address) == in_flight =>
            {
                warn!("Device error {code} writing page 0x{address:08X}");
                self.retry(FailureReason::DeviceError { code }, transport, sink);
            },
            (
                FlashState::WaitingAck,
                StreamEvent::Ack { address } | StreamEvent::Error { address, .. },
            ) => {
                warn!(
                    "Reply for 0x{address:08X} while waiting on {}; resending",
                    fmt_address(in_flight)
                );
                self.retry(FailureReason::ProtocolAnomaly, transport, sink);
            },
            (_, event) => self.anomaly(event, sink),
        }
    }

    /// Abort on user request. Returns `false` if the session was already over.
    pub(crate) fn cancel<S>(&mut self, sink: &mut S) -> bool
    where
        S: ProgressSink + ?Sized,
    {
        if self.state.is_terminal() {
            debug!("Cancel ignored: session already {}", self.state);
            return false;
        }

        let pages_done = self.cursor;
        if pages_done > 0 || self.in_flight.is_some() {
            warn!(
                "Flash aborted after {pages_done}/{} pages; the device holds a partial image",
                self.pages.len()
            );
        } else {
            info!("Flash aborted before any page was written");
        }

        self.in_flight = None;
        self.transition(FlashState::Aborted, sink);
        self.finish(Outcome::Aborted { pages_done }, sink);
        true
    }

    /// Hand the page under the cursor to the transport. A rejected write goes
    /// through the retry path straight away.
    fn send_current<T, S>(&mut self, transport: &mut T, sink: &mut S)
    where
        T: Transport + ?Sized,
        S: ProgressSink + ?Sized,
    {
        let pages = Arc::clone(&self.pages);

        loop {
            let Some(page) = pages.page(self.cursor) else {
                // cursor only moves past the end through complete()
                self.fail(FailureReason::ProtocolAnomaly, sink);
                return;
            };

            self.in_flight = Some(self.cursor);
            self.transition(FlashState::Sending, sink);
            trace!(
                "Writing page 0x{:08X} (attempt {})",
                page.address(),
                self.retry_count + 1
            );

            match transport.write(page) {
                WriteResult::Accepted => return,
                WriteResult::Rejected(reason) => {
                    warn!("Transport rejected page 0x{:08X}: {reason}", page.address());
                    if !self.enter_retry(FailureReason::WriteRejected(reason), sink) {
                        return;
                    }
                },
            }
        }
    }

    fn advance<T, S>(&mut self, transport: &mut T, sink: &mut S)
    where
        T: Transport + ?Sized,
        S: ProgressSink + ?Sized,
    {
        self.cursor += 1;
        self.in_flight = None;
        self.retry_count = 0;
        self.last_error = None;

        let finished = self.cursor >= self.pages.len();
        sink.on_progress(&Progress {
            pages_done: self.cursor,
            pages_total: self.pages.len(),
            state: if finished {
                FlashState::Completed
            } else {
                FlashState::Sending
            },
        });

        if finished {
            self.complete(transport, sink);
        } else {
            self.send_current(transport, sink);
        }
    }

    fn complete<T, S>(&mut self, transport: &mut T, sink: &mut S)
    where
        T: Transport + ?Sized,
        S: ProgressSink + ?Sized,
    {
        self.transition(FlashState::Completed, sink);
        info!("All {} pages written", self.pages.len());

        if !self.pages.is_empty() {
            if let Err(e) = transport.reset_device() {
                warn!("Firmware written but the device did not accept the reset request: {e}");
            }
        }

        self.finish(Outcome::Completed, sink);
    }

    fn retry<T, S>(&mut self, reason: FailureReason, transport: &mut T, sink: &mut S)
    where
        T: Transport + ?Sized,
        S: ProgressSink + ?Sized,
    {
        if self.enter_retry(reason, sink) {
            self.send_current(transport, sink);
        }
    }

    /// Move to `Retrying` and decide. Returns `true` if the page should be
    /// sent again, `false` once the session has failed.
    fn enter_retry<S>(&mut self, reason: FailureReason, sink: &mut S) -> bool
    where
        S: ProgressSink + ?Sized,
    {
        self.last_error = Some(reason.clone());
        self.transition(FlashState::Retrying, sink);

        if self.retry_count < self.max_retries {
            self.retry_count += 1;
            debug!("Retry {}/{} for page {}", self.retry_count, self.max_retries, self.cursor);
            true
        } else {
            warn!(
                "Giving up on page {} after {} retries",
                fmt_address(self.in_flight_address()),
                self.retry_count
            );
            self.fail(reason, sink);
            false
        }
    }

    fn anomaly<S>(&mut self, event: StreamEvent, sink: &mut S)
    where
        S: ProgressSink + ?Sized,
    {
        self.anomalies += 1;
        warn!(
            "Protocol anomaly while {} ({}/{MAX_CONSECUTIVE_ANOMALIES}): unexpected {event:?}",
            self.state, self.anomalies
        );

        if self.anomalies >= MAX_CONSECUTIVE_ANOMALIES {
            self.fail(FailureReason::ProtocolAnomaly, sink);
        }
    }

    fn fail<S>(&mut self, reason: FailureReason, sink: &mut S)
    where
        S: ProgressSink + ?Sized,
    {
        self.last_error = Some(reason.clone());
        self.in_flight = None;
        self.transition(FlashState::Failed, sink);
        self.finish(Outcome::Failed { reason }, sink);
    }

    fn finish<S>(&mut self, outcome: Outcome, sink: &mut S)
    where
        S: ProgressSink + ?Sized,
    {
        debug!("Session {} ended: {outcome}", self.handle.id());
        sink.on_terminal(&outcome);
        self.outcome = Some(outcome);
    }

    fn transition<S>(&mut self, to: FlashState, sink: &mut S)
    where
        S: ProgressSink + ?Sized,
    {
        debug!("{} -> {to}", self.state);
        self.state = to;
        self.anomalies = 0;

        let error = match to {
            FlashState::Retrying | FlashState::Failed => self.last_error.clone(),
            _ => None,
        };
        sink.on_state(&StateEvent {
            pages_done: self.cursor,
            pages_total: self.pages.len(),
            state: to,
            error,
        });
    }
}

fn fmt_address(address: Option<u32>) -> String {
    address.map_or_else(|| "nothing".to_string(), |a| format!("0x{a:08X}"))
}
