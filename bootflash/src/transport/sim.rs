//! In-process bootloader simulator.
//!
//! Behaves like a well-mannered device on a perfect link: every accepted
//! write is followed by a `WriteCompleted` and then an `Ack` for the same
//! address. A [`FaultPlan`] scripts the misbehaviour needed to exercise the
//! coordinator's retry, anomaly and disconnect paths.

use super::{StreamEvent, Transport, WriteResult};
use crate::error::{Error, Result};
use crate::image::FirmwarePage;
use log::{debug, trace};
use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender};

/// Scripted device faults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FaultPlan {
    /// Index (in first-write order) of the page that fails.
    pub fail_page: Option<usize>,
    /// How many times that page is answered with an error before it is acked.
    pub fail_times: u32,
    /// Error code reported for the failing page.
    pub error_code: u16,
    /// Number of writes that succeed before the link drops.
    pub disconnect_after: Option<usize>,
    /// Stale acks for the previous page injected ahead of each write completion.
    pub stale_acks: usize,
}

impl FaultPlan {
    /// Fail page `index` `times` times with `code`.
    #[must_use]
    pub fn with_page_errors(mut self, index: usize, times: u32, code: u16) -> Self {
        self.fail_page = Some(index);
        self.fail_times = times;
        self.error_code = code;
        self
    }

    /// Drop the link after `writes` successful writes.
    #[must_use]
    pub fn with_disconnect_after(mut self, writes: usize) -> Self {
        self.disconnect_after = Some(writes);
        self
    }

    /// Echo `count` stale acks before each write completes.
    #[must_use]
    pub fn with_stale_acks(mut self, count: usize) -> Self {
        self.stale_acks = count;
        self
    }
}

/// Simulated page bootloader implementing [`Transport`].
pub struct SimulatedBootloader {
    events: Sender<StreamEvent>,
    plan: FaultPlan,
    writes: Vec<u32>,
    page_order: Vec<u32>,
    errors_sent: u32,
    flash: BTreeMap<u32, Vec<u8>>,
    connected: bool,
    reset_requested: bool,
}

impl SimulatedBootloader {
    /// Create a simulator and the receiving end of its notification channel.
    pub fn new(plan: FaultPlan) -> (Self, Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel();
        let sim = Self {
            events: tx,
            plan,
            writes: Vec::new(),
            page_order: Vec::new(),
            errors_sent: 0,
            flash: BTreeMap::new(),
            connected: true,
            reset_requested: false,
        };
        (sim, rx)
    }

    /// Addresses of every accepted write, in order.
    pub fn writes(&self) -> &[u32] {
        &self.writes
    }

    /// Pages the device has committed to flash.
    pub fn flash(&self) -> &BTreeMap<u32, Vec<u8>> {
        &self.flash
    }

    /// Whether the link is still up.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether the coordinator asked the device to boot the new firmware.
    pub fn reset_requested(&self) -> bool {
        self.reset_requested
    }

    fn emit(&self, event: StreamEvent) {
        trace!("sim -> {event:?}");
        // The receiver may be gone once the session is over.
        let _ = self.events.send(event);
    }

    fn page_index(&mut self, address: u32) -> usize {
        if let Some(index) = self.page_order.iter().position(|&a| a == address) {
            index
        } else {
            self.page_order.push(address);
            self.page_order.len() - 1
        }
    }
}

impl Transport for SimulatedBootloader {
    fn write(&mut self, page: &FirmwarePage) -> WriteResult {
        if !self.connected {
            return WriteResult::Rejected("device disconnected".into());
        }

        let address = page.address();

        if self.plan.disconnect_after == Some(self.writes.len()) {
            debug!("sim: dropping link before page 0x{address:08X}");
            self.connected = false;
            self.writes.push(address);
            self.emit(StreamEvent::Disconnected);
            return WriteResult::Accepted;
        }

        let previous = self.writes.last().copied();
        self.writes.push(address);
        let index = self.page_index(address);

        if let Some(previous) = previous {
            for _ in 0..self.plan.stale_acks {
                self.emit(StreamEvent::Ack { address: previous });
            }
        }

        self.emit(StreamEvent::WriteCompleted { address });

        if self.plan.fail_page == Some(index) && self.errors_sent < self.plan.fail_times {
            self.errors_sent += 1;
            self.emit(StreamEvent::Error {
                address,
                code: self.plan.error_code,
            });
        } else {
            self.flash.insert(address, page.data().to_vec());
            self.emit(StreamEvent::Ack { address });
        }

        WriteResult::Accepted
    }

    fn reset_device(&mut self) -> Result<()> {
        if !self.connected {
            return Err(Error::Transport("device disconnected".into()));
        }
        self.reset_requested = true;
        Ok(())
    }
}
